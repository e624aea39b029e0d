use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;

use datawrangler::config::PublishConfig;
use datawrangler::error::WranglerError;
use datawrangler::publish::{
    GeoServerPublisher, PublishOutcome, Publisher, StaticCredentials, TaskOutcome,
};

struct Request {
    method: String,
    path: String,
    body: String,
    authorized: bool,
}

type Handler = Box<dyn Fn(&Request, &str) -> (u16, String) + Send>;

/// Serves `connections` requests, one per connection, through `handler`.
fn spawn_server(connections: usize, handler: Handler) -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&log);
    let base = format!("http://{addr}");
    thread::spawn(move || {
        for _ in 0..connections {
            let Ok((stream, _)) = listener.accept() else { return };
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut parts = request_line.split_whitespace();
            let method = parts.next().unwrap_or_default().to_string();
            let path = parts.next().unwrap_or_default().to_string();

            let mut content_length = 0usize;
            let mut authorized = false;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                if header == "\r\n" || header.is_empty() {
                    break;
                }
                let lower = header.to_ascii_lowercase();
                if let Some(value) = lower.strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                if lower.starts_with("authorization: basic") {
                    authorized = true;
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();

            let request = Request {
                method,
                path,
                body: String::from_utf8_lossy(&body).into_owned(),
                authorized,
            };
            seen.lock()
                .unwrap()
                .push(format!("{} {}", request.method, request.path));
            let (status, reply) = handler(&request, &base);
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                reply.len()
            )
            .unwrap();
            stream.flush().unwrap();
        }
    });
    (addr.port(), log)
}

fn config(port: u16) -> PublishConfig {
    PublishConfig {
        host: "127.0.0.1".to_string(),
        port,
        https: Some(false),
        ..PublishConfig::default()
    }
}

#[test]
fn missing_store_is_created_and_crs_assigned() {
    let imports = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&imports);
    let (port, log) = spawn_server(
        7,
        Box::new(move |request: &Request, base: &str| {
            assert!(request.authorized);
            match (request.method.as_str(), request.path.as_str()) {
                ("GET", "/geoserver/rest/layers/roads.html") => (404, String::new()),
                ("POST", "/geoserver/rest/imports") => {
                    let mut count = counter.lock().unwrap();
                    *count += 1;
                    assert!(request.body.contains("/data/roads.json"));
                    if *count == 1 {
                        (500, "Target store does not exist".to_string())
                    } else {
                        let body = format!(
                            r#"{{"import":{{"href":"{base}/geoserver/rest/imports/1","tasks":[{{"href":"{base}/geoserver/rest/imports/1/tasks/0"}}]}}}}"#
                        );
                        (201, body)
                    }
                }
                ("POST", "/geoserver/rest/workspaces/sde/datastores") => {
                    assert!(request.body.contains("\"PostGIS\""));
                    (201, String::new())
                }
                ("POST", "/geoserver/rest/imports/1") => (204, String::new()),
                ("GET", "/geoserver/rest/imports/1") => (
                    200,
                    format!(
                        r#"{{"import":{{"tasks":[{{"state":"NO_CRS","href":"{base}/geoserver/rest/imports/1/tasks/0"}}]}}}}"#
                    ),
                ),
                ("PUT", "/geoserver/rest/imports/1/tasks/0") => {
                    assert!(request.body.contains("EPSG:4326"));
                    (200, String::new())
                }
                other => panic!("unexpected request {other:?}"),
            }
        }),
    );

    let publisher = GeoServerPublisher::new(
        config(port),
        StaticCredentials::new(Some("admin".into()), Some("geoserver".into())),
        Duration::from_secs(10),
    )
    .unwrap();
    let outcome = publisher.publish(Path::new("/data/roads.json")).unwrap();

    assert_eq!(
        outcome,
        PublishOutcome::Submitted {
            layer: "roads".to_string(),
            already_existed: false,
            tasks: vec![TaskOutcome {
                state: "NO_CRS".to_string(),
                srs_assigned: true,
            }],
        }
    );
    assert_eq!(log.lock().unwrap().len(), 7);
}

#[test]
fn import_without_tasks_is_reported() {
    let (port, _) = spawn_server(
        2,
        Box::new(|request: &Request, base: &str| match request.method.as_str() {
            "GET" => (200, String::new()),
            _ => (
                201,
                format!(r#"{{"import":{{"href":"{base}/geoserver/rest/imports/2","tasks":[]}}}}"#),
            ),
        }),
    );
    let publisher =
        GeoServerPublisher::new(config(port), StaticCredentials::default(), Duration::from_secs(10))
            .unwrap();

    assert_eq!(
        publisher.publish(Path::new("/data/parks.csv")).unwrap(),
        PublishOutcome::NoTasks {
            layer: "parks".to_string()
        }
    );
}

#[test]
fn unauthorized_is_an_error_not_a_prompt() {
    let (port, _) = spawn_server(1, Box::new(|_: &Request, _: &str| (401, String::new())));
    let publisher =
        GeoServerPublisher::new(config(port), StaticCredentials::default(), Duration::from_secs(10))
            .unwrap();

    assert_matches!(
        publisher.publish(Path::new("/data/roads.json")),
        Err(WranglerError::Unauthorized(_))
    );
}

#[test]
fn failed_task_start_is_an_error() {
    let (port, log) = spawn_server(
        3,
        Box::new(|request: &Request, base: &str| match request.method.as_str() {
            "GET" => (404, String::new()),
            _ if request.path == "/geoserver/rest/imports" => (
                201,
                format!(
                    r#"{{"import":{{"href":"{base}/geoserver/rest/imports/3","tasks":[{{"href":"{base}/geoserver/rest/imports/3/tasks/0"}}]}}}}"#
                ),
            ),
            _ => (500, String::new()),
        }),
    );
    let publisher =
        GeoServerPublisher::new(config(port), StaticCredentials::default(), Duration::from_secs(10))
            .unwrap();

    assert_matches!(
        publisher.publish(Path::new("/data/roads.json")),
        Err(WranglerError::HttpStatus { status: 500, .. })
    );
    assert_eq!(
        log.lock().unwrap().last().map(String::as_str),
        Some("POST /geoserver/rest/imports/3")
    );
}
