use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;

use datawrangler::app::{ProgressEvent, ProgressSink};
use datawrangler::error::WranglerError;
use datawrangler::fetch::{HttpFetcher, SourceFetcher};

#[derive(Default)]
struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Answers a single request with `status` and `body`, returning the base URL.
fn serve_once(status: &'static str, body: &'static [u8]) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        while reader.read_line(&mut line).unwrap() > 0 {
            if line == "\r\n" {
                break;
            }
            line.clear();
        }
        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        )
        .unwrap();
        stream.write_all(body).unwrap();
        stream.flush().unwrap();
    });
    format!("http://{addr}")
}

#[test]
fn download_lands_in_per_source_folder() {
    let temp = tempfile::tempdir().unwrap();
    let url = serve_once("200 OK", b"id,name\n1,Alpha\n");
    let fetcher = HttpFetcher::new(temp.path(), Duration::from_secs(10)).unwrap();
    let sink = RecordingSink::default();

    let path = fetcher
        .fetch(Some(&format!("{url}/stations.csv")), "stations.csv", &sink)
        .unwrap();

    assert!(path.is_absolute());
    assert!(path.ends_with("stations.csv/stations.csv"));
    assert_eq!(fs::read(&path).unwrap(), b"id,name\n1,Alpha\n");

    let events = sink.events.lock().unwrap();
    assert!(events.iter().any(|event| matches!(
        event,
        ProgressEvent::Download { received: 16, total: Some(16), .. }
    )));
    assert_matches!(events.last(), Some(ProgressEvent::Message(_)));
}

#[test]
fn error_status_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let url = serve_once("404 Not Found", b"missing");
    let fetcher = HttpFetcher::new(temp.path(), Duration::from_secs(10)).unwrap();

    let result = fetcher.fetch(Some(&url), "gone.json", &RecordingSink::default());
    assert_matches!(result, Err(WranglerError::HttpStatus { status: 404, .. }));
    assert!(!fetcher.destination("gone.json").exists());
}

#[test]
fn missing_url_is_refused_without_a_request() {
    let temp = tempfile::tempdir().unwrap();
    let fetcher = HttpFetcher::new(temp.path(), Duration::from_secs(10)).unwrap();

    assert_matches!(
        fetcher.fetch(None, "nothing.csv", &RecordingSink::default()),
        Err(WranglerError::MissingUrl(_))
    );
    assert_matches!(
        fetcher.fetch(Some("  "), "nothing.csv", &RecordingSink::default()),
        Err(WranglerError::MissingUrl(_))
    );
}

#[test]
fn refused_connection_is_a_transport_error() {
    let temp = tempfile::tempdir().unwrap();
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let fetcher = HttpFetcher::new(temp.path(), Duration::from_secs(5)).unwrap();

    assert_matches!(
        fetcher.fetch(
            Some(&format!("http://127.0.0.1:{port}/x")),
            "x.csv",
            &RecordingSink::default()
        ),
        Err(WranglerError::Http(_))
    );
}
