use std::fmt;
use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::config::PublishConfig;
use crate::error::WranglerError;

pub const PUBLISH_USER_ENV: &str = "DATAWRANGLER_PUBLISH_USER";
pub const PUBLISH_PASSWORD_ENV: &str = "DATAWRANGLER_PUBLISH_PASSWORD";

const MISSING_STORE: &str = "Target store does not exist";

pub trait Publisher {
    fn publish(&self, path: &Path) -> Result<PublishOutcome, WranglerError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum PublishOutcome {
    Submitted {
        layer: String,
        already_existed: bool,
        tasks: Vec<TaskOutcome>,
    },
    NoTasks { layer: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub state: String,
    pub srs_assigned: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub source: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PublishOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishReport {
    pub fn new(source: &str, path: &str, outcome: Result<PublishOutcome, WranglerError>) -> Self {
        let (outcome, error) = match outcome {
            Ok(outcome) => (Some(outcome), None),
            Err(err) => (None, Some(err.to_string())),
        };
        Self {
            source: source.to_string(),
            path: path.to_string(),
            outcome,
            error,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies basic-auth credentials without ever prompting.
pub trait CredentialProvider {
    fn credentials(&self) -> Option<Credentials>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<Credentials>);

impl StaticCredentials {
    /// Both halves are needed; a lone username or password yields nothing.
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self(
            username
                .zip(password)
                .map(|(username, password)| Credentials { username, password }),
        )
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Option<Credentials> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> Option<Credentials> {
        let username = std::env::var(PUBLISH_USER_ENV).ok()?;
        let password = std::env::var(PUBLISH_PASSWORD_ENV).ok()?;
        Some(Credentials { username, password })
    }
}

pub struct ChainedCredentials<A, B> {
    first: A,
    second: B,
}

impl<A: CredentialProvider, B: CredentialProvider> ChainedCredentials<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: CredentialProvider, B: CredentialProvider> CredentialProvider for ChainedCredentials<A, B> {
    fn credentials(&self) -> Option<Credentials> {
        self.first
            .credentials()
            .or_else(|| self.second.credentials())
    }
}

pub struct GeoServerPublisher<P: CredentialProvider> {
    client: Client,
    config: PublishConfig,
    base_url: String,
    credentials: P,
}

impl<P: CredentialProvider> GeoServerPublisher<P> {
    pub fn new(config: PublishConfig, credentials: P, timeout: Duration) -> Result<Self, WranglerError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .timeout(timeout)
            .build()
            .map_err(|err| WranglerError::Http(err.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url(),
            config,
            credentials,
        })
    }

    fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, WranglerError> {
        let request = match self.credentials.credentials() {
            Some(creds) => request.basic_auth(creds.username, Some(creds.password)),
            None => request,
        };
        let response = request
            .send()
            .map_err(|err| WranglerError::Http(format!("{url}: {err}")))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(WranglerError::Unauthorized(url.to_string()));
        }
        Ok(response)
    }

    fn check_status(response: Response, url: &str) -> Result<Response, WranglerError> {
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(WranglerError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        Ok(response)
    }

    fn json_body(response: Response, url: &str) -> Result<Value, WranglerError> {
        Self::check_status(response, url)?
            .json()
            .map_err(|err| WranglerError::Publish(format!("{url}: {err}")))
    }

    fn layer_exists(&self, layer: &str) -> Result<bool, WranglerError> {
        let url = format!("{}/layers/{layer}.html", self.base_url);
        let response = self.send(self.client.get(&url), &url)?;
        Ok(response.status() == StatusCode::OK)
    }

    fn post_import(&self, payload: &Value) -> Result<(StatusCode, String), WranglerError> {
        let url = format!("{}/imports", self.base_url);
        let response = self.send(self.client.post(&url).json(payload), &url)?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| WranglerError::Http(format!("{url}: {err}")))?;
        Ok((status, text))
    }

    fn create_datastore(&self) -> Result<(), WranglerError> {
        let url = format!(
            "{}/workspaces/{}/datastores",
            self.base_url, self.config.workspace
        );
        let response = self.send(
            self.client
                .post(&url)
                .json(&datastore_payload(&self.config, &self.base_url)),
            &url,
        )?;
        if response.status() != StatusCode::CREATED {
            return Err(WranglerError::Publish(format!(
                "creating datastore {} returned status {}",
                self.config.target_store,
                response.status().as_u16()
            )));
        }
        info!(store = %self.config.target_store, "datastore created");
        Ok(())
    }

    fn run_tasks(&self, import_href: &str) -> Result<Vec<TaskOutcome>, WranglerError> {
        Self::check_status(self.send(self.client.post(import_href), import_href)?, import_href)?;
        let body = Self::json_body(self.send(self.client.get(import_href), import_href)?, import_href)?;

        let mut outcomes = Vec::new();
        for task in tasks_of(&body) {
            let state = task
                .get("state")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string();
            let mut srs_assigned = false;
            if state == "NO_CRS" {
                let href = task
                    .get("href")
                    .and_then(Value::as_str)
                    .unwrap_or(import_href);
                let payload = json!({ "layer": { "srs": self.config.default_srs } });
                let response = self.send(self.client.put(href).json(&payload), href)?;
                srs_assigned = response.status().is_success();
                if !srs_assigned {
                    warn!(href, status = response.status().as_u16(), "could not assign default SRS");
                }
            }
            info!(import = import_href, state = %state, "import task");
            outcomes.push(TaskOutcome { state, srs_assigned });
        }
        Ok(outcomes)
    }
}

impl<P: CredentialProvider> Publisher for GeoServerPublisher<P> {
    fn publish(&self, path: &Path) -> Result<PublishOutcome, WranglerError> {
        let layer = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| WranglerError::Publish(format!("no layer name in {}", path.display())))?;

        let already_existed = self.layer_exists(&layer)?;
        if already_existed {
            info!(layer = %layer, "layer already exists");
        }

        let payload = import_payload(&self.config, path);
        let (mut status, mut text) = self.post_import(&payload)?;
        if text.contains(MISSING_STORE) {
            warn!(store = %self.config.target_store, "target store does not exist");
            self.create_datastore()?;
            (status, text) = self.post_import(&payload)?;
        }
        if status.as_u16() >= 400 {
            return Err(WranglerError::HttpStatus {
                url: format!("{}/imports", self.base_url),
                status: status.as_u16(),
            });
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|err| WranglerError::Publish(format!("unreadable import response: {err}")))?;
        let href = body
            .pointer("/import/href")
            .and_then(Value::as_str)
            .map(str::to_string);
        let (Some(href), false) = (href, tasks_of(&body).is_empty()) else {
            warn!(path = %path.display(), "importer found nothing to publish");
            return Ok(PublishOutcome::NoTasks { layer });
        };

        let tasks = self.run_tasks(&href)?;
        Ok(PublishOutcome::Submitted {
            layer,
            already_existed,
            tasks,
        })
    }
}

fn tasks_of(body: &Value) -> &[Value] {
    body.pointer("/import/tasks")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

pub fn import_payload(config: &PublishConfig, path: &Path) -> Value {
    json!({
        "import": {
            "targetWorkspace": { "workspace": { "name": config.workspace } },
            "targetStore": { "dataStore": { "name": config.target_store } },
            "data": { "type": "file", "file": path.display().to_string() }
        }
    })
}

pub fn datastore_payload(config: &PublishConfig, base_url: &str) -> Value {
    let entries: Vec<Value> = config
        .datastore
        .iter()
        .map(|(key, value)| json!({ "@key": key, "$": value }))
        .collect();
    json!({
        "dataStore": {
            "name": config.target_store,
            "type": "PostGIS",
            "enabled": true,
            "workspace": {
                "name": config.workspace,
                "href": format!("{base_url}/workspaces/{}.json", config.workspace)
            },
            "connectionParameters": { "entry": entries },
            "_default": false
        }
    })
}
