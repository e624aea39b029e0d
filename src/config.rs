use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::WranglerError;
use crate::schedule::StalenessPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "datawrangler.json";
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store_path: Option<String>,
    #[serde(default)]
    pub work_dir: Option<String>,
    #[serde(default)]
    pub country_codes: Option<String>,
    #[serde(default)]
    pub sources_csv: Option<String>,
    #[serde(default)]
    pub fetch_timeout_secs: Option<u64>,
    #[serde(default)]
    pub staleness: Option<StalenessPolicy>,
    #[serde(default)]
    pub publish: Option<PublishConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PublishConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Defaults to https when the port ends in 443.
    #[serde(default)]
    pub https: Option<bool>,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default = "default_target_store")]
    pub target_store: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_srs")]
    pub default_srs: String,
    #[serde(default = "default_datastore_params")]
    pub datastore: BTreeMap<String, String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            https: None,
            workspace: default_workspace(),
            target_store: default_target_store(),
            username: None,
            password: None,
            accept_invalid_certs: false,
            default_srs: default_srs(),
            datastore: default_datastore_params(),
        }
    }
}

impl PublishConfig {
    pub fn base_url(&self) -> String {
        let https = self
            .https
            .unwrap_or_else(|| self.port.to_string().ends_with("443"));
        let scheme = if https { "https" } else { "http" };
        format!("{scheme}://{}:{}/geoserver/rest", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub store_path: Utf8PathBuf,
    pub work_dir: Utf8PathBuf,
    pub country_codes: Utf8PathBuf,
    pub sources_csv: Option<Utf8PathBuf>,
    pub fetch_timeout: Duration,
    pub staleness: StalenessPolicy,
    pub publish: Option<PublishConfig>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `datawrangler.json` when none is given. Only the
    /// implicit file may be absent, in which case every default applies.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, WranglerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| WranglerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| WranglerError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, WranglerError> {
        let store_path = match config.store_path {
            Some(path) => Utf8PathBuf::from(path),
            None => default_store_path()?,
        };
        let timeout = config
            .fetch_timeout_secs
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
        if timeout == 0 {
            return Err(WranglerError::ConfigParse(
                "fetch_timeout_secs must be positive".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            store_path,
            work_dir: Utf8PathBuf::from(config.work_dir.unwrap_or_else(|| "DataSources".to_string())),
            country_codes: Utf8PathBuf::from(
                config
                    .country_codes
                    .unwrap_or_else(|| "country_codes.tsv".to_string()),
            ),
            sources_csv: config.sources_csv.map(Utf8PathBuf::from),
            fetch_timeout: Duration::from_secs(timeout),
            staleness: config.staleness.unwrap_or_default(),
            publish: config.publish,
        })
    }
}

pub fn default_store_path() -> Result<Utf8PathBuf, WranglerError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.data_dir().join("datawrangler").join("geodata.sqlite3"))
                .ok()
        })
        .ok_or_else(|| WranglerError::Filesystem("unable to resolve data directory".to_string()))
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workspace() -> String {
    "sde".to_string()
}

fn default_target_store() -> String {
    "imports".to_string()
}

fn default_srs() -> String {
    "EPSG:4326".to_string()
}

pub fn default_datastore_params() -> BTreeMap<String, String> {
    [
        ("dbtype", "postgis"),
        ("host", "localhost"),
        ("port", "5432"),
        ("database", "imports"),
        ("schema", "public"),
        ("user", "importer"),
        ("passwd", "importer"),
        ("min connections", "1"),
        ("max connections", "10"),
        ("Connection timeout", "20"),
        ("fetch size", "1000"),
        ("Loose bbox", "true"),
        ("Estimated extends", "true"),
        ("Expose primary keys", "false"),
        ("validate connections", "true"),
        ("preparedStatements", "false"),
        ("Max open prepared statements", "50"),
        ("create database", "false"),
        ("namespace", "http://geoserver.sf.net"),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value.to_string()))
    .collect()
}
