use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::info;

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::WranglerError;

const CHUNK_SIZE: usize = 8 * 1024;

pub trait SourceFetcher {
    fn fetch(
        &self,
        url: Option<&str>,
        file_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, WranglerError>;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    work_dir: PathBuf,
}

impl HttpFetcher {
    pub fn new(work_dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self, WranglerError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("datawrangler/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| WranglerError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| WranglerError::Http(err.to_string()))?;
        Ok(Self {
            client,
            work_dir: work_dir.into(),
        })
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Each source gets its own folder: `<work_dir>/<file_name>/<file_name>`.
    pub fn destination(&self, file_name: &str) -> PathBuf {
        self.work_dir.join(file_name).join(file_name)
    }
}

impl SourceFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: Option<&str>,
        file_name: &str,
        sink: &dyn ProgressSink,
    ) -> Result<PathBuf, WranglerError> {
        let url = url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| WranglerError::MissingUrl(file_name.to_string()))?;
        info!(file = file_name, url, "downloading");

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|err| WranglerError::Http(format!("{url}: {err}")))?;
        let status = response.status().as_u16();
        if status >= 400 {
            return Err(WranglerError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        let total = response.content_length();

        let destination = self.destination(file_name);
        let folder = destination
            .parent()
            .ok_or_else(|| WranglerError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(folder).map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".download")
            .tempfile_in(folder)
            .map_err(|err| WranglerError::Filesystem(err.to_string()))?;

        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut received = 0u64;
        loop {
            let read = response
                .read(&mut buffer)
                .map_err(|err| WranglerError::Http(format!("{url}: {err}")))?;
            if read == 0 {
                break;
            }
            temp.write_all(&buffer[..read])
                .map_err(|err| WranglerError::Filesystem(err.to_string()))?;
            received += read as u64;
            sink.event(ProgressEvent::Download {
                name: file_name.to_string(),
                received,
                total,
            });
        }

        if destination.exists() {
            fs::remove_file(&destination)
                .map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        }
        temp.persist(&destination)
            .map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        sink.event(ProgressEvent::Message(format!("finished downloading {file_name}")));
        std::path::absolute(&destination).map_err(|err| WranglerError::Filesystem(err.to_string()))
    }
}
