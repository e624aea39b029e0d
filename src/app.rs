use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{
    COUNTRY_CODES, DATA_SOURCES, FetchStamp, Record, SOURCE_KEY, SourceDescriptor,
};
use crate::error::WranglerError;
use crate::fetch::SourceFetcher;
use crate::format::{LogicalFormat, ParseKind};
use crate::normalize::Normalizer;
use crate::parse::parse;
use crate::publish::{PublishReport, Publisher};
use crate::schedule::StalenessPolicy;
use crate::store::DocumentStore;
use crate::upsert::{Submission, submit};
use crate::vector::VectorConverter;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Download {
        name: String,
        received: u64,
        total: Option<u64>,
    },
    Message(String),
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub collection: Option<String>,
    pub data_key: Option<String>,
    pub header: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum FileStatus {
    Imported { accepted: u64, rejected: u64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub collection: String,
    pub files: Vec<FileReport>,
}

impl ImportReport {
    pub fn accepted(&self) -> u64 {
        self.files
            .iter()
            .map(|file| match file.status {
                FileStatus::Imported { accepted, .. } => accepted,
                FileStatus::Skipped { .. } => 0,
            })
            .sum()
    }

    pub fn rejected(&self) -> u64 {
        self.files
            .iter()
            .map(|file| match file.status {
                FileStatus::Imported { rejected, .. } => rejected,
                FileStatus::Skipped { .. } => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SourceStatus {
    Fresh,
    Refreshed { data_date: FetchStamp },
    FetchFailed { reason: String },
    Failed { reason: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub import_name: String,
    #[serde(flatten)]
    pub status: SourceStatus,
    pub files: Vec<FileReport>,
}

impl SourceReport {
    fn new(import_name: &str, status: SourceStatus) -> Self {
        Self {
            import_name: import_name.to_string(),
            status,
            files: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub now: FetchStamp,
    pub sources: Vec<SourceReport>,
}

impl RefreshReport {
    pub fn refreshed(&self) -> usize {
        self.sources
            .iter()
            .filter(|source| matches!(source.status, SourceStatus::Refreshed { .. }))
            .count()
    }
}

pub struct Wrangler<S: DocumentStore, F: SourceFetcher, C: VectorConverter> {
    store: S,
    fetcher: F,
    normalizer: Normalizer<C>,
    policy: StalenessPolicy,
}

impl<S: DocumentStore, F: SourceFetcher, C: VectorConverter> Wrangler<S, F, C> {
    pub fn new(store: S, fetcher: F, converter: C, policy: StalenessPolicy) -> Self {
        Self {
            store,
            fetcher,
            normalizer: Normalizer::new(converter),
            policy,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn seed_country_codes(&self, path: &Path) -> Result<Option<ImportReport>, WranglerError> {
        if !self.store.is_empty(COUNTRY_CODES)? {
            return Ok(None);
        }
        if !path.is_file() {
            warn!(path = %path.display(), "country code table not found, skipping seed");
            return Ok(None);
        }
        let options = ImportOptions {
            collection: Some(COUNTRY_CODES.to_string()),
            ..ImportOptions::default()
        };
        self.import_file(path, LogicalFormat::Tsv, &options).map(Some)
    }

    /// Bulk-loads source descriptors from a CSV sheet into `data_sources`.
    ///
    /// A source that is already stored keeps its fetch bookkeeping unless the
    /// sheet carries a newer `data_date` for it.
    pub fn load_sources(&self, csv_path: &Path) -> Result<ImportReport, WranglerError> {
        let mut accepted = 0u64;
        let mut rejected = 0u64;
        let status = match parse(csv_path, ParseKind::Csv, 0) {
            Ok(records) => {
                for record in records {
                    match record.and_then(|record| self.store_descriptor(record)) {
                        Ok(Submission::Accepted) => accepted += 1,
                        Ok(Submission::Rejected(_)) => rejected += 1,
                        Err(err) => {
                            warn!(path = %csv_path.display(), error = %err, "source row rejected");
                            rejected += 1;
                        }
                    }
                }
                info!(accepted, rejected, "loaded source descriptors");
                FileStatus::Imported { accepted, rejected }
            }
            Err(err) => {
                warn!(path = %csv_path.display(), error = %err, "source sheet skipped");
                FileStatus::Skipped {
                    reason: err.to_string(),
                }
            }
        };
        Ok(ImportReport {
            collection: DATA_SOURCES.to_string(),
            files: vec![FileReport {
                path: csv_path.display().to_string(),
                status,
            }],
        })
    }

    fn store_descriptor(&self, record: Record) -> Result<Submission, WranglerError> {
        let mut descriptor = SourceDescriptor::from_record(record)?;
        let key = serde_json::Value::String(descriptor.import_name.clone());
        if let Some(stored) = self.store.find_by_key(DATA_SOURCES, SOURCE_KEY, &key)? {
            if let Ok(stored) = SourceDescriptor::from_record(stored) {
                descriptor.keep_bookkeeping_from(&stored);
            }
        }
        Ok(submit(
            &self.store,
            &descriptor.to_record()?,
            DATA_SOURCES,
            Some(SOURCE_KEY),
        ))
    }

    pub fn sources(&self) -> Result<Vec<SourceDescriptor>, WranglerError> {
        let mut sources = Vec::new();
        for record in self.store.find_all(DATA_SOURCES)? {
            match SourceDescriptor::from_record(record) {
                Ok(source) => sources.push(source),
                Err(err) => warn!(error = %err, "ignoring unreadable source descriptor"),
            }
        }
        Ok(sources)
    }

    /// Normalizes `path`, parses every resulting file and submits each record.
    ///
    /// Normalization failures abort the import. A file that cannot be parsed is
    /// skipped and its siblings still go in.
    pub fn import_file(
        &self,
        path: &Path,
        format: LogicalFormat,
        options: &ImportOptions,
    ) -> Result<ImportReport, WranglerError> {
        let collection = match &options.collection {
            Some(collection) => collection.clone(),
            None => path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    WranglerError::Filesystem(format!("no file name in {}", path.display()))
                })?,
        };
        let files = self.normalizer.normalize(path, format)?;
        let reports = files
            .iter()
            .map(|file| {
                self.import_normalized(
                    file,
                    format.parse_kind(),
                    &collection,
                    options.data_key.as_deref(),
                    options.header.unwrap_or(0),
                )
            })
            .collect();
        Ok(ImportReport {
            collection,
            files: reports,
        })
    }

    fn import_normalized(
        &self,
        path: &Path,
        kind: ParseKind,
        collection: &str,
        data_key: Option<&str>,
        header: usize,
    ) -> FileReport {
        info!(path = %path.display(), collection, "importing");
        let status = match parse(path, kind, header) {
            Ok(records) => {
                let mut accepted = 0u64;
                let mut rejected = 0u64;
                for record in records {
                    let submission = match record {
                        Ok(record) => submit(&self.store, &record, collection, data_key),
                        Err(err) => {
                            warn!(error = %err, "unreadable record");
                            rejected += 1;
                            continue;
                        }
                    };
                    if submission.is_accepted() {
                        accepted += 1;
                    } else {
                        rejected += 1;
                    }
                }
                info!(collection, accepted, rejected, "imported documents");
                FileStatus::Imported { accepted, rejected }
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "file skipped");
                FileStatus::Skipped {
                    reason: err.to_string(),
                }
            }
        };
        FileReport {
            path: path.display().to_string(),
            status,
        }
    }

    /// True when the source has expired or its collection holds nothing yet.
    pub fn is_due(&self, source: &SourceDescriptor, now: FetchStamp) -> Result<bool, WranglerError> {
        if self
            .policy
            .is_expired(source.data_date, source.refresh_rate, now)
        {
            return Ok(true);
        }
        self.store.is_empty(&source.import_name)
    }

    pub fn refresh_all(
        &self,
        now: FetchStamp,
        sink: &dyn ProgressSink,
    ) -> Result<RefreshReport, WranglerError> {
        let sources = self.sources()?;
        let reports = sources
            .iter()
            .map(|source| self.refresh_source(source, now, sink))
            .collect();
        Ok(RefreshReport {
            now,
            sources: reports,
        })
    }

    pub fn refresh_source(
        &self,
        source: &SourceDescriptor,
        now: FetchStamp,
        sink: &dyn ProgressSink,
    ) -> SourceReport {
        let name = source.import_name.as_str();
        let format = match source.format() {
            Ok(format) => format,
            Err(err) => {
                warn!(source = name, error = %err, "source skipped");
                return SourceReport::new(name, SourceStatus::Skipped {
                    reason: err.to_string(),
                });
            }
        };

        match self.is_due(source, now) {
            Ok(true) => {}
            Ok(false) => return SourceReport::new(name, SourceStatus::Fresh),
            Err(err) => {
                warn!(source = name, error = %err, "cannot read collection");
                return SourceReport::new(name, SourceStatus::Failed {
                    reason: err.to_string(),
                });
            }
        }

        sink.event(ProgressEvent::Message(format!("refreshing {name}")));
        let download = match self.fetcher.fetch(
            source.data_url.as_deref(),
            &source.download_name(format),
            sink,
        ) {
            Ok(path) => path,
            Err(err) => {
                warn!(source = name, error = %err, "download failed");
                return SourceReport::new(name, SourceStatus::FetchFailed {
                    reason: err.to_string(),
                });
            }
        };

        let options = ImportOptions {
            collection: Some(source.import_name.clone()),
            data_key: source.data_key.clone(),
            header: source.header,
        };
        let import = match self.import_file(&download, format, &options) {
            Ok(import) => import,
            Err(err) => {
                warn!(source = name, error = %err, "normalization failed");
                return SourceReport::new(name, SourceStatus::Failed {
                    reason: err.to_string(),
                });
            }
        };

        let data_date = source.data_date.map_or(now, |previous| previous.max(now));
        let mut updated = source.clone();
        updated.data_date = Some(data_date);
        updated.local_file_paths = vec![download.display().to_string()];
        updated.normalized_file_paths = import.files.iter().map(|file| file.path.clone()).collect();

        let status = match self.write_back(&updated) {
            Ok(()) => SourceStatus::Refreshed { data_date },
            Err(err) => {
                warn!(source = name, error = %err, "bookkeeping not stored");
                SourceStatus::Failed {
                    reason: err.to_string(),
                }
            }
        };
        SourceReport {
            import_name: name.to_string(),
            status,
            files: import.files,
        }
    }

    fn write_back(&self, source: &SourceDescriptor) -> Result<(), WranglerError> {
        match submit(&self.store, &source.to_record()?, DATA_SOURCES, Some(SOURCE_KEY)) {
            Submission::Accepted => Ok(()),
            Submission::Rejected(rejection) => Err(WranglerError::Store(format!(
                "descriptor {} rejected: {rejection:?}",
                source.import_name
            ))),
        }
    }

    /// Hands every normalized file of the selected sources to the publisher.
    /// Outcomes are reported only; nothing is written back to the descriptors.
    pub fn publish_all<P: Publisher>(
        &self,
        publisher: &P,
        only: Option<&str>,
    ) -> Result<Vec<PublishReport>, WranglerError> {
        let mut reports = Vec::new();
        for source in self.sources()? {
            if only.is_some_and(|name| name != source.import_name) {
                continue;
            }
            let paths = if source.normalized_file_paths.is_empty() {
                &source.local_file_paths
            } else {
                &source.normalized_file_paths
            };
            for path in paths {
                info!(source = %source.import_name, path, "publishing");
                let outcome = publisher.publish(&PathBuf::from(path));
                if let Err(err) = &outcome {
                    warn!(source = %source.import_name, path, error = %err, "publish failed");
                }
                reports.push(PublishReport::new(&source.import_name, path, outcome));
            }
        }
        Ok(reports)
    }
}
