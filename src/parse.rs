use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use encoding_rs::{Encoding, UTF_8};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::domain::Record;
use crate::encoding;
use crate::error::WranglerError;
use crate::format::ParseKind;

pub const JSON_SIZE_LIMIT: u64 = 16_000_000;

// tie-break order
const DELIMITERS: [u8; 3] = [b',', b'\t', b';'];

pub enum Records {
    Json {
        path: PathBuf,
        items: std::vec::IntoIter<Value>,
    },
    Delimited {
        path: PathBuf,
        headers: Vec<String>,
        charset: &'static Encoding,
        rows: csv::ByteRecordsIntoIter<BufReader<File>>,
    },
}

impl std::fmt::Debug for Records {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Records::Json { path, items } => f
                .debug_struct("Json")
                .field("path", path)
                .field("items", items)
                .finish(),
            Records::Delimited {
                path,
                headers,
                charset,
                ..
            } => f
                .debug_struct("Delimited")
                .field("path", path)
                .field("headers", headers)
                .field("charset", charset)
                .finish_non_exhaustive(),
        }
    }
}

impl Records {
    pub fn headers(&self) -> &[String] {
        match self {
            Records::Json { .. } => &[],
            Records::Delimited { headers, .. } => headers,
        }
    }
}

impl Iterator for Records {
    type Item = Result<Record, WranglerError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Records::Json { path, items } => items.next().map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(WranglerError::Parse {
                    path: path.clone(),
                    message: format!("expected a JSON object, found {}", json_kind(&other)),
                }),
            }),
            Records::Delimited {
                path,
                headers,
                charset,
                rows,
            } => rows.next().map(|row| {
                let row = row.map_err(|err| WranglerError::Parse {
                    path: path.clone(),
                    message: err.to_string(),
                })?;
                // short rows leave the trailing columns out; surplus fields are dropped
                Ok(headers
                    .iter()
                    .zip(row.iter())
                    .map(|(name, field)| {
                        (name.clone(), Value::String(encoding::decode_field(field, *charset)))
                    })
                    .collect())
            }),
        }
    }
}

pub fn parse(path: &Path, kind: ParseKind, header_offset: usize) -> Result<Records, WranglerError> {
    match kind {
        ParseKind::Json => parse_json(path),
        ParseKind::Csv | ParseKind::Tsv => parse_delimited(path, header_offset),
    }
}

fn parse_json(path: &Path) -> Result<Records, WranglerError> {
    let size = fs::metadata(path)
        .map_err(|err| WranglerError::Filesystem(format!("stat {}: {err}", path.display())))?
        .len();
    if size > JSON_SIZE_LIMIT {
        return Err(WranglerError::Oversized {
            path: path.to_path_buf(),
            size,
            limit: JSON_SIZE_LIMIT,
        });
    }

    let bytes = fs::read(path)
        .map_err(|err| WranglerError::Filesystem(format!("read {}: {err}", path.display())))?;
    let (text, detected) = encoding::decode(&bytes);
    if let Some(detected) = detected {
        info!(path = %path.display(), encoding = detected.name(), "encoding detected");
    }
    let value: Value = serde_json::from_str(&text).map_err(|err| WranglerError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(object) if is_feature_collection(&object) => {
            let features = feature_list(object);
            debug!(path = %path.display(), features = features.len(), "feature collection");
            features
        }
        single => vec![single],
    };
    Ok(Records::Json {
        path: path.to_path_buf(),
        items: items.into_iter(),
    })
}

fn is_feature_collection(object: &Map<String, Value>) -> bool {
    object.get("type").and_then(Value::as_str) == Some("FeatureCollection")
        && object.get("features").is_some_and(Value::is_array)
}

fn feature_list(mut object: Map<String, Value>) -> Vec<Value> {
    match object.remove("features") {
        Some(Value::Array(features)) => features,
        _ => Vec::new(),
    }
}

fn parse_delimited(path: &Path, header_offset: usize) -> Result<Records, WranglerError> {
    let open = || {
        File::open(path)
            .map_err(|err| WranglerError::Filesystem(format!("open {}: {err}", path.display())))
    };
    let detected = encoding::detect_reader_encoding(BufReader::new(open()?))
        .map_err(|err| WranglerError::Filesystem(format!("read {}: {err}", path.display())))?;
    if let Some(detected) = detected {
        info!(path = %path.display(), encoding = detected.name(), "encoding detected");
    }
    let charset = detected.unwrap_or(UTF_8);
    let mut reader = BufReader::new(open()?);
    let mut line = Vec::new();

    for _ in 0..header_offset {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        if read == 0 {
            break;
        }
    }

    line.clear();
    reader
        .read_until(b'\n', &mut line)
        .map_err(|err| WranglerError::Filesystem(err.to_string()))?;
    let header_line = encoding::decode_field(&line, charset);
    let header_line = header_line
        .trim_start_matches('\u{feff}')
        .trim_end_matches(['\r', '\n']);

    let delimiter = sniff_delimiter(header_line)
        .ok_or_else(|| WranglerError::UndetectableDelimiter(path.to_path_buf()))?;
    let headers = header_fields(header_line, delimiter);
    debug!(path = %path.display(), ?headers, "header detected");

    let rows = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
        .into_byte_records();
    Ok(Records::Delimited {
        path: path.to_path_buf(),
        headers,
        charset,
        rows,
    })
}

fn header_fields(line: &str, delimiter: u8) -> Vec<String> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .from_reader(line.as_bytes())
        .into_records()
        .next()
        .and_then(Result::ok)
        .map(|record| record.iter().map(|field| field.trim().to_string()).collect())
        .unwrap_or_default()
}

pub fn sniff_delimiter(line: &str) -> Option<u8> {
    let mut counts = [0usize; DELIMITERS.len()];
    let mut quoted = false;
    for byte in line.bytes() {
        if byte == b'"' {
            quoted = !quoted;
            continue;
        }
        if quoted {
            continue;
        }
        if let Some(idx) = DELIMITERS.iter().position(|candidate| *candidate == byte) {
            counts[idx] += 1;
        }
    }

    let mut best: Option<(u8, usize)> = None;
    for (delimiter, count) in DELIMITERS.iter().zip(counts) {
        if count > best.map_or(0, |(_, seen)| seen) {
            best = Some((*delimiter, count));
        }
    }
    best.map(|(delimiter, _)| delimiter)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
