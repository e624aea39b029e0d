use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::WranglerError;
use crate::format::LogicalFormat;
use crate::fs_util::{extract_archive, files_with_extension};
use crate::sheet::workbook_to_csv;
use crate::vector::VectorConverter;

pub struct Normalizer<C: VectorConverter> {
    converter: C,
}

impl<C: VectorConverter> Normalizer<C> {
    pub fn new(converter: C) -> Self {
        Self { converter }
    }

    /// Returns the files to ingest for `path`. Any extraction or conversion
    /// failure aborts the whole call; files already written stay on disk.
    pub fn normalize(
        &self,
        path: &Path,
        format: LogicalFormat,
    ) -> Result<Vec<PathBuf>, WranglerError> {
        if let Some(member_ext) = format.archive_member_ext() {
            let folder = extract_archive(path)?;
            let members = files_with_extension(&folder, member_ext)?;
            info!(
                archive = %path.display(),
                members = members.len(),
                "extracted archive"
            );
            return members
                .into_iter()
                .map(|member| self.convert_if_needed(member, format))
                .collect();
        }

        if format.is_spreadsheet() {
            let sheets = workbook_to_csv(path)?;
            info!(workbook = %path.display(), sheets = sheets.len(), "converted workbook");
            return Ok(sheets);
        }

        Ok(vec![self.convert_if_needed(path.to_path_buf(), format)?])
    }

    fn convert_if_needed(
        &self,
        path: PathBuf,
        format: LogicalFormat,
    ) -> Result<PathBuf, WranglerError> {
        match format.vector_driver() {
            Some(driver) => {
                debug!(path = %path.display(), driver = driver.name(), "converting to GeoJSON");
                self.converter.to_feature_collection(&path, driver)
            }
            None => Ok(path),
        }
    }
}
