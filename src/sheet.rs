use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use calamine::{Data, Reader, open_workbook_auto};
use regex::Regex;

use crate::error::WranglerError;
use crate::fs_util::working_folder;

static UNSAFE_FILE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[/\\:*?"<>|\x00-\x1f]+"#).expect("static regex"));

/// Writes every sheet of the workbook as `<working folder>/<sheet>.csv`.
pub fn workbook_to_csv(path: &Path) -> Result<Vec<PathBuf>, WranglerError> {
    let folder = working_folder(path)?;
    let mut workbook = open_workbook_auto(path)
        .map_err(|err| WranglerError::Spreadsheet(format!("open {}: {err}", path.display())))?;

    let mut outputs = Vec::new();
    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|err| WranglerError::Spreadsheet(format!("sheet {sheet_name}: {err}")))?;
        let csv_path = unused_csv_path(&folder, &sheet_file_stem(&sheet_name), &outputs);
        let mut writer = csv::WriterBuilder::new()
            .quote_style(csv::QuoteStyle::Always)
            .from_path(&csv_path)
            .map_err(|err| WranglerError::Spreadsheet(err.to_string()))?;
        for row in range.rows() {
            writer
                .write_record(row.iter().map(cell_text))
                .map_err(|err| WranglerError::Spreadsheet(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        outputs.push(csv_path);
    }
    Ok(outputs)
}

// sheet names that clean to the same stem get a numeric suffix
fn unused_csv_path(folder: &Path, stem: &str, taken: &[PathBuf]) -> PathBuf {
    let mut candidate = folder.join(format!("{stem}.csv"));
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = folder.join(format!("{stem}_{suffix}.csv"));
        suffix += 1;
    }
    candidate
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn sheet_file_stem(sheet_name: &str) -> String {
    let cleaned = UNSAFE_FILE_CHARS.replace_all(sheet_name.trim(), "_");
    if cleaned.is_empty() || cleaned.chars().all(|ch| ch == '.') {
        "sheet".to_string()
    } else {
        cleaned.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sheet_names_are_made_file_safe() {
        assert_eq!(sheet_file_stem("2015/16 totals"), "2015_16 totals");
        assert_eq!(sheet_file_stem("Sheet1"), "Sheet1");
        assert_eq!(sheet_file_stem(".."), "sheet");
    }

    #[test]
    fn clashing_stems_get_a_suffix() {
        let folder = Path::new("/work/book");
        let taken = vec![folder.join("A_B.csv"), folder.join("A_B_2.csv")];
        assert_eq!(unused_csv_path(folder, "A_B", &taken), folder.join("A_B_3.csv"));
        assert_eq!(unused_csv_path(folder, "C", &taken), folder.join("C.csv"));
    }
}
