use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use zip::ZipArchive;

use crate::error::WranglerError;

pub fn working_folder(file_path: &Path) -> Result<PathBuf, WranglerError> {
    let stem = file_path
        .file_stem()
        .ok_or_else(|| WranglerError::Filesystem(format!("no file name in {}", file_path.display())))?;
    let folder = file_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(stem);
    if !folder.is_dir() {
        fs::create_dir_all(&folder).map_err(|err| {
            WranglerError::Filesystem(format!("create {}: {err}", folder.display()))
        })?;
    }
    Ok(folder)
}

/// Unpacks `.zip`/`.kmz` or `.gz` payloads into the archive's working folder.
pub fn extract_archive(archive_path: &Path) -> Result<PathBuf, WranglerError> {
    let ext = archive_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let unpack: fn(&Path, &Path) -> Result<(), WranglerError> = match ext.as_str() {
        "zip" | "kmz" => unpack_zip,
        "gz" => extract_gzip,
        _ => {
            return Err(WranglerError::Archive(format!(
                "{} is not a zip, kmz or gz archive",
                archive_path.display()
            )));
        }
    };
    let folder = working_folder(archive_path)?;
    unpack(archive_path, &folder)?;
    Ok(folder)
}

fn unpack_zip(archive_path: &Path, folder: &Path) -> Result<(), WranglerError> {
    let file = fs::File::open(archive_path).map_err(|err| {
        WranglerError::Archive(format!("open {}: {err}", archive_path.display()))
    })?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| WranglerError::Archive(err.to_string()))?;

    for index in 0..archive.len() {
        let mut member = archive
            .by_index(index)
            .map_err(|err| WranglerError::Archive(err.to_string()))?;
        let relative = member.enclosed_name().ok_or_else(|| {
            WranglerError::Archive(format!("{} escapes the archive folder", member.name()))
        })?;
        let target = folder.join(relative);
        let dir = if member.is_dir() {
            target.as_path()
        } else {
            target.parent().unwrap_or(folder)
        };
        fs::create_dir_all(dir).map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        if member.is_dir() {
            continue;
        }
        let mut written = fs::File::create(&target)
            .map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        io::copy(&mut member, &mut written)
            .map_err(|err| WranglerError::Archive(format!("{}: {err}", member.name())))?;
    }
    Ok(())
}

/// A gzip stream holds a single member; it is written out under the
/// archive's name minus `.gz`.
fn extract_gzip(gz_path: &Path, target_dir: &Path) -> Result<(), WranglerError> {
    let file = fs::File::open(gz_path)
        .map_err(|err| WranglerError::Archive(format!("open gz {}: {err}", gz_path.display())))?;
    let member = gz_path
        .file_stem()
        .ok_or_else(|| WranglerError::Archive(format!("no file name in {}", gz_path.display())))?;
    let mut decoder = GzDecoder::new(file);
    let mut outfile = fs::File::create(target_dir.join(member))
        .map_err(|err| WranglerError::Filesystem(err.to_string()))?;
    io::copy(&mut decoder, &mut outfile).map_err(|err| WranglerError::Archive(err.to_string()))?;
    Ok(())
}

pub fn files_with_extension(root: &Path, ext: &str) -> Result<Vec<PathBuf>, WranglerError> {
    let mut matches = walk_dir(root)?
        .into_iter()
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|found| found.to_str())
                .is_some_and(|found| found.eq_ignore_ascii_case(ext))
        })
        .collect::<Vec<_>>();
    matches.sort();
    Ok(matches)
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, WranglerError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| WranglerError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| WranglerError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}
