//! Naming and moving raw data files.
//!
//! A session never overwrites an existing file: new names get a numeric
//! suffix, and a vendor artifact left over from an earlier run is moved into
//! a timestamped backup folder before a new session can clobber it.

use crate::error::{invalid, Result, TrackerWarning};

use chrono::{DateTime, Local};
use log::info;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Folder (relative to the working directory) that receives leftover vendor
/// artifacts.
pub const BACKUP_DIR: &str = "et_default_backups";

/// True if `folder` contains any file named `stem.<something>`.
fn stem_taken(folder: &Path, stem: &str) -> io::Result<bool> {
    let prefix = format!("{}.", stem);
    for entry in fs::read_dir(folder)? {
        let name = entry?.file_name();
        if name.to_string_lossy().starts_with(&prefix) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Returns `stem` if no file with that stem exists in `folder`, otherwise
/// the first free `stem_1`, `stem_2`, ...
pub fn unique_stem(folder: &Path, stem: &str) -> io::Result<String> {
    if !stem_taken(folder, stem)? {
        return Ok(stem.to_owned());
    }
    let mut y = 1;
    while stem_taken(folder, &format!("{}_{}", stem, y))? {
        y += 1;
    }
    Ok(format!("{}_{}", stem, y))
}

/// Like [unique_stem], but for a complete file name: only an exact match
/// counts as taken, and the suffix goes before the extension.
pub fn unique_file_name(folder: &Path, file_name: &str) -> String {
    if !folder.join(file_name).exists() {
        return file_name.to_owned();
    }
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut y = 1;
    loop {
        let candidate = format!("{}_{}{}", stem, y, ext);
        if !folder.join(&candidate).exists() {
            return candidate;
        }
        y += 1;
    }
}

/// A raw data file name, plus whatever was changed to get there.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedName {
    /// Bare file name, no directory
    pub file_name: String,
    /// One notice per adjustment made to the request
    pub notices: Vec<TrackerWarning>,
}

/// Turns a requested raw data file name into one that is safe to create in
/// `folder`.
///
/// - no name: `raw_<opened + 1>.<ext>`
/// - wrong extension: replaced by `ext`
/// - any directory component: dropped, files always live in `folder`
/// - already taken: `_1`, `_2`, ... suffix
pub fn resolve_raw_name(
    folder: &Path,
    requested: Option<&str>,
    ext: &str,
    opened: usize,
) -> Result<ResolvedName> {
    let mut notices = Vec::new();

    let file_name = match requested {
        None => format!("raw_{}.{}", opened + 1, ext),
        Some("") => return invalid("filename should have non-zero length"),
        Some(name) => {
            let mut path = PathBuf::from(name);
            let ext_ok = path
                .extension()
                .map(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
                .unwrap_or(false);
            if !ext_ok {
                path.set_extension(ext);
                notices.push(TrackerWarning::Notice(format!(
                    "changed file extension to '.{}'",
                    ext
                )));
            }
            match path.file_name() {
                Some(base) if base != path.as_os_str() => {
                    notices.push(TrackerWarning::Notice(
                        "storing in designated folder: path removed from filename".to_owned(),
                    ));
                    base.to_string_lossy().into_owned()
                }
                Some(base) => base.to_string_lossy().into_owned(),
                None => return invalid(format!("not a file name: {}", name)),
            }
        }
    };

    let unique = unique_file_name(folder, &file_name);
    if unique != file_name {
        notices.push(TrackerWarning::Notice(format!(
            "{} already exists, using {} instead",
            file_name, unique
        )));
    }

    Ok(ResolvedName {
        file_name: unique,
        notices,
    })
}

/// If `work_dir/default_name` exists, move it to
/// `work_dir/BACKUP_DIR/<stem>_<YYYYMMDD-HHMMSS>.<ext>` and return the new
/// location.
pub fn backup_leftover(
    work_dir: &Path,
    default_name: &str,
    now: DateTime<Local>,
) -> Result<Option<PathBuf>> {
    let src = work_dir.join(default_name);
    if !src.is_file() {
        return Ok(None);
    }

    let backup_dir = work_dir.join(BACKUP_DIR);
    fs::create_dir_all(&backup_dir)?;

    let default = Path::new(default_name);
    let stem = default
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = default
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamped = format!("{}_{}{}", stem, now.format("%Y%m%d-%H%M%S"), ext);
    let dst = backup_dir.join(unique_file_name(&backup_dir, &stamped));

    move_file(&src, &dst)?;
    info!("moved leftover {} to {}", src.display(), dst.display());
    Ok(Some(dst))
}

/// Rename that also works across file systems.
pub fn move_file(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(_) => {
            fs::copy(src, dst)?;
            fs::remove_file(src)
        }
    }
}

/// The index the next calibration snapshot should get: one past both the
/// session's own count and any `calibration_<k>.json` already in `folder`.
pub fn next_calibration_index(folder: &Path, session_count: usize) -> io::Result<usize> {
    let mut highest = session_count;
    for entry in fs::read_dir(folder)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        let index = name
            .strip_prefix("calibration_")
            .and_then(|rest| rest.strip_suffix(".json"))
            .and_then(|k| k.parse::<usize>().ok());
        if let Some(k) = index {
            highest = highest.max(k);
        }
    }
    Ok(highest + 1)
}

/// Path of the calibration snapshot with the given index.
pub fn calibration_path(folder: &Path, index: usize) -> PathBuf {
    folder.join(format!("calibration_{}.json", index))
}
