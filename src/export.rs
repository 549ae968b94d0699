//! Exporting generated output
//!
//! Text exports land in `<Documents>/Shortgen/exports` with a timestamped
//! file name. Sharing to WhatsApp goes through a `wa.me` link.

use crate::model::OutputBundle;
use chrono::Local;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

const WHATSAPP_BASE: &str = "https://wa.me/";

/// Default export directory
pub(crate) fn exports_dir() -> Option<PathBuf> {
    dirs::document_dir().map(|d| d.join("Shortgen").join("exports"))
}

/// The text used for copy and download
pub(crate) fn format_output(bundle: &OutputBundle) -> String {
    format!(
        "Script:\n{}\n\nCaption:\n{}\n\nHashtags:\n{}",
        bundle.script, bundle.caption, bundle.hashtags
    )
}

/// Save the formatted output, returning the file written
pub(crate) fn save_output(dir: &Path, bundle: &OutputBundle) -> Result<PathBuf, ExportError> {
    if bundle.is_empty() {
        return Err(ExportError::Empty);
    }
    write_export(dir, "ai-shorts-output", &format_output(bundle))
}

/// Save only the thumbnail text
pub(crate) fn save_thumbnail_text(
    dir: &Path,
    bundle: &OutputBundle,
) -> Result<PathBuf, ExportError> {
    if bundle.thumbnail_text.trim().is_empty() {
        return Err(ExportError::Empty);
    }
    write_export(dir, "thumbnail-text", &bundle.thumbnail_text)
}

/// `wa.me` link sharing the caption and hashtags
pub(crate) fn whatsapp_share_url(bundle: &OutputBundle) -> Result<Url, url::ParseError> {
    whatsapp_url(format!(
        "Check this out!\n\n{}\n\n{}",
        bundle.caption, bundle.hashtags
    ))
}

/// `wa.me` link sharing only the thumbnail text
pub(crate) fn thumbnail_whatsapp_url(bundle: &OutputBundle) -> Result<Url, url::ParseError> {
    whatsapp_url(format!("Thumbnail Idea:\n\n{}", bundle.thumbnail_text))
}

fn whatsapp_url(text: String) -> Result<Url, url::ParseError> {
    Url::parse_with_params(WHATSAPP_BASE, &[("text", text)])
}

fn write_export(dir: &Path, stem: &str, contents: &str) -> Result<PathBuf, ExportError> {
    if !dir.exists() {
        fs::create_dir_all(dir).map_err(|e| ExportError::CreateDirectory {
            path: dir.to_path_buf(),
            source: e,
        })?;
        info!("Created exports directory: {:?}", dir);
    }

    let timestamp = Local::now().format("%Y-%m-%d-%H-%M-%S");
    let (filepath, mut file) = create_unique(dir, &format!("{}-{}", stem, timestamp))?;

    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .map_err(|e| ExportError::WriteFile {
            path: filepath.clone(),
            source: e,
        })?;

    info!("Exported to: {:?}", filepath);
    Ok(filepath)
}

/// Create `<name>.txt`, or `<name>-<n>.txt` if exports collide within a second
fn create_unique(dir: &Path, name: &str) -> Result<(PathBuf, fs::File), ExportError> {
    let mut attempt = 0u32;
    loop {
        let filename = if attempt == 0 {
            format!("{}.txt", name)
        } else {
            format!("{}-{}.txt", name, attempt)
        };
        let filepath = dir.join(filename);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&filepath)
        {
            Ok(file) => return Ok((filepath, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => {
                return Err(ExportError::CreateFile {
                    path: filepath,
                    source: e,
                })
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ExportError {
    #[error("Could not find Documents directory")]
    NoDocumentsDir,

    #[error("Nothing to export")]
    Empty,

    #[error("Failed to create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create file {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
