//! Uploaded archives held in memory until the registry persists them.

use std::{fs, io, path::Path};

use bytes::Bytes;
use slug::slugify;

use crate::{
    application::upload::UploadSource,
    domain::path::{Dir, File, PathEntity},
};

const FALLBACK_STEM: &str = "upload";

/// An upload whose bytes were fully received before package creation.
#[derive(Debug, Clone)]
pub struct BufferedUpload {
    file_name: String,
    content: Bytes,
}

impl BufferedUpload {
    /// Wrap `content`, sanitizing the client-supplied `original_name`.
    pub fn new(original_name: &str, content: Bytes) -> Self {
        Self {
            file_name: sanitize_filename(original_name),
            content,
        }
    }
}

impl UploadSource for BufferedUpload {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn save_to(&self, directory: &Dir) -> io::Result<File> {
        let file = directory.file(&self.file_name);
        fs::write(file.path(), &self.content)?;
        Ok(file)
    }
}

/// Reduce a client file name to a slugified stem plus a lower-cased extension.
pub fn sanitize_filename(original: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base_name = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let path = Path::new(base_name);

    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .map(slugify)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(extension) => format!("{stem}.{extension}"),
        None => stem,
    }
}
