use std::io;

use crate::domain::path::{Dir, File};

/// Uploaded content that can persist itself into a directory.
///
/// Keeps the registry independent of the transport that received the bytes.
pub trait UploadSource {
    /// Sanitized file name the content should be stored under.
    fn file_name(&self) -> &str;

    /// Write the content into `directory` and return the stored file.
    fn save_to(&self, directory: &Dir) -> io::Result<File>;
}
