//! Filesystem entities shared by the registry, packages and the reaper.
//!
//! `Dir` and `File` are thin, absolute-path wrappers. Both implement
//! [`PathEntity`] so callers that only need existence, naming or deletion can
//! work with either one.

use std::{
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use thiserror::Error;
use url::Url;
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipArchive, ZipWriter, result::ZipError, write::SimpleFileOptions};

/// Errors raised while packing or unpacking zip archives.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("zip archive error: {0}")]
    Zip(#[from] ZipError),
    #[error("failed to walk `{path}`: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// Operations common to files and directories.
pub trait PathEntity {
    /// Absolute path of the entity.
    fn path(&self) -> &Path;

    /// True when the entity exists with the expected kind.
    fn exists(&self) -> bool;

    /// Remove the entity. Missing entities are treated as success.
    fn kill(&self) -> io::Result<()>;

    /// Final path component.
    fn local_name(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `file://` URL pointing at the entity.
    fn url(&self) -> Option<Url> {
        Url::from_file_path(self.path()).ok()
    }

    /// Directory containing the entity.
    fn parent(&self) -> Dir {
        match self.path().parent() {
            Some(parent) => Dir::new(parent),
            None => Dir::new(self.path()),
        }
    }
}

fn absolutize(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: absolutize(path.as_ref()),
        }
    }

    pub fn subdir(&self, name: &str) -> Dir {
        Dir {
            path: self.path.join(name),
        }
    }

    pub fn file(&self, name: &str) -> File {
        File {
            path: self.path.join(name),
        }
    }

    /// Create the directory (and missing parents) if it does not exist yet.
    pub fn mkdir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.path)
    }

    /// Regular files directly inside this directory, sorted by name.
    ///
    /// Hidden entries are skipped, matching shell glob semantics.
    pub fn files(&self) -> io::Result<Vec<File>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden(&name) || !entry.file_type()?.is_file() {
                continue;
            }
            files.push(File { path: entry.path() });
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    /// Regular files directly inside this directory with the given extension.
    pub fn files_with_extension(&self, extension: &str) -> io::Result<Vec<File>> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|file| file.extension().as_deref() == Some(extension))
            .collect())
    }

    /// Descend while the directory holds exactly one visible entry that is
    /// itself a directory. Archives usually wrap their content in one folder.
    pub fn single_child_down(&self) -> io::Result<Dir> {
        let mut current = self.clone();
        loop {
            let mut children = Vec::new();
            for entry in fs::read_dir(&current.path)? {
                let entry = entry?;
                let name = entry.file_name().to_string_lossy().into_owned();
                if !is_hidden(&name) {
                    children.push(entry);
                }
            }

            match children.as_slice() {
                [only] if only.file_type()?.is_dir() => {
                    current = Dir { path: only.path() };
                }
                _ => return Ok(current),
            }
        }
    }

    /// Pack the directory contents into a zip archive at `target`.
    ///
    /// The archive is staged next to the target and moved into place once
    /// complete, so readers never observe a partially written file.
    pub fn zip_to(&self, target: &File) -> Result<(), ArchiveError> {
        let parent = target.parent();
        parent.mkdir()?;

        let mut staging = tempfile::Builder::new()
            .prefix(".folio-")
            .suffix(".zip")
            .tempfile_in(parent.path())?;

        {
            let mut writer = ZipWriter::new(staging.as_file_mut());
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

            for entry in WalkDir::new(&self.path).min_depth(1).sort_by_file_name() {
                let entry = entry.map_err(|source| ArchiveError::Walk {
                    path: self.path.clone(),
                    source,
                })?;
                let relative = entry
                    .path()
                    .strip_prefix(&self.path)
                    .map_err(|err| io::Error::new(ErrorKind::InvalidInput, err))?;
                let name = relative
                    .components()
                    .map(|component| component.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");

                if entry.file_type().is_dir() {
                    writer.add_directory(name, options)?;
                } else if entry.file_type().is_file() {
                    writer.start_file(name, options)?;
                    let mut source = fs::File::open(entry.path())?;
                    io::copy(&mut source, &mut writer)?;
                }
            }

            writer.finish()?;
        }

        staging
            .persist(&target.path)
            .map_err(|err| ArchiveError::Io(err.error))?;
        Ok(())
    }
}

impl PathEntity for Dir {
    fn path(&self) -> &Path {
        &self.path
    }

    fn exists(&self) -> bool {
        self.path.is_dir()
    }

    fn kill(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: absolutize(path.as_ref()),
        }
    }

    pub fn save(&self, content: &str) -> io::Result<()> {
        fs::write(&self.path, content)
    }

    pub fn read_to_string(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }

    /// File name without its final extension.
    pub fn stem(&self) -> String {
        let name = self.local_name();
        match name.rfind('.') {
            Some(index) => name[..index].to_string(),
            None => name,
        }
    }

    /// Final extension without the dot, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.local_name();
        name.rfind('.').map(|index| name[index + 1..].to_string())
    }

    /// Unpack this zip archive into `target`, creating it if needed.
    pub fn extract_to(&self, target: &Dir) -> Result<(), ArchiveError> {
        target.mkdir()?;
        let reader = fs::File::open(&self.path)?;
        let mut archive = ZipArchive::new(reader)?;
        archive.extract(&target.path)?;
        Ok(())
    }
}

impl PathEntity for File {
    fn path(&self) -> &Path {
        &self.path
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }

    fn kill(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_child_down_descends_through_wrapper_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let nested = root.path().join("outer").join("inner");
        fs::create_dir_all(&nested).expect("nested dirs");
        fs::write(nested.join("a.html"), "<p>a</p>").expect("write a");
        fs::write(nested.join("b.html"), "<p>b</p>").expect("write b");

        let deep = Dir::new(root.path()).single_child_down().expect("descend");
        assert_eq!(deep.path(), nested.as_path());
    }

    #[test]
    fn single_child_down_stops_at_a_lone_file() {
        let root = tempfile::tempdir().expect("tempdir");
        fs::write(root.path().join("only.html"), "x").expect("write");

        let deep = Dir::new(root.path()).single_child_down().expect("descend");
        assert_eq!(deep.path(), root.path());
    }

    #[test]
    fn files_with_extension_filters_and_sorts() {
        let root = tempfile::tempdir().expect("tempdir");
        for name in ["b.html", "a.html", "style.css", ".hidden.html"] {
            fs::write(root.path().join(name), "x").expect("write");
        }
        fs::create_dir(root.path().join("c.html")).expect("dir named like a document");

        let names: Vec<String> = Dir::new(root.path())
            .files_with_extension("html")
            .expect("list")
            .iter()
            .map(|file| file.local_name())
            .collect();
        assert_eq!(names, vec!["a.html", "b.html"]);
    }

    #[test]
    fn zip_round_trip_preserves_nested_files() {
        let root = tempfile::tempdir().expect("tempdir");
        let source = Dir::new(root.path().join("source"));
        source.subdir("img").mkdir().expect("mkdir");
        source.file("a.pdf").save("pdf").expect("write a");
        source.subdir("img").file("x.png").save("png").expect("write x");

        let archive = File::new(root.path().join("out.zip"));
        source.zip_to(&archive).expect("zip");
        assert!(archive.exists());

        let target = Dir::new(root.path().join("target"));
        archive.extract_to(&target).expect("extract");
        assert_eq!(target.file("a.pdf").read_to_string().expect("read"), "pdf");
        assert_eq!(
            target
                .subdir("img")
                .file("x.png")
                .read_to_string()
                .expect("read"),
            "png"
        );
    }

    #[test]
    fn kill_is_a_no_op_for_missing_entities() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = Dir::new(root.path().join("missing"));
        let file = File::new(root.path().join("missing.txt"));
        dir.kill().expect("missing dir");
        file.kill().expect("missing file");
    }

    #[test]
    fn stem_and_extension_split_on_the_last_dot() {
        let file = File::new("/books/volume.one.html");
        assert_eq!(file.stem(), "volume.one");
        assert_eq!(file.extension().as_deref(), Some("html"));

        let bare = File::new("/books/README");
        assert_eq!(bare.stem(), "README");
        assert_eq!(bare.extension(), None);
    }
}
