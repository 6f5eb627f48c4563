//! The guarded table of live packages, keyed by id.
//!
//! Creation reserves an id under the registry lock, prepares the package
//! directory outside of it and inserts the finished package under the lock
//! again. Reserved ids are treated as owned by the sweep, so a directory that
//! is still being prepared is never mistaken for an orphan.

use std::{
    collections::{HashMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use metrics::{counter, gauge};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    application::{
        engines::Engines,
        lock::mutex_lock,
        package::{BuildOptions, Package, SOURCE_DIR},
        upload::UploadSource,
    },
    domain::{
        error::PackageError,
        path::{Dir, File, PathEntity},
    },
};

/// Extension every archive source must carry.
pub const ARCHIVE_EXTENSION: &str = "zip";
/// Workspace entry the sweep never removes.
pub const PROTECTED_ENTRY: &str = "README.md";

const OUTPUT_PREFIX: &str = "out-";
const LOCK_OWNER: &str = "registry";
const METRIC_PACKAGES_CREATED: &str = "folio_packages_created_total";
const METRIC_PACKAGES_RECLAIMED: &str = "folio_packages_reclaimed_total";
const METRIC_ORPHANS_REMOVED: &str = "folio_orphans_removed_total";
const METRIC_REGISTRY_PACKAGES: &str = "folio_registry_packages";

/// A CLI source identifier resolved to exactly one filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    Archive(File),
    Directory(Dir),
}

impl PackageSource {
    /// Resolve `identifier` to an archive or a directory.
    ///
    /// A file matches when the path itself is a file or `<identifier>.zip` is
    /// one. A directory matches when the path itself is a directory or the
    /// identifier without its `.zip` suffix is one. Exactly one kind must match.
    pub fn resolve(identifier: &Path) -> Result<Self, PackageError> {
        let archive = archive_candidate(identifier);
        let directory = directory_candidate(identifier);

        match (archive, directory) {
            (Some(file), None) => Ok(Self::Archive(File::new(file))),
            (None, Some(dir)) => Ok(Self::Directory(Dir::new(dir))),
            (Some(_), Some(_)) => Err(PackageError::ambiguous(identifier)),
            (None, None) => Err(PackageError::missing(identifier)),
        }
    }
}

fn archive_candidate(identifier: &Path) -> Option<PathBuf> {
    if identifier.is_file() {
        return Some(identifier.to_path_buf());
    }
    let mut with_extension = identifier.as_os_str().to_owned();
    with_extension.push(".");
    with_extension.push(ARCHIVE_EXTENSION);
    let with_extension = PathBuf::from(with_extension);
    with_extension.is_file().then_some(with_extension)
}

fn directory_candidate(identifier: &Path) -> Option<PathBuf> {
    if identifier.is_dir() {
        return Some(identifier.to_path_buf());
    }
    let is_archive_name = identifier
        .extension()
        .is_some_and(|extension| extension == ARCHIVE_EXTENSION);
    if !is_archive_name {
        return None;
    }
    let stripped = identifier.with_extension("");
    stripped.is_dir().then_some(stripped)
}

fn has_archive_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case(ARCHIVE_EXTENSION))
}

/// Outcome of one sweep over the registry and the workspace root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub inspected: usize,
    pub reclaimed: Vec<String>,
    pub orphans: Vec<PathBuf>,
}

#[derive(Debug, Default)]
struct RegistryTable {
    packages: HashMap<String, Arc<Package>>,
    reserved: HashSet<String>,
}

#[derive(Debug)]
pub struct Registry {
    root: Dir,
    retention: Duration,
    engines: Engines,
    options: BuildOptions,
    table: Mutex<RegistryTable>,
}

impl Registry {
    /// Create a registry rooted at `root`, creating the directory if needed.
    pub fn new(
        root: impl AsRef<Path>,
        retention: Duration,
        engines: Engines,
        options: BuildOptions,
    ) -> io::Result<Self> {
        let root = Dir::new(root);
        root.mkdir()?;
        Ok(Self {
            root,
            retention,
            engines,
            options,
            table: Mutex::new(RegistryTable::default()),
        })
    }

    pub fn root(&self) -> &Dir {
        &self.root
    }

    /// Resolve a CLI source identifier and create the matching package.
    pub fn create_from_source(
        &self,
        identifier: &Path,
        destination: Option<&Path>,
    ) -> Result<Arc<Package>, PackageError> {
        match PackageSource::resolve(identifier)? {
            PackageSource::Archive(file) => self.create_from_archive(file.path(), destination),
            PackageSource::Directory(dir) => self.create_from_directory(dir.path(), destination),
        }
    }

    /// Unpack a zip archive into a fresh package directory.
    ///
    /// The default output is `out-<name>` beside the archive.
    pub fn create_from_archive(
        &self,
        path: &Path,
        destination: Option<&Path>,
    ) -> Result<Arc<Package>, PackageError> {
        let archive = File::new(path);
        if !path.is_file() {
            return Err(PackageError::missing(path));
        }
        let name = archive.local_name();
        if !has_archive_extension(&name) {
            return Err(PackageError::not_an_archive(name));
        }

        let output = match destination {
            Some(destination) => File::new(destination),
            None => archive.parent().file(&format!("{OUTPUT_PREFIX}{name}")),
        };

        self.create_with(|temp_dir| {
            let source_dir = temp_dir.subdir(SOURCE_DIR);
            archive.extract_to(&source_dir)?;
            Ok((source_dir, output))
        })
    }

    /// Build straight from an existing directory; nothing is copied.
    ///
    /// The default output is `out-<dir>.zip` beside the directory.
    pub fn create_from_directory(
        &self,
        path: &Path,
        destination: Option<&Path>,
    ) -> Result<Arc<Package>, PackageError> {
        if !path.is_dir() {
            return Err(PackageError::missing(path));
        }
        let source_dir = Dir::new(path);

        let output = match destination {
            Some(destination) => File::new(destination),
            None => source_dir.parent().file(&format!(
                "{OUTPUT_PREFIX}{}.{ARCHIVE_EXTENSION}",
                source_dir.local_name()
            )),
        };

        self.create_with(|_| Ok((source_dir, output)))
    }

    /// Persist an upload into a fresh package directory and unpack it.
    ///
    /// The default output is `out-<name>` inside the package directory.
    pub fn create_from_upload(
        &self,
        upload: &dyn UploadSource,
        destination: Option<&Path>,
    ) -> Result<Arc<Package>, PackageError> {
        let name = upload.file_name().to_string();
        if !has_archive_extension(&name) {
            return Err(PackageError::not_an_archive(name));
        }

        self.create_with(|temp_dir| {
            let archive = upload.save_to(temp_dir)?;
            let source_dir = temp_dir.subdir(SOURCE_DIR);
            archive.extract_to(&source_dir)?;
            let output = match destination {
                Some(destination) => File::new(destination),
                None => temp_dir.file(&format!("{OUTPUT_PREFIX}{name}")),
            };
            Ok((source_dir, output))
        })
    }

    fn create_with<F>(&self, prepare: F) -> Result<Arc<Package>, PackageError>
    where
        F: FnOnce(&Dir) -> Result<(Dir, File), PackageError>,
    {
        let reservation = self.reserve();
        let temp_dir = self.root.subdir(reservation.id());

        let prepared = temp_dir
            .mkdir()
            .map_err(PackageError::from)
            .and_then(|()| prepare(&temp_dir));

        let (source_dir, output) = match prepared {
            Ok(prepared) => prepared,
            Err(err) => {
                if let Err(cleanup) = temp_dir.kill() {
                    warn!(
                        target: "folio::registry",
                        package = reservation.id(),
                        error = %cleanup,
                        "failed to remove directory of abandoned package"
                    );
                }
                return Err(err);
            }
        };

        let package = Arc::new(Package::new(
            temp_dir,
            source_dir,
            output,
            self.retention,
            self.engines.clone(),
            self.options.clone(),
        ));
        reservation.commit(Arc::clone(&package));

        counter!(METRIC_PACKAGES_CREATED).increment(1);
        info!(
            target: "folio::registry",
            package = package.id(),
            source = %package.source_dir().path().display(),
            output = %package.output().path().display(),
            "package created"
        );
        Ok(package)
    }

    fn reserve(&self) -> Reservation<'_> {
        let mut table = mutex_lock(&self.table, LOCK_OWNER, "reserve");
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            let taken = table.packages.contains_key(&candidate)
                || table.reserved.contains(&candidate)
                || self.root.subdir(&candidate).exists();
            if !taken {
                break candidate;
            }
        };
        table.reserved.insert(id.clone());
        Reservation {
            registry: self,
            id,
            committed: false,
        }
    }

    /// The package for `id`, absent if unknown or already reclaimed.
    pub fn lookup(&self, id: &str) -> Option<Arc<Package>> {
        mutex_lock(&self.table, LOCK_OWNER, "lookup")
            .packages
            .get(id)
            .cloned()
    }

    /// Drop a package from the table without touching its files.
    pub fn remove(&self, id: &str) -> Option<Arc<Package>> {
        let mut table = mutex_lock(&self.table, LOCK_OWNER, "remove");
        let removed = table.packages.remove(id);
        gauge!(METRIC_REGISTRY_PACKAGES).set(table.packages.len() as f64);
        removed
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.table, LOCK_OWNER, "len").packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every tracked package, sorted.
    pub fn ids(&self) -> Vec<String> {
        let table = mutex_lock(&self.table, LOCK_OWNER, "ids");
        let mut ids: Vec<String> = table.packages.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Reclaim expired packages, then delete workspace entries nobody owns.
    ///
    /// Holds the registry lock for the whole sweep. Creation and lookup wait
    /// for it; running builds do not.
    pub fn sweep(&self) -> io::Result<SweepReport> {
        let mut table = mutex_lock(&self.table, LOCK_OWNER, "sweep");
        let mut report = SweepReport::default();

        let mut reclaimed = Vec::new();
        for (id, package) in &table.packages {
            report.inspected += 1;
            debug!(target: "folio::reaper", package = %id, phase = ?package.phase(), "inspecting package");
            match package.reclaim() {
                Ok(true) => reclaimed.push(id.clone()),
                Ok(false) => {}
                Err(err) => warn!(
                    target: "folio::reaper",
                    package = %id,
                    error = %err,
                    "failed to reclaim package"
                ),
            }
        }
        for id in &reclaimed {
            table.packages.remove(id);
            counter!(METRIC_PACKAGES_RECLAIMED).increment(1);
            info!(target: "folio::reaper", package = %id, "package reclaimed");
        }
        report.reclaimed = reclaimed;

        let entries = match fs::read_dir(self.root.path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                gauge!(METRIC_REGISTRY_PACKAGES).set(table.packages.len() as f64);
                return Ok(report);
            }
            Err(err) => return Err(err),
        };

        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == PROTECTED_ENTRY
                || table.packages.contains_key(&name)
                || table.reserved.contains(&name)
            {
                continue;
            }

            let path = entry.path();
            let removed = if entry.file_type()?.is_dir() {
                Dir::new(&path).kill()
            } else {
                File::new(&path).kill()
            };
            match removed {
                Ok(()) => {
                    counter!(METRIC_ORPHANS_REMOVED).increment(1);
                    info!(target: "folio::reaper", path = %path.display(), "orphan removed");
                    report.orphans.push(path);
                }
                Err(err) => warn!(
                    target: "folio::reaper",
                    path = %path.display(),
                    error = %err,
                    "failed to remove orphan"
                ),
            }
        }

        report.orphans.sort();
        gauge!(METRIC_REGISTRY_PACKAGES).set(table.packages.len() as f64);
        Ok(report)
    }
}

/// An id held for a package whose directory is still being prepared.
///
/// Released on drop unless committed.
struct Reservation<'a> {
    registry: &'a Registry,
    id: String,
    committed: bool,
}

impl Reservation<'_> {
    fn id(&self) -> &str {
        &self.id
    }

    fn commit(mut self, package: Arc<Package>) {
        let mut table = mutex_lock(&self.registry.table, LOCK_OWNER, "insert");
        table.reserved.remove(&self.id);
        table.packages.insert(self.id.clone(), package);
        gauge!(METRIC_REGISTRY_PACKAGES).set(table.packages.len() as f64);
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            mutex_lock(&self.registry.table, LOCK_OWNER, "release")
                .reserved
                .remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn resolve_prefers_the_only_existing_kind() {
        let workspace = tempfile::tempdir().unwrap();
        fs::write(workspace.path().join("book.zip"), b"zip").unwrap();
        fs::create_dir(workspace.path().join("notes")).unwrap();

        assert!(matches!(
            PackageSource::resolve(&workspace.path().join("book")).unwrap(),
            PackageSource::Archive(file) if file.local_name() == "book.zip"
        ));
        assert!(matches!(
            PackageSource::resolve(&workspace.path().join("notes.zip")).unwrap(),
            PackageSource::Directory(dir) if dir.local_name() == "notes"
        ));
    }

    #[test]
    fn resolve_rejects_ambiguous_and_missing_sources() {
        let workspace = tempfile::tempdir().unwrap();
        fs::write(workspace.path().join("book.zip"), b"zip").unwrap();
        fs::create_dir(workspace.path().join("book")).unwrap();

        let both = PackageSource::resolve(&workspace.path().join("book")).unwrap_err();
        assert!(matches!(both, PackageError::Ambiguous { .. }));
        assert!(both.is_existence());

        let neither = PackageSource::resolve(&workspace.path().join("absent")).unwrap_err();
        assert!(matches!(neither, PackageError::Missing { .. }));
        assert!(neither.is_existence());
    }

    #[test]
    fn archive_extension_check_ignores_case() {
        assert!(has_archive_extension("book.zip"));
        assert!(has_archive_extension("BOOK.ZIP"));
        assert!(!has_archive_extension("book.tar"));
        assert!(!has_archive_extension("zip"));
    }
}
