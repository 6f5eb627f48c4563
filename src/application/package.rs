//! One build job: its working directory, status log and completion state.

use std::{
    io,
    path::PathBuf,
    sync::Mutex,
    time::{Duration, Instant},
};

use metrics::{counter, histogram};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use crate::{
    application::{book::Book, engines::Engines, lock::mutex_lock},
    domain::{
        error::BuildError,
        path::{Dir, File, PathEntity},
    },
};

/// How long a ready package is kept before the reaper may reclaim it.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Subdirectory of the package directory that receives the rendered PDFs.
pub const BUILD_DIR: &str = "bld";
/// Subdirectory of the package directory that receives unpacked archives.
pub const SOURCE_DIR: &str = "src";

const DOCUMENT_EXTENSION: &str = "html";
const METRIC_PACKAGES_READY: &str = "folio_packages_ready_total";
const METRIC_PACKAGE_BUILD_MS: &str = "folio_package_build_ms";

/// Knobs shared by every package built through one registry.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Keep scratch HTML and working directories after the build.
    pub lazy_cleanup: bool,
    /// Extra template search paths consulted after the document's own directory.
    pub plugin_dirs: Vec<PathBuf>,
}

/// Observable lifecycle position of a package.
///
/// A package whose build failed stays in `Building` forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackagePhase {
    Created,
    Building,
    Ready,
    Expired,
    Reclaimed,
}

#[derive(Debug)]
struct PackageState {
    status: Vec<String>,
    phase: PackagePhase,
    ready_at: Option<OffsetDateTime>,
}

#[derive(Debug)]
pub struct Package {
    id: String,
    temp_dir: Dir,
    source_dir: Dir,
    output: File,
    retention: Duration,
    engines: Engines,
    options: BuildOptions,
    state: Mutex<PackageState>,
}

impl Package {
    pub(crate) fn new(
        temp_dir: Dir,
        source_dir: Dir,
        output: File,
        retention: Duration,
        engines: Engines,
        options: BuildOptions,
    ) -> Self {
        Self {
            id: temp_dir.local_name(),
            temp_dir,
            source_dir,
            output,
            retention,
            engines,
            options,
            state: Mutex::new(PackageState {
                status: Vec::new(),
                phase: PackagePhase::Created,
                ready_at: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn temp_dir(&self) -> &Dir {
        &self.temp_dir
    }

    pub fn source_dir(&self) -> &Dir {
        &self.source_dir
    }

    /// Target path of the produced zip archive.
    pub fn output(&self) -> &File {
        &self.output
    }

    /// Build every document of the source tree and bundle the PDFs.
    ///
    /// Blocks for the whole build. Status polling stays responsive because
    /// the package lock is only taken to append notifications. On failure the
    /// error is returned as-is and the package never becomes ready.
    pub fn assemble(&self) -> Result<(), BuildError> {
        let started_at = Instant::now();
        {
            let mut state = mutex_lock(&self.state, &self.id, "assemble");
            if state.phase == PackagePhase::Created {
                state.phase = PackagePhase::Building;
            }
        }
        self.notify("Starting...");

        let build_dir = self.temp_dir.subdir(BUILD_DIR);
        let result = self.run_pipeline(&build_dir);

        let cleanup = if self.options.lazy_cleanup {
            Ok(())
        } else {
            self.notify("Cleaning temporary files...");
            build_dir
                .kill()
                .and_then(|()| self.temp_dir.subdir(SOURCE_DIR).kill())
        };

        result?;
        cleanup?;

        self.notify("Done!");
        self.mark_ready();

        counter!(METRIC_PACKAGES_READY).increment(1);
        histogram!(METRIC_PACKAGE_BUILD_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        Ok(())
    }

    fn run_pipeline(&self, build_dir: &Dir) -> Result<(), BuildError> {
        build_dir.mkdir()?;
        let deep = self.source_dir.single_child_down()?;
        let notify = |message: String| self.notify(&message);

        for document in deep.files_with_extension(DOCUMENT_EXTENSION)? {
            Book::new(
                &notify,
                &self.engines,
                &self.options,
                &deep,
                build_dir,
                document,
            )
            .assemble()?;
        }

        self.notify("Zipping everything...");
        build_dir.zip_to(&self.output)?;
        Ok(())
    }

    fn notify(&self, message: &str) {
        mutex_lock(&self.state, &self.id, "notify")
            .status
            .push(message.to_string());
        info!(target: "folio::package", package = %self.id, "{message}");
    }

    fn mark_ready(&self) {
        let mut state = mutex_lock(&self.state, &self.id, "ready");
        if state.ready_at.is_none() {
            state.ready_at = Some(OffsetDateTime::now_utc());
        }
        if state.phase == PackagePhase::Building {
            state.phase = PackagePhase::Ready;
        }
    }

    /// Snapshot of the status log.
    pub fn status(&self) -> Vec<String> {
        mutex_lock(&self.state, &self.id, "status").status.clone()
    }

    /// Completion timestamp, absent until the build succeeds.
    pub fn ready_at(&self) -> Option<OffsetDateTime> {
        mutex_lock(&self.state, &self.id, "ready_at").ready_at
    }

    pub fn is_ready(&self) -> bool {
        self.ready_at().is_some()
    }

    pub fn phase(&self) -> PackagePhase {
        let state = mutex_lock(&self.state, &self.id, "phase");
        match state.phase {
            PackagePhase::Ready if self.expired_since(state.ready_at, OffsetDateTime::now_utc()) => {
                PackagePhase::Expired
            }
            phase => phase,
        }
    }

    /// True once the retention window has elapsed since completion.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc())
    }

    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expired_since(self.ready_at(), now)
    }

    fn expired_since(&self, ready_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
        match ready_at {
            Some(ready_at) => now - ready_at > self.retention,
            None => false,
        }
    }

    /// Delete the package directory if the package has expired.
    ///
    /// Returns `Ok(true)` only for the call that actually reclaimed the
    /// package; later calls are no-ops returning `Ok(false)`.
    pub fn reclaim(&self) -> io::Result<bool> {
        if !self.is_expired() {
            return Ok(false);
        }

        let mut state = mutex_lock(&self.state, &self.id, "reclaim");
        if state.phase == PackagePhase::Reclaimed {
            return Ok(false);
        }
        self.temp_dir.kill()?;
        state.phase = PackagePhase::Reclaimed;
        Ok(true)
    }
}
