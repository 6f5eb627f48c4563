//! Seams to the external engines driven by the book pipeline.
//!
//! The pipeline only knows these traits. Concrete implementations live in
//! `infra::engines`; tests substitute in-process fakes.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use thiserror::Error;
use url::Url;

/// Variables exposed to a template while it renders.
pub type TemplateContext = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("template error: {0}")]
    Template(String),
    #[error("{engine} unavailable: {source}")]
    NotFound {
        engine: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("{engine} exited with status {exit_code:?}: {stderr}")]
    Process {
        engine: &'static str,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("{engine} produced unreadable output: {detail}")]
    Output {
        engine: &'static str,
        detail: String,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EngineError {
    pub fn template(message: impl Into<String>) -> Self {
        Self::Template(message.into())
    }
}

/// Renders a named template found on a list of search paths.
///
/// Implementations must resolve includes and parent templates through the
/// same search path list.
pub trait TemplateEngine: Send + Sync {
    fn render(
        &self,
        template: &str,
        search_paths: &[PathBuf],
        context: &TemplateContext,
    ) -> Result<String, EngineError>;
}

/// Loads a document in a JavaScript-capable browser and returns the
/// serialized DOM once the fixed settle delay has elapsed.
pub trait ScriptEngine: Send + Sync {
    fn execute(&self, document: &Url) -> Result<String, EngineError>;
}

/// Turns HTML text into a PDF written at `output`.
pub trait PdfEngine: Send + Sync {
    fn render(&self, html: &str, output: &Path) -> Result<(), EngineError>;
}

/// The engine set shared by every package built through a registry.
#[derive(Clone)]
pub struct Engines {
    pub template: Arc<dyn TemplateEngine>,
    pub script: Arc<dyn ScriptEngine>,
    pub pdf: Arc<dyn PdfEngine>,
}

impl Engines {
    pub fn new(
        template: Arc<dyn TemplateEngine>,
        script: Arc<dyn ScriptEngine>,
        pdf: Arc<dyn PdfEngine>,
    ) -> Self {
        Self {
            template,
            script,
            pdf,
        }
    }
}

impl std::fmt::Debug for Engines {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engines").finish_non_exhaustive()
    }
}
