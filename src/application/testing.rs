//! In-process engine fakes for unit tests.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use url::Url;

use crate::application::engines::{
    EngineError, Engines, PdfEngine, ScriptEngine, TemplateContext, TemplateEngine,
};

/// Reads the template from the first search path that has it.
pub(crate) struct EchoTemplate;

impl TemplateEngine for EchoTemplate {
    fn render(
        &self,
        template: &str,
        search_paths: &[PathBuf],
        _context: &TemplateContext,
    ) -> Result<String, EngineError> {
        search_paths
            .iter()
            .map(|dir| dir.join(template))
            .find(|path| path.is_file())
            .ok_or_else(|| EngineError::template(format!("template `{template}` not found")))
            .and_then(|path| fs::read_to_string(path).map_err(EngineError::from))
    }
}

/// Returns the document text unchanged.
pub(crate) struct EchoScript;

impl ScriptEngine for EchoScript {
    fn execute(&self, document: &Url) -> Result<String, EngineError> {
        let path = document.to_file_path().map_err(|()| EngineError::Output {
            engine: "echo script",
            detail: document.to_string(),
        })?;
        Ok(fs::read_to_string(path)?)
    }
}

/// Writes the HTML behind a fake PDF header.
pub(crate) struct FakePdf;

impl PdfEngine for FakePdf {
    fn render(&self, html: &str, output: &Path) -> Result<(), EngineError> {
        fs::write(output, format!("%PDF-fake\n{html}"))?;
        Ok(())
    }
}

pub(crate) struct BrokenPdf;

impl PdfEngine for BrokenPdf {
    fn render(&self, _html: &str, _output: &Path) -> Result<(), EngineError> {
        Err(EngineError::Process {
            engine: "broken pdf",
            exit_code: Some(1),
            stderr: "cannot render".to_string(),
        })
    }
}

pub(crate) fn fake_engines() -> Engines {
    Engines::new(Arc::new(EchoTemplate), Arc::new(EchoScript), Arc::new(FakePdf))
}

pub(crate) fn broken_engines() -> Engines {
    Engines::new(Arc::new(EchoTemplate), Arc::new(EchoScript), Arc::new(BrokenPdf))
}
