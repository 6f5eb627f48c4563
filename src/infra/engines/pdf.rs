use std::{
    path::{Path, PathBuf},
    process::Command,
};

use super::run_cli;
use crate::application::engines::{EngineError, PdfEngine};

const ENGINE: &str = "weasyprint";

/// WeasyPrint CLI reading HTML from stdin.
#[derive(Debug, Clone)]
pub struct WeasyPrint {
    program: PathBuf,
}

impl WeasyPrint {
    pub fn new(program: PathBuf) -> Self {
        Self { program }
    }
}

impl PdfEngine for WeasyPrint {
    fn render(&self, html: &str, output: &Path) -> Result<(), EngineError> {
        let mut command = Command::new(&self.program);
        command.arg("-").arg(output);
        run_cli(ENGINE, &self.program, &mut command, Some(html.as_bytes()))?;

        if !output.is_file() {
            return Err(EngineError::Output {
                engine: ENGINE,
                detail: format!("`{}` was not written", output.display()),
            });
        }
        Ok(())
    }
}
