use std::{path::PathBuf, process::Command, time::Duration};

use url::Url;

use super::run_cli;
use crate::application::engines::{EngineError, ScriptEngine};

const ENGINE: &str = "headless browser";

/// Chromium-family browser run with `--dump-dom`.
///
/// The page gets a fixed virtual-time budget to run its scripts before the
/// DOM is serialized; there is no readiness polling.
#[derive(Debug, Clone)]
pub struct HeadlessBrowser {
    program: PathBuf,
    settle: Duration,
}

impl HeadlessBrowser {
    pub fn new(program: PathBuf, settle: Duration) -> Self {
        Self { program, settle }
    }
}

impl ScriptEngine for HeadlessBrowser {
    fn execute(&self, document: &Url) -> Result<String, EngineError> {
        let mut command = Command::new(&self.program);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--allow-file-access-from-files")
            .arg(format!("--virtual-time-budget={}", self.settle.as_millis()))
            .arg("--dump-dom")
            .arg(document.as_str());

        let output = run_cli(ENGINE, &self.program, &mut command, None)?;
        String::from_utf8(output.stdout).map_err(|err| EngineError::Output {
            engine: ENGINE,
            detail: err.to_string(),
        })
    }
}
