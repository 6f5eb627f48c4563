//! Concrete engines behind the book pipeline.
//!
//! Templates render in-process through minijinja. Script execution and PDF
//! generation shell out to a headless browser and to WeasyPrint.

mod browser;
mod pdf;
mod template;

use std::{
    io::{self, ErrorKind, Write},
    path::Path,
    process::{ChildStdin, Command, Output, Stdio},
    sync::Arc,
    thread,
    time::Instant,
};

use tracing::{debug, warn};

pub use browser::HeadlessBrowser;
pub use pdf::WeasyPrint;
pub use template::JinjaTemplates;

use crate::{
    application::engines::{EngineError, Engines},
    config::RenderSettings,
};

/// Engines configured from the `render` settings section.
pub fn from_settings(settings: &RenderSettings) -> Engines {
    Engines::new(
        Arc::new(JinjaTemplates),
        Arc::new(HeadlessBrowser::new(
            settings.browser_path.clone(),
            settings.script_settle,
        )),
        Arc::new(WeasyPrint::new(settings.pdf_engine_path.clone())),
    )
}

/// Run an engine CLI to completion, optionally feeding `stdin`.
///
/// Spawn failures map to [`EngineError::NotFound`] when the binary is missing
/// and non-zero exits to [`EngineError::Process`] carrying stderr.
fn run_cli(
    engine: &'static str,
    program: &Path,
    command: &mut Command,
    stdin: Option<&[u8]>,
) -> Result<Output, EngineError> {
    let started_at = Instant::now();
    command
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let spawned = command.spawn().map_err(|err| {
        warn!(
            target: "folio::engines",
            engine,
            program = %program.display(),
            error_code = "spawn_cli",
            error = %err,
            "failed to spawn engine"
        );
        if err.kind() == ErrorKind::NotFound {
            EngineError::NotFound {
                engine,
                source: err,
            }
        } else {
            EngineError::Io(err)
        }
    })?;

    let mut child = spawned;
    let pipe = child.stdin.take();

    // Feed stdin from its own thread while stdout and stderr drain, otherwise
    // an engine that fills an output pipe before reading all input blocks us both.
    let (output, written) = thread::scope(|scope| {
        let writer = match (stdin, pipe) {
            (Some(input), Some(pipe)) => Some(scope.spawn(move || feed_stdin(pipe, input))),
            _ => None,
        };
        let output = child.wait_with_output();
        let written = match writer {
            Some(writer) => writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked"))),
            None => Ok(()),
        };
        (output, written)
    });
    let output = output?;
    written?;

    if !output.status.success() {
        let exit_code = output.status.code();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        warn!(
            target: "folio::engines",
            engine,
            program = %program.display(),
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            exit_code = exit_code.map(i64::from).unwrap_or(-1),
            stderr = %stderr,
            "engine invocation failed"
        );
        return Err(EngineError::Process {
            engine,
            exit_code,
            stderr,
        });
    }

    debug!(
        target: "folio::engines",
        engine,
        program = %program.display(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        stdout_bytes = output.stdout.len(),
        "engine finished"
    );
    Ok(output)
}

/// Write `input` and close the pipe. An engine that exits early closes its
/// end; its exit status says why, so a broken pipe is not an error here.
fn feed_stdin(mut pipe: ChildStdin, input: &[u8]) -> io::Result<()> {
    match pipe.write_all(input) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err),
    }
}
