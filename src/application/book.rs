//! Per-document pipeline: template → script engine → PDF.

use std::path::PathBuf;

use crate::{
    application::{
        engines::{EngineError, Engines, TemplateContext},
        package::BuildOptions,
    },
    domain::{
        error::BuildError,
        path::{Dir, File, PathEntity},
    },
};

/// Context variable holding the `file://` URL of the document's source directory.
pub const DIR_PATH_VARIABLE: &str = "dir_path";

pub(crate) struct Book<'a> {
    notify: &'a dyn Fn(String),
    engines: &'a Engines,
    options: &'a BuildOptions,
    source_dir: &'a Dir,
    input: File,
    scratch: File,
    output: File,
}

impl<'a> Book<'a> {
    pub(crate) fn new(
        notify: &'a dyn Fn(String),
        engines: &'a Engines,
        options: &'a BuildOptions,
        source_dir: &'a Dir,
        build_dir: &Dir,
        input: File,
    ) -> Self {
        let stem = input.stem();
        Self {
            notify,
            engines,
            options,
            source_dir,
            scratch: build_dir.file(&format!("{stem}-temp.html")),
            output: build_dir.file(&format!("{stem}.pdf")),
            input,
        }
    }

    pub(crate) fn assemble(&self) -> Result<(), BuildError> {
        let rendered = self.render_template()?;
        let scripted = self.run_scripts(&rendered)?;
        self.render_pdf(&scripted)?;
        self.notify("Done!");
        Ok(())
    }

    fn notify(&self, message: &str) {
        (self.notify)(format!("[{}] {message}", self.output.local_name()));
    }

    fn render_template(&self) -> Result<String, BuildError> {
        self.notify("Rendering HTML content...");

        let mut search_paths: Vec<PathBuf> = vec![self.source_dir.path().to_path_buf()];
        search_paths.extend(self.options.plugin_dirs.iter().cloned());

        let mut context = TemplateContext::new();
        context.insert(
            DIR_PATH_VARIABLE.to_string(),
            self.source_dir
                .url()
                .map(|url| url.to_string())
                .unwrap_or_default(),
        );

        self.engines
            .template
            .render(&self.input.local_name(), &search_paths, &context)
            .map_err(|source| self.engine_error("template rendering", source))
    }

    fn run_scripts(&self, html: &str) -> Result<String, BuildError> {
        self.notify("Starting script engine...");
        self.scratch.save(html)?;

        let result = self.execute_scratch();

        let cleanup = if self.options.lazy_cleanup {
            Ok(())
        } else {
            self.notify("Removing temporary HTML...");
            self.scratch.kill()
        };

        let serialized = result?;
        cleanup?;
        Ok(serialized)
    }

    fn execute_scratch(&self) -> Result<String, BuildError> {
        let url = self.scratch.url().ok_or_else(|| {
            self.engine_error(
                "script execution",
                EngineError::Output {
                    engine: "script engine",
                    detail: format!("`{}` has no file URL", self.scratch.path().display()),
                },
            )
        })?;

        self.notify("Waiting for JavaScript...");
        self.engines
            .script
            .execute(&url)
            .map_err(|source| self.engine_error("script execution", source))
    }

    fn render_pdf(&self, html: &str) -> Result<(), BuildError> {
        self.notify("Generating PDF...");
        self.engines
            .pdf
            .render(html, self.output.path())
            .map_err(|source| self.engine_error("PDF generation", source))
    }

    fn engine_error(&self, stage: &'static str, source: EngineError) -> BuildError {
        BuildError::Engine {
            stage,
            document: self.input.local_name(),
            source,
        }
    }
}
