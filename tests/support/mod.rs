#![allow(dead_code)]

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

use folio::{
    application::{
        engines::{EngineError, Engines, PdfEngine, ScriptEngine, TemplateContext, TemplateEngine},
        package::BuildOptions,
        registry::Registry,
    },
    domain::path::{Dir, File},
};
use url::Url;

/// Reads the named template from the first search path holding it.
pub struct FileTemplates;

impl TemplateEngine for FileTemplates {
    fn render(
        &self,
        template: &str,
        search_paths: &[PathBuf],
        context: &TemplateContext,
    ) -> Result<String, EngineError> {
        let path = search_paths
            .iter()
            .map(|dir| dir.join(template))
            .find(|path| path.is_file())
            .ok_or_else(|| EngineError::template(format!("template `{template}` not found")))?;
        let text = fs::read_to_string(path)?;
        let dir_path = context.get("dir_path").cloned().unwrap_or_default();
        Ok(text.replace("{{ dir_path }}", &dir_path))
    }
}

/// Returns the scratch document unchanged, optionally after a pause.
pub struct FileScript {
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptEngine for FileScript {
    fn execute(&self, document: &Url) -> Result<String, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        let path = document.to_file_path().map_err(|()| EngineError::Output {
            engine: "file script",
            detail: document.to_string(),
        })?;
        Ok(fs::read_to_string(path)?)
    }
}

/// Writes the HTML behind a fake PDF header.
pub struct TextPdf;

impl PdfEngine for TextPdf {
    fn render(&self, html: &str, output: &Path) -> Result<(), EngineError> {
        fs::write(output, format!("%PDF-fake\n{html}"))?;
        Ok(())
    }
}

/// Fails every render like a crashed PDF engine.
pub struct CrashingPdf;

impl PdfEngine for CrashingPdf {
    fn render(&self, _html: &str, _output: &Path) -> Result<(), EngineError> {
        Err(EngineError::Process {
            engine: "crashing pdf",
            exit_code: Some(3),
            stderr: "segmentation fault".to_string(),
        })
    }
}

pub fn fake_engines() -> Engines {
    slow_engines(Duration::ZERO)
}

pub fn slow_engines(delay: Duration) -> Engines {
    Engines::new(
        Arc::new(FileTemplates),
        Arc::new(FileScript {
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(TextPdf),
    )
}

pub fn crashing_engines() -> Engines {
    Engines::new(
        Arc::new(FileTemplates),
        Arc::new(FileScript {
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(CrashingPdf),
    )
}

pub fn registry(root: &Path, retention: Duration, engines: Engines) -> Registry {
    Registry::new(root, retention, engines, BuildOptions::default()).expect("registry")
}

/// Write `<dir>/<wrapper>/<name>` for each document, nested one level deep.
pub fn write_book_tree(dir: &Path, documents: &[&str]) -> PathBuf {
    let inner = dir.join("book");
    fs::create_dir_all(inner.join("img")).expect("create tree");
    for name in documents {
        fs::write(
            inner.join(name),
            format!("<html><body><h1>{name}</h1><img src=\"{{{{ dir_path }}}}/img/cover.png\"></body></html>"),
        )
        .expect("write document");
    }
    fs::write(inner.join("style.css"), "h1 { color: black; }").expect("write css");
    fs::write(inner.join("img").join("cover.png"), b"png").expect("write image");
    dir.to_path_buf()
}

/// Zip the tree rooted at `tree` into `archive`.
pub fn zip_tree(tree: &Path, archive: &Path) {
    Dir::new(tree)
        .zip_to(&File::new(archive))
        .expect("zip tree");
}

/// Names of the entries stored in a zip archive, sorted.
pub fn zip_entries(archive: &Path) -> Vec<String> {
    let file = fs::File::open(archive).expect("open archive");
    let mut zip = zip::ZipArchive::new(file).expect("read archive");
    let mut names: Vec<String> = (0..zip.len())
        .map(|index| zip.by_index(index).expect("entry").name().to_string())
        .collect();
    names.sort();
    names
}

/// Content of one entry of a zip archive held in memory.
pub fn zip_entry_text(bytes: &[u8], name: &str) -> String {
    let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("read archive");
    let mut entry = zip.by_name(name).expect("entry");
    let mut text = String::new();
    entry.read_to_string(&mut text).expect("read entry");
    text
}
