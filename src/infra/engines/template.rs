use std::{
    fs,
    path::{Component, Path, PathBuf},
};

use minijinja::{AutoEscape, Environment, ErrorKind};

use crate::application::engines::{EngineError, TemplateContext, TemplateEngine};

/// Jinja-compatible templates resolved against an ordered search path list.
///
/// Output is not auto-escaped so URLs in the context survive verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct JinjaTemplates;

impl TemplateEngine for JinjaTemplates {
    fn render(
        &self,
        template: &str,
        search_paths: &[PathBuf],
        context: &TemplateContext,
    ) -> Result<String, EngineError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        let search_paths = search_paths.to_vec();
        env.set_loader(move |name| load_template(&search_paths, name));

        let template = env
            .get_template(template)
            .map_err(|err| EngineError::template(format!("{err:#}")))?;
        template
            .render(context)
            .map_err(|err| EngineError::template(format!("{err:#}")))
    }
}

fn load_template(search_paths: &[PathBuf], name: &str) -> Result<Option<String>, minijinja::Error> {
    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|component| !matches!(component, Component::Normal(_)));
    if escapes {
        return Ok(None);
    }

    for dir in search_paths {
        let candidate = dir.join(relative);
        if !candidate.is_file() {
            continue;
        }
        return fs::read_to_string(&candidate).map(Some).map_err(|err| {
            minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("could not read template `{}`", candidate.display()),
            )
            .with_source(err)
        });
    }
    Ok(None)
}
