use serde_json::Value;
use std::path::{Path, PathBuf};
use tera::{Context, Tera};

use crate::error::{QuireError, Result};
use crate::paths::relative_portable;
use crate::walk::list_all_files;

/// Turns a template file plus a JSON context object into markup.
pub trait Renderer: Send + Sync {
    fn render(&self, template_path: &Path, context: &Value) -> Result<String>;
}

/// Registers every template under the source dir by its portable relative
/// name, so page templates can include partials from `templates/`.
pub struct TeraRenderer {
    tera: Tera,
    source_dir: PathBuf,
}

impl TeraRenderer {
    pub fn new(source_dir: &Path, template_extension: &str) -> Result<Self> {
        let source_dir = std::path::absolute(source_dir).map_err(|_| QuireError::InvalidPath {
            path: source_dir.to_path_buf(),
        })?;

        let mut tera = Tera::default();
        tera.autoescape_on(vec![".tera", ".html"]);

        if source_dir.is_dir() {
            let suffix = format!(".{template_extension}");
            let templates: Vec<(PathBuf, Option<String>)> = list_all_files(&source_dir)?
                .into_iter()
                .filter_map(|path| {
                    let name = relative_portable(&path, &source_dir);
                    let is_partial = name.starts_with("templates/") && name.ends_with(".html");
                    (name.ends_with(&suffix) || is_partial).then_some((path, Some(name)))
                })
                .collect();
            tracing::debug!(count = templates.len(), "registered templates");
            tera.add_template_files(templates)?;
        }

        Ok(Self { tera, source_dir })
    }
}

impl Renderer for TeraRenderer {
    fn render(&self, template_path: &Path, context: &Value) -> Result<String> {
        let template_path = std::path::absolute(template_path).map_err(|_| QuireError::InvalidPath {
            path: template_path.to_path_buf(),
        })?;
        let name = relative_portable(&template_path, &self.source_dir);
        let context = match context {
            Value::Null => Context::new(),
            other => Context::from_serialize(other)?,
        };
        Ok(self.tera.render(&name, &context)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn source_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("pages")).unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(
            dir.path().join("templates/footer.html"),
            "<footer>{{ year | default(value=\"2024\") }}</footer>",
        )
        .unwrap();
        fs::write(
            dir.path().join("pages/index.tera"),
            "<h1>{{ title | default(value=\"Inicio\") }}</h1>{% include \"templates/footer.html\" %}",
        )
        .unwrap();
        dir
    }

    #[test]
    fn test_render_with_empty_context() {
        let dir = source_tree();
        let renderer = TeraRenderer::new(dir.path(), "tera").unwrap();
        let html = renderer
            .render(&dir.path().join("pages/index.tera"), &Value::Null)
            .unwrap();
        assert_eq!(html, "<h1>Inicio</h1><footer>2024</footer>");
    }

    #[test]
    fn test_render_with_context_escapes() {
        let dir = source_tree();
        let renderer = TeraRenderer::new(dir.path(), "tera").unwrap();
        let html = renderer
            .render(
                &dir.path().join("pages/index.tera"),
                &json!({ "title": "Libros & Café" }),
            )
            .unwrap();
        assert!(html.contains("<h1>Libros &amp; Café</h1>"));
    }

    #[test]
    fn test_render_unknown_template_errors() {
        let dir = source_tree();
        let renderer = TeraRenderer::new(dir.path(), "tera").unwrap();
        let result = renderer.render(&dir.path().join("pages/missing.tera"), &Value::Null);
        assert!(matches!(result, Err(QuireError::Template(_))));
    }

    #[test]
    fn test_missing_source_dir_registers_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(TeraRenderer::new(&dir.path().join("absent"), "tera").is_ok());
    }
}
