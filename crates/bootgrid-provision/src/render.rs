//! Template rendering, fully buffered.

use std::fs;
use std::path::{Path, PathBuf};

use minijinja::{AutoEscape, Environment, ErrorKind, UndefinedBehavior};
use thiserror::Error;

use crate::context::TemplateContext;
use crate::functions;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("cannot read template {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse template {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: minijinja::Error,
    },

    #[error("cannot render template {}: {source}", .path.display())]
    Render {
        path: PathBuf,
        source: minijinja::Error,
    },
}

/// Renders template files against a [`TemplateContext`].
///
/// Templates are read on every call so edits on disk apply to the next boot.
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        // Absent tags and netdevs read as empty; only lookups through an
        // undefined value fail.
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_keep_trailing_newline(true);
        functions::register(&mut env);
        Self { env }
    }

    /// Render `path` to completion. Nothing is returned on failure, so a
    /// caller never holds a partial document.
    pub fn render(&self, path: &Path, context: &TemplateContext) -> Result<Vec<u8>, TemplateError> {
        let source = fs::read_to_string(path).map_err(|source| TemplateError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.env
            .render_named_str(&name, &source, context)
            .map(String::into_bytes)
            .map_err(|source| {
                let path = path.to_path_buf();
                if source.kind() == ErrorKind::SyntaxError {
                    TemplateError::Parse { path, source }
                } else {
                    TemplateError::Render { path, source }
                }
            })
    }
}
