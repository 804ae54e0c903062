//! View layer.
//!
//! # Data Flow
//! ```text
//! ctx.render("users/show", data)
//!     → context.rs merges app locals, settings, response locals, request, data
//!     → resolve() maps the view name to <views root>/users/show.<ext>
//!     → app looks up the engine registered for <ext>
//!     → Engine::render(path, context) → HTML text
//! ```
//!
//! # Design Decisions
//! - Engines are pluggable and keyed by file extension
//! - A view name with its own extension overrides the `view engine` setting
//! - Engine lookup happens before the file check, so a missing engine is
//!   reported even for a missing file
//! - Names that climb out of the views root resolve to nothing

pub mod placeholder;

use std::path::{Component, Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

pub use placeholder::PlaceholderEngine;

/// A template engine.
pub trait Engine: Send + Sync {
    /// Render the template at `path` with `context`.
    fn render(&self, path: &Path, context: &Map<String, Value>) -> Result<String>;
}

/// A view name resolved against the views root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedView {
    pub path: PathBuf,
    pub extension: String,
}

/// Resolve a logical view name to a template file.
///
/// `default_ext` is used when the name carries no extension of its own.
/// Names with `..` or absolute components are `ViewNotFound`.
pub fn resolve(root: &Path, view: &str, default_ext: Option<&str>) -> Result<ResolvedView> {
    let name = view.trim_start_matches('/');
    let contained = Path::new(name)
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !contained {
        return Err(Error::ViewNotFound(view.to_string()));
    }
    let own_ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_string);

    match (own_ext, default_ext) {
        (Some(ext), _) => Ok(ResolvedView {
            path: root.join(name),
            extension: ext,
        }),
        (None, Some(ext)) => {
            let ext = ext.trim_start_matches('.');
            Ok(ResolvedView {
                path: root.join(format!("{}.{}", name, ext)),
                extension: ext.to_string(),
            })
        }
        (None, None) => Err(Error::NoEngine(String::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_extension_is_appended() {
        let v = resolve(Path::new("views"), "users/show", Some("html")).unwrap();
        assert_eq!(v.path, Path::new("views/users/show.html"));
        assert_eq!(v.extension, "html");
    }

    #[test]
    fn own_extension_wins() {
        let v = resolve(Path::new("views"), "/mail.txt", Some("html")).unwrap();
        assert_eq!(v.path, Path::new("views/mail.txt"));
        assert_eq!(v.extension, "txt");
    }

    #[test]
    fn escaping_names_are_not_found() {
        for view in ["../secret", "/users/../../etc/passwd", "a/../../b.html"] {
            assert!(
                matches!(
                    resolve(Path::new("views"), view, Some("html")),
                    Err(Error::ViewNotFound(_))
                ),
                "{view}"
            );
        }
        assert!(resolve(Path::new("views"), "./users/show", Some("html")).is_ok());
    }

    #[test]
    fn no_extension_anywhere() {
        assert!(matches!(
            resolve(Path::new("views"), "index", None),
            Err(Error::NoEngine(_))
        ));
    }
}
