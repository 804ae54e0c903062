//! Static file serving.
//!
//! Mount under a wildcard route; the `*` capture is the path below `root`.
//! A trailing `/` serves `index.html`.

use std::path::{Component, Path, PathBuf};

use dashmap::DashMap;
use tracing::debug;

use crate::error::Result;
use crate::http::context::RouteContext;
use crate::routing::WILDCARD_KEY;

const INDEX_FILE: &str = "index.html";

/// Serve GET and HEAD requests from files under `root`.
pub fn static_files(
    root: impl Into<PathBuf>,
) -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    let root = root.into();
    let files: DashMap<String, PathBuf> = DashMap::new();
    move |ctx| {
        if !matches!(ctx.req.method(), "get" | "head") {
            return Ok(false);
        }
        let requested = ctx.req.param_str(WILDCARD_KEY).unwrap_or_default();

        let cached = files.get(&requested).map(|entry| entry.value().clone());
        let file = match cached {
            Some(file) => file,
            None => {
                let Some(file) = locate(&root, &requested) else {
                    return Ok(false);
                };
                files.insert(requested, file.clone());
                file
            }
        };

        ctx.send_file(&file)?;
        Ok(true)
    }
}

/// Map a request path onto an existing file below `root`.
fn locate(root: &Path, requested: &str) -> Option<PathBuf> {
    let mut relative = requested.trim_start_matches('/').to_string();
    if relative.is_empty() || relative.ends_with('/') {
        relative.push_str(INDEX_FILE);
    }

    let relative = Path::new(&relative);
    if !relative.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
        debug!(path = %requested, "Rejected static path outside the root");
        return None;
    }

    let file = root.join(relative);
    file.is_file().then_some(file)
}
