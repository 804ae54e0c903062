//! Render views named after the request path.

use std::path::PathBuf;

use dashmap::DashSet;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::http::context::RouteContext;
use crate::routing::WILDCARD_KEY;

/// Template files remembered as missing before the set is reset.
const MISS_LIMIT: usize = 1024;

/// Render the view at the `*` capture, `index` for a directory.
///
/// Template files found missing are remembered so later requests skip
/// building the render context until the file appears.
pub fn renderer() -> impl Fn(&mut RouteContext) -> Result<bool> + Send + Sync + 'static {
    let misses: DashSet<PathBuf> = DashSet::new();
    move |ctx| {
        let mut view = ctx.req.param_str(WILDCARD_KEY).unwrap_or_default();
        if !view.starts_with('/') {
            view.insert(0, '/');
        }
        if view.ends_with('/') {
            view.push_str("index");
        }

        let resolved = match ctx.app.resolve_view(&view) {
            Ok(resolved) => resolved,
            Err(e @ (Error::NoEngine(_) | Error::ViewNotFound(_))) => {
                debug!(view = %view, error = %e, "No view for path");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if misses.contains(&resolved.path) {
            if !resolved.path.is_file() {
                return Ok(false);
            }
            misses.remove(&resolved.path);
        }

        match ctx.render(&view, Value::Null) {
            Ok(()) => Ok(true),
            Err(e @ (Error::NoEngine(_) | Error::ViewNotFound(_))) => {
                debug!(view = %view, error = %e, "No view for path");
                remember_miss(&misses, resolved.path);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

fn remember_miss(misses: &DashSet<PathBuf>, path: PathBuf) {
    if misses.len() >= MISS_LIMIT {
        misses.clear();
    }
    misses.insert(path);
}
