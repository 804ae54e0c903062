//! Built-in placeholder template engine.
//!
//! `{{ name }}` and `{{ user.name }}` are replaced with HTML-escaped values
//! from the context; `{{{ name }}}` inserts the value unescaped. Missing
//! values render as nothing.
//!
//! Compiled templates are cached per path and recompiled when the file's
//! modification time changes. Two requests missing the cache at once both
//! compile; the last one to finish is kept.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use dashmap::DashMap;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::view::Engine;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Value { path: Vec<String>, raw: bool },
}

#[derive(Debug)]
struct Template {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone)]
struct Cached {
    modified: SystemTime,
    template: Arc<Template>,
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{\{\{\s*([\w.-]+)\s*\}\}\}|\{\{\s*([\w.-]+)\s*\}\}")
            .expect("static placeholder pattern is valid")
    })
}

impl Template {
    fn compile(source: &str) -> Self {
        let mut segments = Vec::new();
        let mut last = 0;
        for caps in placeholder_regex().captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                segments.push(Segment::Text(source[last..whole.start()].to_string()));
            }
            let (name, raw) = match (caps.get(1), caps.get(2)) {
                (Some(raw), _) => (raw.as_str(), true),
                (None, Some(escaped)) => (escaped.as_str(), false),
                (None, None) => continue,
            };
            segments.push(Segment::Value {
                path: name.split('.').map(str::to_string).collect(),
                raw,
            });
            last = whole.end();
        }
        if last < source.len() {
            segments.push(Segment::Text(source[last..].to_string()));
        }
        Self { segments }
    }

    fn render(&self, context: &Map<String, Value>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Value { path, raw } => {
                    let text = lookup(context, path).map(display).unwrap_or_default();
                    if *raw {
                        out.push_str(&text);
                    } else {
                        out.push_str(&escape_html(&text));
                    }
                }
            }
        }
        out
    }
}

fn lookup<'a>(context: &'a Map<String, Value>, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = context.get(first)?;
    for key in rest {
        current = match current {
            Value::Object(map) => map.get(key)?,
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Escape text for HTML element and attribute content.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Placeholder substitution engine with a compiled-template cache.
#[derive(Debug, Default)]
pub struct PlaceholderEngine {
    cache: DashMap<PathBuf, Cached>,
}

impl PlaceholderEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached templates.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    fn template(&self, path: &Path) -> Result<Arc<Template>> {
        let modified = fs::metadata(path)?.modified()?;
        if let Some(entry) = self.cache.get(path) {
            if entry.modified == modified {
                return Ok(entry.template.clone());
            }
        }

        tracing::debug!(path = %path.display(), "Compiling template");
        let template = Arc::new(Template::compile(&fs::read_to_string(path)?));
        self.cache.insert(
            path.to_path_buf(),
            Cached {
                modified,
                template: template.clone(),
            },
        );
        Ok(template)
    }
}

impl Engine for PlaceholderEngine {
    fn render(&self, path: &Path, context: &Map<String, Value>) -> Result<String> {
        Ok(self.template(path)?.render(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn ctx(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn substitutes_and_escapes() {
        let t = Template::compile("<p>{{ name }}</p>{{{ html }}}{{missing}}!");
        let out = t.render(&ctx(json!({"name": "<b>&", "html": "<i>x</i>"})));
        assert_eq!(out, "<p>&lt;b&gt;&amp;</p><i>x</i>!");
    }

    #[test]
    fn dotted_paths_and_scalars() {
        let t = Template::compile("{{ user.name }} is {{ user.age }}, tags: {{ tags.1 }}");
        let out = t.render(&ctx(json!({
            "user": {"name": "ada", "age": 36},
            "tags": ["x", "y"]
        })));
        assert_eq!(out, "ada is 36, tags: y");
    }

    #[test]
    fn caches_and_recompiles_on_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.html");
        fs::write(&path, "v1 {{ n }}").unwrap();

        let engine = PlaceholderEngine::new();
        let context = ctx(json!({"n": 1}));
        assert_eq!(engine.render(&path, &context).unwrap(), "v1 1");
        assert_eq!(engine.cached(), 1);

        let mut file = fs::OpenOptions::new().write(true).truncate(true).open(&path).unwrap();
        file.write_all(b"v2 {{ n }}").unwrap();
        file.set_modified(SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();
        drop(file);

        assert_eq!(engine.render(&path, &context).unwrap(), "v2 1");
        assert_eq!(engine.cached(), 1);
    }

    #[test]
    fn missing_file_is_io_not_found() {
        let engine = PlaceholderEngine::new();
        let err = engine
            .render(Path::new("/definitely/not/here.html"), &Map::new())
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 404);
    }
}
