//! Path pattern compilation.
//!
//! # Grammar
//! - Literal text matches verbatim (case-insensitive)
//! - `:name` captures one or more characters excluding `/`
//! - `:name?` makes the capture, and the separator before it, optional
//! - `:name(re)` replaces the default capture sub-pattern with `re`
//! - `.:name` is a format suffix: literal dot, capture excludes `/` and `.`
//! - `*` captures the remainder greedily under the key `"*"`
//!
//! # Design Decisions
//! - Compiled once at registration, immutable afterwards
//! - Every capture gets a synthetic group name so custom sub-patterns that
//!   contain their own groups cannot shift slot indices
//! - Anchored at both ends

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Key under which unnamed wildcard captures are exposed.
pub const WILDCARD_KEY: &str = "*";

/// A named (or wildcard) capture position in a compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Parameter name, `"*"` for wildcards.
    pub name: String,
    /// Whether the capture may be absent.
    pub optional: bool,
    group: String,
}

/// A compiled path specification.
#[derive(Debug, Clone)]
pub struct PathPattern {
    spec: String,
    regex: Regex,
    slots: Vec<Slot>,
}

fn token_regex() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| {
        Regex::new(r"(/)?(\.)?:(\w+)(?:\((.*?)\))?(\?)?").expect("static token pattern is valid")
    })
}

impl PathPattern {
    /// Compile an Express-style path specification.
    pub fn compile(spec: &str) -> Result<Self> {
        let mut source = String::from("(?i)^");
        let mut slots = Vec::new();
        let mut last = 0;

        for caps in token_regex().captures_iter(spec) {
            let Some(whole) = caps.get(0) else { continue };
            push_literal(&mut source, &spec[last..whole.start()], &mut slots);
            last = whole.end();

            let slash = caps.get(1).is_some();
            let format = caps.get(2).is_some();
            let name = &caps[3];
            let optional = caps.get(5).is_some();

            let group = format!("p{}", slots.len());
            let inner = match caps.get(4) {
                Some(custom) => custom.as_str(),
                None if format => "[^/.]+?",
                None => "[^/]+?",
            };
            let capture = format!("(?P<{}>{})", group, inner);

            let mut separator = String::new();
            if slash {
                separator.push('/');
            }
            if format {
                separator.push_str(r"\.");
            }

            if optional {
                if separator.is_empty() {
                    source.push_str(&capture);
                    source.push('?');
                } else {
                    source.push_str(&format!("(?:{}{}?)?", separator, capture));
                }
            } else {
                source.push_str(&separator);
                source.push_str(&capture);
            }

            slots.push(Slot {
                name: name.to_string(),
                optional,
                group,
            });
        }
        push_literal(&mut source, &spec[last..], &mut slots);
        source.push('$');

        let regex = Regex::new(&source).map_err(|source| Error::Pattern {
            spec: spec.to_string(),
            source,
        })?;

        Ok(Self {
            spec: spec.to_string(),
            regex,
            slots,
        })
    }

    /// The specification this pattern was compiled from.
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Capture slots in group order.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Match a path, returning the raw (still percent-encoded) non-empty
    /// captures in slot order.
    pub fn captures<'p>(&self, path: &'p str) -> Option<Vec<(&Slot, &'p str)>> {
        let caps = self.regex.captures(path)?;
        Some(
            self.slots
                .iter()
                .filter_map(|slot| {
                    caps.name(&slot.group)
                        .map(|m| m.as_str())
                        .filter(|v| !v.is_empty())
                        .map(|v| (slot, v))
                })
                .collect(),
        )
    }

    /// Whether the path matches at all.
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }
}

/// Append literal spec text, turning every `*` into a wildcard capture.
fn push_literal(source: &mut String, literal: &str, slots: &mut Vec<Slot>) {
    let mut pieces = literal.split('*');
    if let Some(first) = pieces.next() {
        source.push_str(&regex::escape(first));
    }
    for piece in pieces {
        let group = format!("p{}", slots.len());
        source.push_str(&format!("(?P<{}>.*)", group));
        slots.push(Slot {
            name: WILDCARD_KEY.to_string(),
            optional: true,
            group,
        });
        source.push_str(&regex::escape(piece));
    }
}
