//! `Accept` header parsing and negotiation.

use crate::http::mime;

/// One entry of an `Accept` header.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRange {
    pub main_type: String,
    pub sub_type: String,
    pub quality: f32,
}

impl MediaRange {
    /// Whether `target` is covered by this range.
    ///
    /// A target without `/` is a short name (`"html"`, `"json"`) and is
    /// expanded through the MIME table first.
    pub fn matches(&self, target: &str) -> bool {
        let mime = if target.contains('/') {
            target
        } else {
            mime::from_extension(target)
        };
        let Some((main, sub)) = mime.split_once('/') else {
            return false;
        };
        let sub = sub.split(';').next().unwrap_or(sub).trim();

        (self.main_type == "*" || self.main_type.eq_ignore_ascii_case(main.trim()))
            && (self.sub_type == "*" || self.sub_type.eq_ignore_ascii_case(sub))
    }
}

/// Parse an `Accept` header into ranges ordered by descending quality.
///
/// Entries without a `type/subtype` pair are skipped. Equal qualities keep
/// header order.
pub fn parse_accept(header: &str) -> Vec<MediaRange> {
    let mut ranges: Vec<MediaRange> = header
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split(';');
            let (main, sub) = parts.next()?.trim().split_once('/')?;
            if main.is_empty() || sub.is_empty() {
                return None;
            }
            let quality = parts
                .find_map(|p| p.trim().strip_prefix("q="))
                .and_then(|q| q.trim().parse::<f32>().ok())
                .unwrap_or(1.0);
            Some(MediaRange {
                main_type: main.trim().to_ascii_lowercase(),
                sub_type: sub.trim().to_ascii_lowercase(),
                quality,
            })
        })
        .collect();

    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
}

/// Whether any range accepts `target`.
pub fn accepts(ranges: &[MediaRange], target: &str) -> bool {
    ranges.iter().any(|r| r.matches(target))
}

/// The first candidate matching the highest-priority range that matches any.
pub fn negotiate<'c>(ranges: &[MediaRange], candidates: &[&'c str]) -> Option<&'c str> {
    ranges
        .iter()
        .find_map(|range| candidates.iter().copied().find(|c| range.matches(c)))
}
