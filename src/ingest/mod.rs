// src/ingest/mod.rs
pub mod providers;
pub mod scheduler;
pub mod types;

use once_cell::sync::OnceCell;
use regex::Regex;

/// Longest description we keep from markup sources.
const MAX_TEXT_CHARS: usize = 1500;

/// Flatten markup into plain text: decode entities, strip tags, normalize quotes,
/// collapse whitespace. Used for RSS descriptions and scraped page text.
///
/// Reddit titles and selftext are NOT passed through this; they feed the fingerprint
/// verbatim.
pub fn clean_markup(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));
    out = re_tags.replace_all(&out, " ").to_string();

    // 3) Normalize “ ” ‘ ’ « » to ASCII quotes
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex"));
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Length cap
    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }

    out
}
