//! Identifier and name normalization.
//!
//! Identifiers arrive in whatever shape the enrichment source produced
//! (`https://www.Acme.com/about`, `acme.com`, `ACME.COM.`). Matching only
//! works on canonical forms, so every identifier and name passes through
//! here before it is indexed or compared.

use std::sync::OnceLock;

use regex::Regex;

use crate::entity::identifiers;

fn scheme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9+.-]*://").expect("static regex"))
}

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\p{L}\p{N}&\s]+").expect("static regex"))
}

fn legal_suffix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\s+(inc|incorporated|llc|llp|lp|ltd|limited|corp|corporation|co|company|plc|gmbh|ag|sa|holdings)$",
        )
        .expect("static regex")
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_web_prefix(value: &str) -> &str {
    let value = match scheme_re().find(value) {
        Some(m) => &value[m.end()..],
        None => value,
    };
    value.strip_prefix("www.").unwrap_or(value)
}

/// Canonical form of a domain: lowercase host without scheme, `www.`,
/// port, path or trailing dot.
#[must_use]
pub fn normalize_domain(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let host = strip_web_prefix(&lower);
    let host = host.split(['/', '?', '#']).next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default();
    host.trim_end_matches('.').to_string()
}

/// Canonical form of a professional-network id or profile URL.
#[must_use]
pub fn normalize_network_id(value: &str) -> String {
    let lower = value.trim().to_lowercase();
    let rest = strip_web_prefix(&lower);
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    rest.trim_end_matches('/').to_string()
}

/// Canonical form of an identifier value for `key`.
#[must_use]
pub fn normalize_identifier(key: &str, value: &str) -> String {
    match key {
        identifiers::DOMAIN => normalize_domain(value),
        identifiers::NETWORK_ID => normalize_network_id(value),
        _ => value.trim().to_lowercase(),
    }
}

/// Key used for case-insensitive exact name matching.
#[must_use]
pub fn name_key(name: &str) -> String {
    collapse_whitespace(&name.to_lowercase())
}

/// Looser key used for fuzzy comparison: punctuation and trailing legal
/// suffixes (`Inc`, `LLC`, ...) are dropped.
#[must_use]
pub fn fuzzy_key(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut key = collapse_whitespace(&punctuation_re().replace_all(&lower, " "));
    loop {
        let stripped = legal_suffix_re().replace(&key, "").into_owned();
        if stripped == key || stripped.is_empty() {
            break;
        }
        key = stripped;
    }
    key
}

/// Jaro-Winkler similarity of two names over their fuzzy keys, in `[0, 1]`.
#[must_use]
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let a = fuzzy_key(a);
    let b = fuzzy_key(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(&a, &b)
}
