//! URL Canonicalizer (C1, §4.1).
//!
//! Normalizes a URL to a canonical form and derives a stable SHA-256 digest
//! of that form, so two differently-decorated URLs that point at the same
//! resource compare equal. Tracking-parameter stripping is grounded
//! verbatim on `original_source/crawler/utils/url.py`.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{Error, Result};

/// Query parameters stripped unless explicitly preserved, ported verbatim
/// from the Python original's `TRACKING_PARAMETERS`.
pub const TRACKING_PARAMETERS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "utm_id",
    "utm_source_platform",
    "fbclid",
    "gclid",
    "gclsrc",
    "dclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "_hsenc",
    "_hsmi",
    "hsCtaTracking",
    "igshid",
    "ref",
    "ref_src",
    "ref_url",
    "source",
    "spm",
    "yclid",
];

/// Query parameters kept even though the key otherwise looks like a
/// tracking parameter, ported verbatim from `SEMANTIC_PARAMETERS`.
pub const SEMANTIC_PARAMETERS: &[&str] = &[
    "page", "p", "category", "id", "q", "sort", "order", "filter", "limit", "offset", "lang",
    "locale", "tab", "section",
];

/// Options controlling canonicalization (§4.1 steps 2, 3, 6).
#[derive(Debug, Clone)]
pub struct CanonicalizeOptions {
    /// Additional keys to preserve beyond [`SEMANTIC_PARAMETERS`].
    pub preserved_params: Vec<String>,
    /// Lowercase the host. Default `true`.
    pub lowercase_host: bool,
    /// Retain the URL fragment instead of dropping it. Default `false`.
    pub keep_fragment: bool,
}

impl Default for CanonicalizeOptions {
    fn default() -> Self {
        Self {
            preserved_params: Vec::new(),
            lowercase_host: true,
            keep_fragment: false,
        }
    }
}

/// Result of canonicalizing a URL: the canonical string plus its digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Canonical {
    pub url: String,
    pub digest: String,
}

/// Normalize `raw` per §4.1 and return the canonical form and its digest.
pub fn canonicalize(raw: &str, options: &CanonicalizeOptions) -> Result<Canonical> {
    let trimmed = raw.trim_matches(|c: char| c.is_ascii_whitespace());
    if trimmed.is_empty() {
        return Err(Error::Validation("url is empty".into()));
    }

    let mut url = Url::parse(trimmed)
        .map_err(|e| Error::Validation(format!("invalid url '{trimmed}': {e}")))?;

    if url.host_str().is_none() {
        return Err(Error::Validation(format!("url '{trimmed}' has no host")));
    }

    let scheme = url.scheme().to_ascii_lowercase();
    if !matches!(scheme.as_str(), "http" | "https" | "ftp" | "ftps") {
        return Err(Error::Validation(format!(
            "unsupported/opaque scheme '{scheme}'"
        )));
    }
    url.set_scheme(&scheme)
        .map_err(|_| Error::Validation("failed to normalize scheme".into()))?;

    if options.lowercase_host {
        if let Some(host) = url.host_str() {
            let lower = host.to_ascii_lowercase();
            url.set_host(Some(&lower))
                .map_err(|e| Error::Validation(format!("failed to lowercase host: {e}")))?;
        }
    }

    let preserved: std::collections::HashSet<&str> = SEMANTIC_PARAMETERS
        .iter()
        .copied()
        .chain(options.preserved_params.iter().map(String::as_str))
        .collect();
    let tracking: std::collections::HashSet<&str> = TRACKING_PARAMETERS.iter().copied().collect();

    let mut kept: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in url.query_pairs() {
        if tracking.contains(key.as_ref()) && !preserved.contains(key.as_ref()) {
            continue;
        }
        kept.entry(key.into_owned()).or_insert_with(|| value.into_owned());
    }

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let query = kept
            .iter()
            .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&query));
    }

    if !options.keep_fragment {
        url.set_fragment(None);
    }

    let canonical = url.to_string();
    let digest = sha256_hex(&canonical);

    Ok(Canonical {
        url: canonical,
        digest,
    })
}

/// Convenience: two URLs are equivalent iff their canonical forms match.
pub fn are_equivalent(a: &str, b: &str, options: &CanonicalizeOptions) -> bool {
    match (canonicalize(a, options), canonicalize(b, options)) {
        (Ok(ca), Ok(cb)) => ca.url == cb.url,
        _ => false,
    }
}

fn encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

fn sha256_hex(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> CanonicalizeOptions {
        CanonicalizeOptions::default()
    }

    #[test]
    fn strips_tracking_params_but_keeps_semantic_ones() {
        let c = canonicalize(
            "https://Example.com/path?utm_source=x&page=2&fbclid=abc",
            &opts(),
        )
        .unwrap();
        assert_eq!(c.url, "https://example.com/path?page=2");
    }

    #[test]
    fn sorts_params_and_keeps_first_value_on_repeat_keys() {
        let c = canonicalize("https://example.com/p?b=2&a=1&a=999", &opts()).unwrap();
        assert_eq!(c.url, "https://example.com/p?a=1&b=2");
    }

    #[test]
    fn drops_fragment_by_default() {
        let c = canonicalize("https://example.com/p#section", &opts()).unwrap();
        assert_eq!(c.url, "https://example.com/p");
    }

    #[test]
    fn keeps_fragment_when_requested() {
        let mut o = opts();
        o.keep_fragment = true;
        let c = canonicalize("https://example.com/p#section", &o).unwrap();
        assert_eq!(c.url, "https://example.com/p#section");
    }

    #[test]
    fn rejects_missing_host() {
        assert!(canonicalize("file:///etc/passwd", &opts()).is_err());
    }

    #[test]
    fn rejects_opaque_scheme() {
        assert!(canonicalize("javascript:alert(1)", &opts()).is_err());
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let first = canonicalize("https://Example.com/a?utm_source=x&b=1&a=2", &opts()).unwrap();
        let second = canonicalize(&first.url, &opts()).unwrap();
        assert_eq!(first.url, second.url);
        assert_eq!(first.digest, second.digest);
    }

    #[test]
    fn equal_canonical_forms_imply_equal_digests() {
        let a = canonicalize("https://example.com/p?a=1&b=2", &opts()).unwrap();
        let b = canonicalize("https://EXAMPLE.com/p?b=2&a=1&utm_source=x", &opts()).unwrap();
        assert_eq!(a.url, b.url);
        assert_eq!(a.digest, b.digest);
    }

    #[test]
    fn custom_preserved_param_is_kept() {
        let mut o = opts();
        o.preserved_params.push("ref".to_string());
        let c = canonicalize("https://example.com/p?ref=partner-x", &o).unwrap();
        assert_eq!(c.url, "https://example.com/p?ref=partner-x");
    }
}
