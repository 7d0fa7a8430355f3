//! Canonicalization and stable hashing: `url_hash`, `input_hash`, and the
//! `canonicalize_url`/`normalize_input` helpers they're built from.

use sha2::{Digest, Sha256};
use url::Url;

use crate::error::CoreError;

/// Hex-encoded SHA-256 digest of `input`.
fn hash_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Lowercase, trim whitespace from a raw supplier title.
#[must_use]
pub fn normalize_input(input_raw: &str) -> String {
    input_raw.trim().to_lowercase()
}

/// Stable hash of a raw supplier title, insensitive to case and surrounding
/// whitespace.
#[must_use]
pub fn input_hash(input_raw: &str) -> String {
    hash_hex(&normalize_input(input_raw))
}

/// Canonicalize a URL: drop the fragment, lowercase the host, and sort query
/// parameters by key then value so equivalent URLs produce identical output.
pub fn canonicalize_url(raw_url: &str) -> Result<String, CoreError> {
    let mut url = Url::parse(raw_url).map_err(|e| CoreError::InvalidUrl {
        url: raw_url.to_string(),
        reason: e.to_string(),
    })?;

    url.set_fragment(None);

    if let Some(host) = url.host_str() {
        let lower = host.to_lowercase();
        if lower != host {
            url.set_host(Some(&lower)).map_err(|e| CoreError::InvalidUrl {
                url: raw_url.to_string(),
                reason: e.to_string(),
            })?;
        }
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        url.set_query(Some(&serializer.finish()));
    }

    Ok(url.to_string())
}

/// Stable hash of a canonicalized URL.
pub fn url_hash(raw_url: &str) -> Result<String, CoreError> {
    Ok(hash_hex(&canonicalize_url(raw_url)?))
}

/// Lowercased host component of a URL, for trust-tier lookup.
pub fn domain_of(raw_url: &str) -> Result<String, CoreError> {
    let url = Url::parse(raw_url).map_err(|e| CoreError::InvalidUrl {
        url: raw_url.to_string(),
        reason: e.to_string(),
    })?;
    url.host_str()
        .map(str::to_lowercase)
        .ok_or_else(|| CoreError::InvalidUrl {
            url: raw_url.to_string(),
            reason: "url has no host".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_input_trims_and_lowercases() {
        assert_eq!(normalize_input("  HP CF217A  "), "hp cf217a");
    }

    #[test]
    fn input_hash_is_stable_across_whitespace_and_case() {
        assert_eq!(input_hash("HP CF217A"), input_hash("  hp cf217a  "));
    }

    #[test]
    fn canonicalize_url_drops_fragment() {
        let c = canonicalize_url("https://Example.com/path#section").unwrap();
        assert!(!c.contains('#'));
    }

    #[test]
    fn canonicalize_url_lowercases_host() {
        let c = canonicalize_url("https://EXAMPLE.com/path").unwrap();
        assert!(c.starts_with("https://example.com/"));
    }

    #[test]
    fn canonicalize_url_sorts_query_params() {
        let a = canonicalize_url("https://example.com/p?b=2&a=1").unwrap();
        let b = canonicalize_url("https://example.com/p?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn url_hash_matches_for_equivalent_urls() {
        let a = url_hash("https://EXAMPLE.com/p?b=2&a=1#frag").unwrap();
        let b = url_hash("https://example.com/p?a=1&b=2").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn domain_of_lowercases_host() {
        assert_eq!(domain_of("https://Example.COM/path").unwrap(), "example.com");
    }

    #[test]
    fn canonicalize_url_rejects_garbage() {
        assert!(canonicalize_url("not a url").is_err());
    }

    proptest::proptest! {
        #[test]
        fn canonicalize_is_idempotent(host in "[a-z]{3,10}", path in "[a-z/]{0,10}") {
            let raw = format!("https://{host}.com/{path}");
            if let Ok(once) = canonicalize_url(&raw) {
                let twice = canonicalize_url(&once).unwrap();
                proptest::prop_assert_eq!(once, twice);
            }
        }
    }
}
