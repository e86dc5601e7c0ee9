//! Proxy configuration normalization.
//!
//! Host environments hand us proxy settings in whatever shape their own
//! config uses: a bare URL string, a per-scheme map with unpredictable key
//! casing, or nothing at all. Everything funnels through [`normalize`] so the
//! adapters only ever see a complete http/https pair.

use serde_json::Value;

/// Canonical proxy endpoints, one per scheme.
///
/// Both fields are always populated; when the raw config only carries one
/// scheme the other inherits the same URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyPair {
    pub http: String,
    pub https: String,
}

impl ProxyPair {
    /// Endpoint to hand to the HTTP client for the given URL scheme.
    pub fn for_scheme(&self, scheme: &str) -> &str {
        if scheme.eq_ignore_ascii_case("https") {
            &self.https
        } else {
            &self.http
        }
    }
}

/// Normalize a raw proxy value into a [`ProxyPair`].
///
/// Accepted shapes: a non-empty URL string, or a map with `http`/`https`
/// keys in any casing (a partial map borrows the missing scheme from the
/// other). Anything else degrades to `None` with a logged warning; this
/// function never fails.
pub fn normalize(raw: Option<&Value>) -> Option<ProxyPair> {
    let value = raw?;
    match value {
        Value::Null => None,
        Value::String(s) => {
            let url = s.trim();
            if url.is_empty() {
                return None;
            }
            Some(ProxyPair {
                http: url.to_string(),
                https: url.to_string(),
            })
        }
        Value::Object(map) => {
            let lookup = |scheme: &str| -> Option<String> {
                map.iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(scheme))
                    .and_then(|(_, v)| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            };

            let http = lookup("http");
            let https = lookup("https");
            match (http, https) {
                (None, None) => None,
                (http, https) => {
                    let resolved_http = http.clone().or_else(|| https.clone())?;
                    let resolved_https = https.or(http)?;
                    Some(ProxyPair {
                        http: resolved_http,
                        https: resolved_https,
                    })
                }
            }
        }
        other => {
            log::warn!("unusable proxy configuration ({other}), continuing without proxy");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_input_yields_none() {
        assert_eq!(normalize(None), None);
        assert_eq!(normalize(Some(&Value::Null)), None);
        assert_eq!(normalize(Some(&json!(""))), None);
    }

    #[test]
    fn string_input_fills_both_schemes() {
        let pair = normalize(Some(&json!("http://127.0.0.1:7890"))).unwrap();
        assert_eq!(pair.http, "http://127.0.0.1:7890");
        assert_eq!(pair.https, "http://127.0.0.1:7890");
    }

    #[test]
    fn partial_map_borrows_other_scheme() {
        let pair = normalize(Some(&json!({ "https": "http://proxy:8080" }))).unwrap();
        assert_eq!(pair.http, "http://proxy:8080");
        assert_eq!(pair.https, "http://proxy:8080");
    }

    #[test]
    fn mixed_case_keys_are_accepted() {
        let pair = normalize(Some(&json!({
            "HTTP": "http://a:1",
            "Https": "http://b:2"
        })))
        .unwrap();
        assert_eq!(pair.http, "http://a:1");
        assert_eq!(pair.https, "http://b:2");
    }

    #[test]
    fn map_without_usable_urls_yields_none() {
        assert_eq!(normalize(Some(&json!({ "socks5": "socks5://x:1" }))), None);
        assert_eq!(normalize(Some(&json!({ "http": "" }))), None);
    }

    #[test]
    fn malformed_shapes_degrade_to_none() {
        assert_eq!(normalize(Some(&json!(42))), None);
        assert_eq!(normalize(Some(&json!([1, 2, 3]))), None);
    }

    #[test]
    fn scheme_selection() {
        let pair = normalize(Some(&json!({
            "http": "http://a:1",
            "https": "http://b:2"
        })))
        .unwrap();
        assert_eq!(pair.for_scheme("http"), "http://a:1");
        assert_eq!(pair.for_scheme("HTTPS"), "http://b:2");
    }
}
