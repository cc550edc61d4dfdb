//! Upgrade request metadata and invite token extraction.

use axum::http::{header, HeaderMap};
use std::collections::HashMap;
use std::net::SocketAddr;

/// Header and cookie name carrying the invite token.
pub const INVITE_TOKEN_NAME: &str = "x-token-invite";

/// What the session keeps from the upgrade request.
///
/// Header names are stored lowercase. When a header repeats, the first
/// value wins; cookies from repeated `Cookie` headers are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    pub headers: HashMap<String, String>,
    pub cookies: HashMap<String, String>,
    pub remote_addr: Option<SocketAddr>,
}

impl RequestMetadata {
    pub fn from_headers(headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Self {
        let mut metadata = Self {
            remote_addr,
            ..Self::default()
        };

        for (name, value) in headers {
            let Ok(value) = value.to_str() else {
                continue;
            };
            if name == header::COOKIE {
                metadata.cookies.extend(parse_cookies(value));
            } else {
                metadata
                    .headers
                    .entry(name.as_str().to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        metadata
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// The invite token presented with the request.
    ///
    /// The cookie takes precedence over the header when both are present.
    /// Blank values count as absent.
    pub fn invite_token(&self) -> Option<&str> {
        self.cookie(INVITE_TOKEN_NAME)
            .or_else(|| self.header(INVITE_TOKEN_NAME))
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// Splits a `Cookie` header value into name/value pairs.
pub fn parse_cookies(value: &str) -> impl Iterator<Item = (String, String)> + '_ {
    value.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), value.trim().trim_matches('"').to_string()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    fn headers(pairs: &[(&str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let name = HeaderName::from_bytes(name.as_bytes()).unwrap();
            map.append(name, HeaderValue::from_static(*value));
        }
        map
    }

    #[test]
    fn token_from_header() {
        let metadata = RequestMetadata::from_headers(&headers(&[("X-Token-Invite", "abc")]), None);
        assert_eq!(metadata.invite_token(), Some("abc"));
    }

    #[test]
    fn cookie_wins_over_header() {
        let metadata = RequestMetadata::from_headers(
            &headers(&[
                ("x-token-invite", "from-header"),
                ("cookie", "theme=dark; x-token-invite=from-cookie"),
            ]),
            None,
        );
        assert_eq!(metadata.invite_token(), Some("from-cookie"));
        assert_eq!(metadata.cookie("theme"), Some("dark"));
    }

    #[test]
    fn blank_or_missing_token_is_absent() {
        assert_eq!(RequestMetadata::default().invite_token(), None);
        let metadata = RequestMetadata::from_headers(&headers(&[("x-token-invite", "  ")]), None);
        assert_eq!(metadata.invite_token(), None);
    }

    #[test]
    fn cookie_parsing_tolerates_noise() {
        let cookies: HashMap<_, _> = parse_cookies(r#" a=1;;b = "two" ; =bad; c"#).collect();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
        assert_eq!(cookies.get("b").map(String::as_str), Some("two"));
    }

    #[test]
    fn repeated_cookie_headers_are_merged() {
        let metadata = RequestMetadata::from_headers(
            &headers(&[("cookie", "a=1"), ("cookie", "b=2"), ("user-agent", "test")]),
            Some(SocketAddr::from(([10, 0, 0, 1], 4000))),
        );
        assert_eq!(metadata.cookie("a"), Some("1"));
        assert_eq!(metadata.cookie("b"), Some("2"));
        assert_eq!(metadata.header("User-Agent"), Some("test"));
        assert_eq!(metadata.remote_addr.map(|a| a.port()), Some(4000));
    }
}
