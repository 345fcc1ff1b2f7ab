//! Request and response values exchanged with the network and the cache,
//! and the mapping from request URLs to logical resource keys.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::manifest::ROOT_KEY;

/// HTTP request method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
    /// Any other method token, stored upper-cased.
    Other(String),
}

impl Method {
    /// Returns the canonical method token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
            Self::Other(token) => token,
        }
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Ok(match upper.as_str() {
            "GET" => Self::Get,
            "HEAD" => Self::Head,
            "POST" => Self::Post,
            "PUT" => Self::Put,
            "PATCH" => Self::Patch,
            "DELETE" => Self::Delete,
            "OPTIONS" => Self::Options,
            _ => Self::Other(upper),
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a fetch interacts with intermediate HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Normal HTTP caching rules apply.
    #[default]
    Default,
    /// Always go to the network, bypassing and refreshing intermediate caches.
    Reload,
}

/// An outgoing or intercepted request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Intermediate cache policy.
    pub cache_mode: CacheMode,
}

impl Request {
    /// Creates a request with the default cache mode.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            cache_mode: CacheMode::Default,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Sets the cache mode.
    #[must_use]
    pub const fn with_cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }
}

/// A response as delivered by the network or stored in a cache partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Response headers in arrival order.
    pub headers: Vec<(String, String)>,
    /// Response body. Cloning shares the underlying buffer.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns true for a 2xx status.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns the first header value with the given name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Derives the logical resource key of `url` relative to `origin`.
///
/// The origin prefix and any `?v=` cache-busting suffix are removed. The bare
/// origin, hash-fragment routes and the empty path all map to [`ROOT_KEY`].
/// Returns `None` for URLs outside `origin`.
#[must_use]
pub fn resource_key(origin: &str, url: &str) -> Option<String> {
    let rest = url.strip_prefix(origin)?;
    if rest.is_empty() {
        return Some(ROOT_KEY.to_string());
    }
    let path = rest.strip_prefix('/')?;
    if path.starts_with('#') {
        return Some(ROOT_KEY.to_string());
    }
    let key = path.split("?v=").next().unwrap_or_default();
    if key.is_empty() {
        Some(ROOT_KEY.to_string())
    } else {
        Some(key.to_string())
    }
}

/// Returns the URL under which the resource `key` is stored in a partition.
#[must_use]
pub fn canonical_url(origin: &str, key: &str) -> String {
    if key == ROOT_KEY {
        format!("{origin}/")
    } else {
        format!("{origin}/{key}")
    }
}

/// Maps a stored entry URL back to its logical key. Entries outside the
/// origin keep their URL as key so they never match a manifest key.
#[must_use]
pub fn stored_key(origin: &str, url: &str) -> String {
    url.strip_prefix(origin)
        .and_then(|rest| rest.strip_prefix('/'))
        .map_or_else(
            || url.to_string(),
            |key| {
                if key.is_empty() {
                    ROOT_KEY.to_string()
                } else {
                    key.to_string()
                }
            },
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://app.example";

    #[test]
    fn key_strips_origin() {
        assert_eq!(
            resource_key(ORIGIN, "https://app.example/main.js").as_deref(),
            Some("main.js")
        );
        assert_eq!(
            resource_key(ORIGIN, "https://app.example/assets/a.png").as_deref(),
            Some("assets/a.png")
        );
    }

    #[test]
    fn key_strips_version_suffix() {
        assert_eq!(
            resource_key(ORIGIN, "https://app.example/main.js?v=123").as_deref(),
            Some("main.js")
        );
    }

    #[test]
    fn root_variants_map_to_root_key() {
        for url in [
            "https://app.example",
            "https://app.example/",
            "https://app.example/#/orders",
            "https://app.example/?v=9",
        ] {
            assert_eq!(resource_key(ORIGIN, url).as_deref(), Some(ROOT_KEY), "{url}");
        }
    }

    #[test]
    fn foreign_urls_have_no_key() {
        assert_eq!(resource_key(ORIGIN, "https://cdn.example/main.js"), None);
        assert_eq!(resource_key(ORIGIN, "https://app.example.evil/x"), None);
    }

    #[test]
    fn canonical_url_round_trips_through_stored_key() {
        for key in [ROOT_KEY, "main.js", "assets/fonts/a.ttf"] {
            let url = canonical_url(ORIGIN, key);
            assert_eq!(stored_key(ORIGIN, &url), key);
        }
        assert_eq!(canonical_url(ORIGIN, ROOT_KEY), "https://app.example/");
    }

    #[test]
    fn stored_key_keeps_foreign_urls() {
        assert_eq!(
            stored_key(ORIGIN, "https://cdn.example/x.js"),
            "https://cdn.example/x.js"
        );
    }

    #[test]
    fn method_parsing() {
        assert_eq!("get".parse::<Method>().unwrap(), Method::Get);
        assert_eq!("POST".parse::<Method>().unwrap(), Method::Post);
        assert_eq!(
            "purge".parse::<Method>().unwrap(),
            Method::Other("PURGE".to_string())
        );
        assert_eq!(Method::Other("PURGE".to_string()).to_string(), "PURGE");
    }

    #[test]
    fn response_status_and_headers() {
        let resp = Response::new(204, "").with_header("Content-Type", "text/html");
        assert!(resp.is_ok());
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert!(!Response::new(404, "").is_ok());
        assert!(!Response::new(304, "").is_ok());
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn version_suffix_never_changes_key(path in "[a-z]{1,8}(/[a-z]{1,8}){0,3}\\.[a-z]{2,4}", v in "[0-9a-f]{0,12}") {
                let plain = resource_key(ORIGIN, &format!("{ORIGIN}/{path}"));
                let busted = resource_key(ORIGIN, &format!("{ORIGIN}/{path}?v={v}"));
                prop_assert_eq!(plain, busted);
            }

            #[test]
            fn derived_keys_are_never_empty(rest in "[ -~]{0,24}") {
                if let Some(key) = resource_key(ORIGIN, &format!("{ORIGIN}{rest}")) {
                    prop_assert!(!key.is_empty());
                }
            }
        }
    }
}
