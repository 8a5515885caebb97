//! Website identity parsed from a raw URL.

use url::Url;

use crate::error::{Error, Result};

/// A single website to audit. Immutable once constructed; the audit
/// engine treats this as read-only input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    /// Lowercased host, never empty.
    pub domain: String,
    /// Scheme of the URL the site was discovered under.
    pub scheme: String,
    /// The raw URL as it came out of the extraction source.
    pub original_url: String,
}

impl Site {
    /// Parse a raw URL into a `Site`. Fails on unparseable URLs and
    /// URLs without a host.
    pub fn parse(raw_url: &str) -> Result<Self> {
        let parsed = Url::parse(raw_url)
            .map_err(|e| Error::Extract(format!("invalid URL {}: {}", raw_url, e)))?;

        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Extract(format!("URL missing host: {}", raw_url)))?;

        Ok(Self {
            domain: host.to_lowercase(),
            scheme: parsed.scheme().to_string(),
            original_url: raw_url.to_string(),
        })
    }

    /// Canonical URL for navigation, using the discovered scheme.
    pub fn url(&self) -> String {
        format!("{}://{}/", self.scheme, self.domain)
    }

    /// URL with the scheme forced to plain http. Navigating here reveals
    /// whether the site upgrades the connection to https.
    pub fn forced_http_url(&self) -> String {
        format!("http://{}/", self.domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lowercases_domain() {
        let site = Site::parse("https://Example.COM/path?x=1").unwrap();
        assert_eq!(site.domain, "example.com");
        assert_eq!(site.scheme, "https");
        assert_eq!(site.original_url, "https://Example.COM/path?x=1");
    }

    #[test]
    fn test_parse_rejects_missing_host() {
        assert!(Site::parse("example.com").is_err());
        assert!(Site::parse("not a url").is_err());
    }

    #[test]
    fn test_navigation_urls() {
        let site = Site::parse("https://example.com/about").unwrap();
        assert_eq!(site.url(), "https://example.com/");
        assert_eq!(site.forced_http_url(), "http://example.com/");
    }
}
