//! Site normalization and filtering.

use std::collections::HashSet;

use tracing::warn;

use siteaudit_core::Site;

/// Domains that are never worth auditing as business websites: social
/// networks, booking aggregators, directories and the like.
pub const IGNORED_BUSINESS_DOMAINS: &[&str] = &[
    "facebook.com",
    "instagram.com",
    "twitter.com",
    "linkedin.com",
    "booksy.com",
    "treatwell.co.uk",
    "fresha.com",
    "yelp.com",
    "yelp.co.uk",
    "yell.com",
    "tripadvisor.com",
    "boots.com",
    "superdrug.com",
    "directory",
    "google.com",
    "maps.google.com",
];

/// Convert raw URLs into `Site`s, dropping empties, unparseable URLs
/// (warned, not fatal), duplicate domains and ignored business domains.
/// Input order is preserved for the survivors.
pub fn filter_sites(raw_urls: impl IntoIterator<Item = String>) -> Vec<Site> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut sites = Vec::new();

    for raw in raw_urls {
        if raw.is_empty() {
            continue;
        }

        let site = match Site::parse(&raw) {
            Ok(site) => site,
            Err(e) => {
                warn!("skipping URL: {}", e);
                continue;
            }
        };

        if seen.contains(&site.domain) || is_ignored_domain(&site.domain) {
            continue;
        }

        seen.insert(site.domain.clone());
        sites.push(site);
    }

    sites
}

fn is_ignored_domain(domain: &str) -> bool {
    IGNORED_BUSINESS_DOMAINS
        .iter()
        .any(|ignored| domain.contains(ignored))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_dedupes_by_domain() {
        let sites = filter_sites(urls(&[
            "https://example.com/",
            "https://example.com/contact",
            "http://EXAMPLE.com/about",
        ]));
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].domain, "example.com");
    }

    #[test]
    fn test_drops_ignored_and_invalid() {
        let sites = filter_sites(urls(&[
            "",
            "not a url",
            "https://www.facebook.com/somebusiness",
            "https://somebusiness.co.uk/",
            "https://directory.example.org/",
        ]));
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].domain, "somebusiness.co.uk");
    }

    #[test]
    fn test_preserves_input_order() {
        let sites = filter_sites(urls(&[
            "https://b.example/",
            "https://a.example/",
            "https://c.example/",
        ]));
        let domains: Vec<&str> = sites.iter().map(|s| s.domain.as_str()).collect();
        assert_eq!(domains, vec!["b.example", "a.example", "c.example"]);
    }
}
