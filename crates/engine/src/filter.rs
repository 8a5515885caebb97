//! Resource noise filter.
//!
//! Classifies resource URLs the idle detector should not wait on:
//! inline data, and the long tail of analytics/tracking/chat widgets
//! that keep low-value connections open long after the page is usable.

/// Domain fragments of analytics, tracking and support-widget services.
/// A resource URL containing any of these is ignored by the idle detector.
pub const IGNORED_RESOURCE_PATTERNS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "connect.facebook.net",
    "facebook.com/tr",
    "hotjar.com",
    "clarity.ms",
    "segment.com",
    "segment.io",
    "mixpanel.com",
    "amplitude.com",
    "heapanalytics.com",
    "fullstory.com",
    "matomo",
    "plausible.io",
    "newrelic.com",
    "nr-data.net",
    "sentry.io",
    "intercom.io",
    "intercomcdn.com",
    "drift.com",
    "tawk.to",
    "crisp.chat",
    "zdassets.com",
    "zendesk.com",
    "hubspot.com",
    "hs-scripts.com",
];

/// Whether a resource URL should be ignored when deciding if the page
/// has finished loading. `blob:` and `data:` URIs never represent real
/// network trips; the pattern table covers background noise services.
pub fn is_ignored_resource(resource: &str) -> bool {
    if resource.starts_with("blob:") || resource.starts_with("data:") {
        return true;
    }

    IGNORED_RESOURCE_PATTERNS
        .iter()
        .any(|pattern| resource.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_uris_are_ignored() {
        assert!(is_ignored_resource("data:image/png;base64,AAAA"));
        assert!(is_ignored_resource("blob:https://x/y"));
    }

    #[test]
    fn test_tracking_domains_are_ignored() {
        assert!(is_ignored_resource("https://www.google-analytics.com/collect"));
        assert!(is_ignored_resource("https://static.hotjar.com/c/hotjar.js"));
        assert!(is_ignored_resource("https://widget.intercom.io/widget/abc"));
    }

    #[test]
    fn test_real_resources_are_not_ignored() {
        assert!(!is_ignored_resource("https://example.com/app.js"));
        assert!(!is_ignored_resource("https://cdn.example.com/styles.css"));
    }
}
