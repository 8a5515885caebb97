//! Check registry: the closed set of audit checks, the batch-level
//! selection derived from configuration, and per-site results.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Error, Result};
use crate::site::Site;

/// The fixed enumeration of audit checks. Declaration order is the
/// execution and reporting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckKind {
    /// Does the site end up served over https when approached over http.
    Secure,
    /// Largest contentful paint time in milliseconds.
    Lcp,
    /// Console errors, warnings, uncaught exceptions and rejections.
    ConsoleErrors,
    /// Failed subresource and fetch/XHR requests.
    RequestErrors,
    /// Security headers absent from the main-document response.
    SecurityHeaders,
    /// Mobile responsiveness defects with a derived score.
    Responsive,
    /// Form accessibility and semantics defects.
    Forms,
    /// Detected frontend frameworks, platforms and libraries.
    TechStack,
    /// Full-page screenshot capture.
    Screenshot,
}

impl CheckKind {
    /// All checks, in execution and reporting order.
    pub const ALL: [CheckKind; 9] = [
        CheckKind::Secure,
        CheckKind::Lcp,
        CheckKind::ConsoleErrors,
        CheckKind::RequestErrors,
        CheckKind::SecurityHeaders,
        CheckKind::Responsive,
        CheckKind::Forms,
        CheckKind::TechStack,
        CheckKind::Screenshot,
    ];

    /// The reduced subset run in important mode.
    pub const IMPORTANT: [CheckKind; 4] = [
        CheckKind::Secure,
        CheckKind::Responsive,
        CheckKind::Forms,
        CheckKind::TechStack,
    ];

    /// Parse a check name from the configuration vocabulary.
    pub fn parse(name: &str) -> Option<CheckKind> {
        match name {
            "security" => Some(CheckKind::Secure),
            "lcp" => Some(CheckKind::Lcp),
            "console" => Some(CheckKind::ConsoleErrors),
            "request" => Some(CheckKind::RequestErrors),
            "headers" => Some(CheckKind::SecurityHeaders),
            "mobile" => Some(CheckKind::Responsive),
            "form" => Some(CheckKind::Forms),
            "tech" => Some(CheckKind::TechStack),
            "screenshot" => Some(CheckKind::Screenshot),
            _ => None,
        }
    }

    /// Configuration name for this check.
    pub fn name(&self) -> &'static str {
        match self {
            CheckKind::Secure => "security",
            CheckKind::Lcp => "lcp",
            CheckKind::ConsoleErrors => "console",
            CheckKind::RequestErrors => "request",
            CheckKind::SecurityHeaders => "headers",
            CheckKind::Responsive => "mobile",
            CheckKind::Forms => "form",
            CheckKind::TechStack => "tech",
            CheckKind::Screenshot => "screenshot",
        }
    }

    /// Report column header for this check.
    pub fn header(&self) -> &'static str {
        match self {
            CheckKind::Secure => "Secure",
            CheckKind::Lcp => "LCP (ms)",
            CheckKind::ConsoleErrors => "Console Errors",
            CheckKind::RequestErrors => "Request Errors",
            CheckKind::SecurityHeaders => "Missing Headers",
            CheckKind::Responsive => "Responsive Issues",
            CheckKind::Forms => "Form Issues",
            CheckKind::TechStack => "Detected Tech",
            CheckKind::Screenshot => "Screenshot",
        }
    }

    /// The value reported when a check is enabled but was never sampled,
    /// e.g. because the pipeline aborted before reaching it.
    pub fn zero_value(&self) -> CheckValue {
        match self {
            CheckKind::Secure | CheckKind::Screenshot => CheckValue::Flag(false),
            CheckKind::Lcp => CheckValue::Millis(0.0),
            _ => CheckValue::Findings(Vec::new()),
        }
    }
}

/// A sampled check result. Each `CheckKind` has a fixed value shape.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckValue {
    Flag(bool),
    Millis(f64),
    Findings(Vec<String>),
}

/// The set of checks enabled for one batch. Derived once from
/// configuration and passed unchanged into every per-site run.
#[derive(Debug, Clone)]
pub struct CheckSelection {
    enabled: BTreeSet<CheckKind>,
    important: bool,
}

impl CheckSelection {
    /// Every check enabled.
    pub fn all() -> Self {
        Self {
            enabled: CheckKind::ALL.into_iter().collect(),
            important: false,
        }
    }

    /// The fixed high-signal subset.
    pub fn important() -> Self {
        Self {
            enabled: CheckKind::IMPORTANT.into_iter().collect(),
            important: true,
        }
    }

    /// An explicit comma-separated subset. Unknown names are a
    /// configuration error.
    pub fn from_names(names: &str) -> Result<Self> {
        let mut enabled = BTreeSet::new();
        for name in names.split(',') {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let kind = CheckKind::parse(name)
                .ok_or_else(|| Error::Config(format!("unknown check name: {}", name)))?;
            enabled.insert(kind);
        }

        if enabled.is_empty() {
            return Err(Error::Config("no valid checks selected".to_string()));
        }

        Ok(Self {
            enabled,
            important: false,
        })
    }

    /// Build the batch selection from the configuration surface: an
    /// explicit check list and an important-mode flag, mutually exclusive.
    pub fn from_config(checks: &str, important: bool) -> Result<Self> {
        let explicit = !checks.trim().is_empty();
        match (explicit, important) {
            (true, true) => Err(Error::Config(
                "an explicit check list and important mode are mutually exclusive".to_string(),
            )),
            (true, false) => Self::from_names(checks),
            (false, true) => Ok(Self::important()),
            (false, false) => Ok(Self::all()),
        }
    }

    pub fn is_enabled(&self, kind: CheckKind) -> bool {
        self.enabled.contains(&kind)
    }

    /// Enabled checks in execution order.
    pub fn enabled(&self) -> impl Iterator<Item = CheckKind> + '_ {
        self.enabled.iter().copied()
    }

    pub fn important_mode(&self) -> bool {
        self.important
    }
}

/// The outcome of auditing one site. Check values live in a map keyed by
/// kind; a missing entry means the check was disabled or never sampled
/// and reads as the kind's zero value.
#[derive(Debug, Clone)]
pub struct AuditResult {
    pub site: Site,
    results: BTreeMap<CheckKind, CheckValue>,
    /// Fatal, pipeline-aborting failures. Distinct from check findings.
    pub audit_errors: Vec<String>,
}

impl AuditResult {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            results: BTreeMap::new(),
            audit_errors: Vec::new(),
        }
    }

    pub fn record(&mut self, kind: CheckKind, value: CheckValue) {
        self.results.insert(kind, value);
    }

    pub fn value(&self, kind: CheckKind) -> Option<&CheckValue> {
        self.results.get(&kind)
    }

    pub fn push_error(&mut self, message: impl Into<String>) {
        self.audit_errors.push(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_enables_all_checks() {
        let selection = CheckSelection::from_config("", false).unwrap();
        for kind in CheckKind::ALL {
            assert!(selection.is_enabled(kind), "{} should be enabled", kind.name());
        }
        assert!(!selection.important_mode());
    }

    #[test]
    fn test_important_mode_subset() {
        let selection = CheckSelection::from_config("", true).unwrap();
        assert!(selection.important_mode());
        assert!(selection.is_enabled(CheckKind::Secure));
        assert!(selection.is_enabled(CheckKind::Responsive));
        assert!(selection.is_enabled(CheckKind::Forms));
        assert!(selection.is_enabled(CheckKind::TechStack));
        assert!(!selection.is_enabled(CheckKind::Lcp));
        assert!(!selection.is_enabled(CheckKind::Screenshot));
    }

    #[test]
    fn test_explicit_names() {
        let selection = CheckSelection::from_config("security, lcp,headers", false).unwrap();
        assert!(selection.is_enabled(CheckKind::Secure));
        assert!(selection.is_enabled(CheckKind::Lcp));
        assert!(selection.is_enabled(CheckKind::SecurityHeaders));
        assert!(!selection.is_enabled(CheckKind::Forms));
    }

    #[test]
    fn test_unknown_name_is_config_error() {
        let err = CheckSelection::from_config("security,bogus", false).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_explicit_and_important_are_mutually_exclusive() {
        assert!(CheckSelection::from_config("security", true).is_err());
    }

    #[test]
    fn test_enabled_iterates_in_fixed_order() {
        let selection = CheckSelection::from_config("tech,security,mobile", false).unwrap();
        let order: Vec<CheckKind> = selection.enabled().collect();
        assert_eq!(
            order,
            vec![CheckKind::Secure, CheckKind::Responsive, CheckKind::TechStack]
        );
    }

    #[test]
    fn test_unsampled_checks_read_as_zero() {
        let site = Site::parse("https://example.com/").unwrap();
        let mut result = AuditResult::new(site);
        assert_eq!(result.value(CheckKind::Lcp), None);
        assert_eq!(CheckKind::Lcp.zero_value(), CheckValue::Millis(0.0));
        assert_eq!(CheckKind::Secure.zero_value(), CheckValue::Flag(false));

        result.record(CheckKind::Lcp, CheckValue::Millis(812.5));
        assert_eq!(result.value(CheckKind::Lcp), Some(&CheckValue::Millis(812.5)));
    }
}
