//! Regex vocabularies used by the classifier
//!
//! Two layers: site-specific pattern sets keyed by a hostname substring, and
//! a generic set applied to every site. Within a set the first matching
//! pattern wins, so more specific patterns come first.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use scrapeshield_domain::ErrorKind;

/// A compiled pattern and the kind it maps to.
#[derive(Debug, Clone)]
pub struct ErrorPattern {
    pub regex: Regex,
    pub kind: ErrorKind,
}

impl ErrorPattern {
    /// Compiles `pattern` case-insensitively.
    pub fn new(pattern: &str, kind: ErrorKind) -> Result<Self, regex::Error> {
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self { regex, kind })
    }
}

const DEFAULT_SITE_PATTERNS: &[(&str, &str, ErrorKind)] = &[
    ("amazon.", r"robot check|enter the characters you see below", ErrorKind::Captcha),
    ("amazon.", r"api-services-support@amazon\.com|automated access to amazon", ErrorKind::BotDetection),
    ("amazon.", r"sign in for the best experience|ap/signin", ErrorKind::AuthRequired),
    ("walmart.", r"press (&|and) hold|px-captcha", ErrorKind::Captcha),
    ("walmart.", r"robot or human\?|perimeterx|blocked\.walmart", ErrorKind::BotDetection),
    ("target.", r"unusual activity|we're sorry, something went wrong", ErrorKind::BotDetection),
    ("bestbuy.", r"access denied|you don't have permission to access", ErrorKind::BotDetection),
    ("ebay.", r"pardon our interruption", ErrorKind::BotDetection),
    ("ebay.", r"please verify yourself", ErrorKind::Captcha),
    ("homedepot.", r"oops!! something went wrong|akamai", ErrorKind::BotDetection),
];

const GENERIC_PATTERNS: &[(&str, ErrorKind)] = &[
    (r"captcha|recaptcha|hcaptcha|funcaptcha|arkose", ErrorKind::Captcha),
    (
        r"checking (if the site connection is secure|your browser)|cf-browser-verification|cf-chl|challenge-platform|just a moment\.\.\.|verify you are human|ddos-guard",
        ErrorKind::BrowserVerification,
    ),
    (r"fingerprint|webdriver (detected|flag)|headless (chrome|browser) detected", ErrorKind::FingerprintDetected),
    (
        r"bot detect|automated (access|traffic|queries|requests)|unusual traffic|are you a robot|not a robot|distil_r_captcha|incapsula|datadome",
        ErrorKind::BotDetection,
    ),
    (r"too many requests|rate.?limit|slow down|quota exceeded", ErrorKind::Http429),
    (r"session (has )?(expired|timed out|invalid)|please log ?in again", ErrorKind::SessionExpired),
    (r"(log|sign) ?in required|authentication required|please (log|sign) ?in|unauthori[sz]ed", ErrorKind::AuthRequired),
    (r"proxy.{0,40}(banned|blocked|blacklisted)|ip (address )?(has been )?(banned|blocked|blacklisted)", ErrorKind::ProxyBanned),
    (r"proxy (error|authentication|connection)|tunnel connection failed|407 proxy", ErrorKind::ProxyError),
    (r"out of memory|resource limit|too many open files|target closed|browser has disconnected|page crashed", ErrorKind::ResourceLimit),
    (r"navigation timeout|timed? ?out|timeout exceeded", ErrorKind::Timeout),
    (r"unexpected token|invalid json|failed to parse|parse error|unexpected end of (json|input)", ErrorKind::ParseError),
    (r"malformed|invalid (content|response|html)|unexpected content", ErrorKind::ContentInvalid),
];

/// Vocabulary that signals a block without saying how.
static BLOCKING_VOCABULARY: Lazy<Option<Regex>> = Lazy::new(|| {
    RegexBuilder::new(r"\b(blocked|access denied|forbidden|denied|banned|suspicious|security check)\b")
        .case_insensitive(true)
        .build()
        .ok()
});

/// Thread-safe registry of site-specific and generic patterns.
#[derive(Debug)]
pub struct PatternRegistry {
    sites: RwLock<HashMap<String, Vec<ErrorPattern>>>,
    generic: Vec<ErrorPattern>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl PatternRegistry {
    /// Registry with no patterns at all.
    pub fn empty() -> Self {
        Self { sites: RwLock::new(HashMap::new()), generic: Vec::new() }
    }

    /// Registry preloaded with the built-in site and generic vocabularies.
    pub fn with_defaults() -> Self {
        let mut sites: HashMap<String, Vec<ErrorPattern>> = HashMap::new();
        for (site, pattern, kind) in DEFAULT_SITE_PATTERNS {
            if let Ok(compiled) = ErrorPattern::new(pattern, *kind) {
                sites.entry((*site).to_string()).or_default().push(compiled);
            }
        }
        let generic = GENERIC_PATTERNS
            .iter()
            .filter_map(|(pattern, kind)| ErrorPattern::new(pattern, *kind).ok())
            .collect();
        Self { sites: RwLock::new(sites), generic }
    }

    /// Appends a site-specific pattern. `site` is matched as a substring of
    /// the request hostname.
    pub fn add(&self, site: &str, pattern: &str, kind: ErrorKind) -> Result<(), regex::Error> {
        let compiled = ErrorPattern::new(pattern, kind)?;
        self.sites.write().entry(site.trim().to_ascii_lowercase()).or_default().push(compiled);
        Ok(())
    }

    /// First site-specific match for `host` across `haystacks`.
    ///
    /// Site keys are visited in lexical order so overlapping keys resolve
    /// the same way on every call.
    pub fn match_site(&self, host: &str, haystacks: &[&str]) -> Option<ErrorKind> {
        let sites = self.sites.read();
        let mut keys: Vec<&String> = sites.keys().filter(|site| host.contains(site.as_str())).collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|site| sites.get(site))
            .find_map(|patterns| first_match(patterns, haystacks))
    }

    /// First generic match across `haystacks`.
    pub fn match_generic(&self, haystacks: &[&str]) -> Option<ErrorKind> {
        first_match(&self.generic, haystacks)
    }

    /// True when any haystack contains blocking vocabulary.
    pub fn has_blocking_vocabulary(haystacks: &[&str]) -> bool {
        BLOCKING_VOCABULARY
            .as_ref()
            .is_some_and(|regex| haystacks.iter().any(|text| regex.is_match(text)))
    }

    /// Number of site-specific patterns registered for `site`.
    pub fn site_pattern_count(&self, site: &str) -> usize {
        self.sites.read().get(site).map_or(0, Vec::len)
    }
}

fn first_match(patterns: &[ErrorPattern], haystacks: &[&str]) -> Option<ErrorKind> {
    patterns
        .iter()
        .find(|pattern| haystacks.iter().any(|text| pattern.regex.is_match(text)))
        .map(|pattern| pattern.kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_compile() {
        let registry = PatternRegistry::with_defaults();
        assert_eq!(registry.generic.len(), GENERIC_PATTERNS.len());
        assert_eq!(registry.site_pattern_count("amazon."), 3);
    }

    #[test]
    fn site_patterns_only_apply_to_matching_hosts() {
        let registry = PatternRegistry::with_defaults();
        let body = ["Pardon Our Interruption..."];
        assert_eq!(registry.match_site("www.ebay.com", &body), Some(ErrorKind::BotDetection));
        assert_eq!(registry.match_site("amazon.com", &body), None);
    }

    #[test]
    fn generic_order_prefers_specific_kinds() {
        let registry = PatternRegistry::with_defaults();
        assert_eq!(
            registry.match_generic(&["Please solve this CAPTCHA to prove you are not a robot"]),
            Some(ErrorKind::Captcha)
        );
        assert_eq!(
            registry.match_generic(&["Your proxy IP address has been banned"]),
            Some(ErrorKind::ProxyBanned)
        );
        assert_eq!(registry.match_generic(&["Navigation timeout of 30000 ms exceeded"]), Some(ErrorKind::Timeout));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let registry = PatternRegistry::empty();
        assert!(registry.add("shop.example", "([unclosed", ErrorKind::Captcha).is_err());
        assert_eq!(registry.site_pattern_count("shop.example"), 0);
    }

    #[test]
    fn blocking_vocabulary() {
        assert!(PatternRegistry::has_blocking_vocabulary(&["Access Denied"]));
        assert!(!PatternRegistry::has_blocking_vocabulary(&["<html>price: $10</html>"]));
    }
}
