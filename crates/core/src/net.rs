//! URL helpers shared by the services

use url::Url;

/// Lowercased host of `input` with a leading `www.` removed.
///
/// Returns `None` when `input` is not an absolute URL with a host.
pub fn domain_from_url(input: &str) -> Option<String> {
    let parsed = Url::parse(input.trim()).ok()?;
    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return None;
    }
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

/// Domain for `input`, or `fallback` when it does not parse.
pub fn domain_or(input: &str, fallback: &str) -> String {
    domain_from_url(input).unwrap_or_else(|| fallback.to_string())
}

/// Longest prefix of `s` that is at most `max` bytes and ends on a char
/// boundary.
pub(crate) fn truncate_on_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_www_and_lowercases() {
        assert_eq!(domain_from_url("https://WWW.Amazon.com/dp/B01").as_deref(), Some("amazon.com"));
        assert_eq!(domain_from_url("http://shop.walmart.com:8080/x").as_deref(), Some("shop.walmart.com"));
    }

    #[test]
    fn rejects_non_urls() {
        assert_eq!(domain_from_url("B01N5IB20Q"), None);
        assert_eq!(domain_from_url("/relative/path"), None);
        assert_eq!(domain_or("not a url", "default"), "default");
    }

    #[test]
    fn truncation_respects_utf8() {
        let s = "añb";
        assert_eq!(truncate_on_char_boundary(s, 2), "a");
        assert_eq!(truncate_on_char_boundary(s, 3), "añ");
        assert_eq!(truncate_on_char_boundary(s, 10), s);
    }
}
