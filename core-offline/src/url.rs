//! URL helpers shared by the interceptor, the library and playback.
//!
//! Cache keys are exact URL strings, so every writer and reader must agree
//! on one normalized form.

use core_runtime::config::ProxyRule;

/// Prefix `url` with `default_scheme` unless it already names a scheme.
///
/// Protocol-relative URLs (`//host/path`) get the scheme too. Surrounding
/// whitespace is dropped.
pub fn normalize_url(url: &str, default_scheme: &str) -> String {
    let url = url.trim();
    if has_scheme(url) {
        return url.to_string();
    }
    match url.strip_prefix("//") {
        Some(rest) => format!("{}://{}", default_scheme, rest),
        None => format!("{}://{}", default_scheme, url),
    }
}

fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Whether the interceptor should handle `url`.
///
/// Matches on the raw URL suffix, so `a.mp3?token=x` is not audio.
pub fn is_audio_url(url: &str, extension: &str) -> bool {
    url.ends_with(extension)
}

/// URL to actually fetch for `normalized`, after the first matching proxy rule.
pub fn fetch_url(normalized: &str, rules: &[ProxyRule]) -> String {
    rules
        .iter()
        .find_map(|rule| rule.rewrite(normalized))
        .unwrap_or_else(|| normalized.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_prepends_scheme() {
        assert_eq!(
            normalize_url("media.example.net/t1.mp3", "https"),
            "https://media.example.net/t1.mp3"
        );
        assert_eq!(
            normalize_url("  //media.example.net/t1.mp3 ", "https"),
            "https://media.example.net/t1.mp3"
        );
    }

    #[test]
    fn test_normalize_keeps_existing_scheme() {
        assert_eq!(
            normalize_url("http://media.example.net/t1.mp3", "https"),
            "http://media.example.net/t1.mp3"
        );
        assert_eq!(
            normalize_url("https://media.example.net/t1.mp3", "https"),
            "https://media.example.net/t1.mp3"
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_url("media.example.net/a.mp3", "https");
        assert_eq!(normalize_url(&once, "https"), once);
    }

    #[test]
    fn test_path_containing_scheme_separator_is_not_a_scheme() {
        // "media.example.net/redirect?to" is not a valid scheme
        assert_eq!(
            normalize_url("media.example.net/redirect?to=https://x/y.mp3", "https"),
            "https://media.example.net/redirect?to=https://x/y.mp3"
        );
    }

    #[test]
    fn test_is_audio_url() {
        assert!(is_audio_url("https://media.example.net/t1.mp3", ".mp3"));
        assert!(!is_audio_url("https://media.example.net/t1.mp3?sig=1", ".mp3"));
        assert!(!is_audio_url("https://media.example.net/cover.jpg", ".mp3"));
    }

    #[test]
    fn test_fetch_url_uses_first_matching_rule() {
        let rules = vec![
            ProxyRule::new("https://api.example.net", "https://relay.example.org/proxy-audio"),
            ProxyRule::new("https://api.example.net", "https://other.example.org"),
        ];

        assert_eq!(
            fetch_url("https://api.example.net/mp3/62808.mp3", &rules),
            "https://relay.example.org/proxy-audio/mp3/62808.mp3"
        );
        assert_eq!(
            fetch_url("https://media.example.net/t1.mp3", &rules),
            "https://media.example.net/t1.mp3"
        );
    }
}
