//! URL utilities for consistent URL handling
//!
//! Portal locations are typed by humans into a profile form, so they arrive
//! in many shapes. These helpers normalize them and keep credentials out of
//! log lines.

use regex::Regex;
use url::Url;

/// Canonical portal endpoint appended to bare hosts and directories.
pub const CANONICAL_PORTAL_PATH: &str = "/portal.php";

/// URL utilities for consistent URL handling
pub struct UrlUtils;

impl UrlUtils {
    /// Normalize URL scheme by ensuring it has a proper HTTP/HTTPS prefix
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stalker_relay::utils::url::UrlUtils;
    ///
    /// assert_eq!(UrlUtils::normalize_scheme("example.com"), "http://example.com");
    /// assert_eq!(UrlUtils::normalize_scheme("https://example.com"), "https://example.com");
    /// ```
    pub fn normalize_scheme(url: &str) -> String {
        let trimmed = url.trim();
        let lower = trimmed.to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            trimmed.to_string()
        } else {
            format!("http://{trimmed}")
        }
    }

    /// Normalize a user supplied portal location to the canonical
    /// `portal.php` endpoint.
    ///
    /// - a bare host or `/` becomes `/portal.php`
    /// - `.../load.php` becomes `.../portal.php`
    /// - any other `.php` endpoint is replaced by `/portal.php`
    /// - a directory gets `portal.php` appended
    ///
    /// Returns an empty string for empty input. Unparseable input is returned
    /// with its scheme normalized so validation can report it.
    pub fn normalize_portal_url(input: &str) -> String {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return String::new();
        }

        let with_scheme = Self::normalize_scheme(trimmed);
        let mut parsed = match Url::parse(&with_scheme) {
            Ok(parsed) => parsed,
            Err(_) => return with_scheme,
        };

        let mut path = parsed.path().trim().to_string();
        if path.is_empty() || path == "/" {
            path = CANONICAL_PORTAL_PATH.to_string();
        }

        let lower = path.to_ascii_lowercase();
        if lower.ends_with("/load.php") {
            path = format!("{}{}", &path[..path.len() - "/load.php".len()], CANONICAL_PORTAL_PATH);
        } else if lower.ends_with(".php") && !lower.ends_with(CANONICAL_PORTAL_PATH) {
            path = CANONICAL_PORTAL_PATH.to_string();
        } else if !lower.ends_with(CANONICAL_PORTAL_PATH) {
            path = format!("{}{}", path.trim_end_matches('/'), CANONICAL_PORTAL_PATH);
        }

        parsed.set_path(&path);
        parsed.to_string()
    }

    /// Scheme, host and port of a URL, without a trailing slash.
    pub fn origin(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?;
        Some(match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        })
    }

    /// Join a base URL with a relative reference
    pub fn join(base: &str, path: &str) -> Result<String, url::ParseError> {
        let base_url = Url::parse(base)?;
        let joined = base_url.join(path)?;
        Ok(joined.to_string())
    }

    /// Resolve a channel logo reference against the portal location.
    ///
    /// Absolute URLs are kept. Bare file names live in the portal's
    /// `misc/logos/320/` directory, one level above the API endpoint.
    pub fn resolve_logo_url(portal_location: &str, logo: &str) -> Option<String> {
        let logo = logo.trim();
        if logo.is_empty() {
            return None;
        }
        if Url::parse(logo).is_ok() {
            return Some(logo.to_string());
        }
        if logo.starts_with('/') {
            return Self::join(portal_location, logo).ok();
        }
        Self::join(portal_location, &format!("../misc/logos/320/{logo}")).ok()
    }

    /// Extract the host name without port from a `Host` header value.
    pub fn host_without_port(host: &str) -> &str {
        // Bracketed IPv6 literals keep their brackets
        if let Some(end) = host.find(']') {
            return &host[..=end];
        }
        host.split(':').next().unwrap_or(host)
    }

    /// Obfuscate sensitive information in URLs for safe logging
    ///
    /// Masks URL user info and credential-like query parameters, including
    /// the portal's `login`, `password` and `token` parameters.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stalker_relay::utils::url::UrlUtils;
    ///
    /// let url = "http://portal.example/portal.php?action=do_auth&login=bob&password=secret";
    /// let obfuscated = UrlUtils::obfuscate_credentials(url);
    /// assert!(!obfuscated.contains("secret"));
    /// ```
    pub fn obfuscate_credentials(url: &str) -> String {
        let mut obfuscated = url.to_string();

        if let Ok(parsed) = Url::parse(url) {
            if !parsed.username().is_empty() || parsed.password().is_some() {
                let mut new_url = parsed.clone();
                let _ = new_url.set_username("****");
                let _ = new_url.set_password(Some("****"));
                obfuscated = new_url.to_string();
            }
        }

        let sensitive_params = [
            "username", "password", "user", "pass", "pwd", "passwd", "login", "token",
        ];

        for param in &sensitive_params {
            let pattern = format!(r"(?i)([?&]{}=)[^&\s]*", regex::escape(param));
            if let Ok(re) = Regex::new(&pattern) {
                obfuscated = re.replace_all(&obfuscated, "${1}****").to_string();
            }
        }

        obfuscated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_portal_url() {
        assert_eq!(
            UrlUtils::normalize_portal_url("example.com"),
            "http://example.com/portal.php"
        );
        assert_eq!(
            UrlUtils::normalize_portal_url("http://example.com/"),
            "http://example.com/portal.php"
        );
        assert_eq!(
            UrlUtils::normalize_portal_url("http://example.com/stalker_portal/server/load.php"),
            "http://example.com/stalker_portal/server/portal.php"
        );
        assert_eq!(
            UrlUtils::normalize_portal_url("http://example.com/c/index.php"),
            "http://example.com/portal.php"
        );
        assert_eq!(
            UrlUtils::normalize_portal_url("http://example.com:8080/c/"),
            "http://example.com:8080/c/portal.php"
        );
        assert_eq!(
            UrlUtils::normalize_portal_url("HTTP://example.com/portal.php"),
            "http://example.com/portal.php"
        );
        assert_eq!(UrlUtils::normalize_portal_url("   "), "");
    }

    #[test]
    fn test_resolve_logo_url() {
        let portal = "http://example.com/stalker_portal/server/load.php";
        assert_eq!(
            UrlUtils::resolve_logo_url(portal, "123.png").as_deref(),
            Some("http://example.com/stalker_portal/misc/logos/320/123.png")
        );
        assert_eq!(
            UrlUtils::resolve_logo_url("http://example.com/portal.php", "1.png").as_deref(),
            Some("http://example.com/misc/logos/320/1.png")
        );
        assert_eq!(
            UrlUtils::resolve_logo_url(portal, "http://cdn.example/logo.png").as_deref(),
            Some("http://cdn.example/logo.png")
        );
        assert_eq!(UrlUtils::resolve_logo_url(portal, ""), None);
    }

    #[test]
    fn test_origin_and_host() {
        assert_eq!(
            UrlUtils::origin("http://example.com:8080/c/portal.php?x=1").as_deref(),
            Some("http://example.com:8080")
        );
        assert_eq!(UrlUtils::host_without_port("192.168.1.2:8001"), "192.168.1.2");
        assert_eq!(UrlUtils::host_without_port("[::1]:8001"), "[::1]");
        assert_eq!(UrlUtils::host_without_port("relay.lan"), "relay.lan");
    }

    #[test]
    fn test_obfuscate_credentials() {
        let url = "http://p.example/portal.php?type=stb&action=do_auth&login=bob&password=pw&token=ABC";
        let out = UrlUtils::obfuscate_credentials(url);
        assert!(out.contains("login=****"));
        assert!(out.contains("password=****"));
        assert!(out.contains("token=****"));
        assert!(out.contains("action=do_auth"));
    }
}
