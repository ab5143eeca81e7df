use axum::http::{header, HeaderMap};
use time::Duration;

/// Name of the session cookie carrying the signed token.
pub const SESSION_COOKIE: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SameSite {
    Strict,
    #[default]
    Lax,
    None,
}

impl SameSite {
    pub fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Session-cookie flags. Max-Age tracks the token TTL so the cookie and the
/// token it carries expire together.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    pub secure: bool,
    pub same_site: SameSite,
    pub max_age: Duration,
}

impl CookieOptions {
    pub fn new(secure: bool, max_age: Duration) -> Self {
        Self {
            secure,
            same_site: SameSite::default(),
            max_age,
        }
    }

    /// Build the `Set-Cookie` value delivering a fresh session token.
    pub fn session(&self, token: &str) -> String {
        let mut cookie = format!("{}={}; HttpOnly", SESSION_COOKIE, token);
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie.push_str(&format!("; SameSite={}", self.same_site.as_str()));
        cookie.push_str("; Path=/");
        cookie.push_str(&format!("; Max-Age={}", self.max_age.whole_seconds()));
        cookie
    }
}

/// `Set-Cookie` value that clears the session cookie (already-expired).
pub fn expired() -> String {
    format!("{}=; HttpOnly; Path=/; Max-Age=0", SESSION_COOKIE)
}

/// Pull a cookie value out of the request headers.
pub fn extract(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(header::COOKIE)?
        .to_str()
        .ok()?
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn session_cookie_carries_flags() {
        let opts = CookieOptions::new(true, Duration::minutes(60));
        let cookie = opts.session("abc123");
        assert!(cookie.starts_with("token=abc123"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("Secure"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=3600"));
    }

    #[test]
    fn insecure_config_omits_secure_flag() {
        let opts = CookieOptions::new(false, Duration::minutes(1));
        assert!(!opts.session("t").contains("Secure"));
    }

    #[test]
    fn expired_cookie_clears_value() {
        let cookie = expired();
        assert!(cookie.starts_with("token=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn extract_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; token=abc123; lang=en"),
        );
        assert_eq!(extract(&headers, "token").as_deref(), Some("abc123"));
        assert_eq!(extract(&headers, "missing"), None);
    }
}
