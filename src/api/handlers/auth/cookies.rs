//! Cookie serialization and parsing with the security attributes the session
//! layer relies on: path scoping, `HttpOnly`, `Secure`, and session versus
//! persistent expiry.

use axum::http::{HeaderMap, HeaderValue, header::COOKIE, header::SET_COOKIE};
use chrono::{DateTime, Utc};

/// Attributes attached to an outgoing cookie.
///
/// A cookie without `expires` and `max_age` is a session cookie, discarded
/// when the browser closes.
#[derive(Clone, Debug, Default)]
pub(crate) struct CookieAttributes {
    pub(crate) path: String,
    pub(crate) expires: Option<DateTime<Utc>>,
    pub(crate) max_age: Option<i64>,
    pub(crate) http_only: bool,
    pub(crate) secure: bool,
}

/// Serialize a `Set-Cookie` value.
pub(crate) fn serialize(name: &str, value: &str, attrs: &CookieAttributes) -> String {
    let mut cookie = format!("{name}={value}; Path={}; SameSite=Lax", attrs.path);
    if let Some(max_age) = attrs.max_age {
        cookie.push_str(&format!("; Max-Age={max_age}"));
    }
    if let Some(expires) = attrs.expires {
        cookie.push_str(&format!(
            "; Expires={}",
            expires.format("%a, %d %b %Y %H:%M:%S GMT")
        ));
    }
    if attrs.http_only {
        cookie.push_str("; HttpOnly");
    }
    if attrs.secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Append a `Set-Cookie` header, keeping any already present.
pub(crate) fn set(headers: &mut HeaderMap, name: &str, value: &str, attrs: &CookieAttributes) {
    if let Ok(header) = HeaderValue::from_str(&serialize(name, value, attrs)) {
        headers.append(SET_COOKIE, header);
    }
}

/// Read a cookie value from the request `Cookie` header.
pub(crate) fn get(headers: &HeaderMap, name: &str) -> Option<String> {
    let header = headers.get(COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == name {
            return Some(val.trim().to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use chrono::TimeZone;

    fn attrs(path: &str) -> CookieAttributes {
        CookieAttributes {
            path: path.to_string(),
            expires: None,
            max_age: None,
            http_only: true,
            secure: false,
        }
    }

    #[test]
    fn session_cookie_has_no_expiry() {
        let cookie = serialize("refresh", "value", &attrs("/login"));
        assert_eq!(cookie, "refresh=value; Path=/login; SameSite=Lax; HttpOnly");
        assert!(!cookie.contains("Expires"));
        assert!(!cookie.contains("Max-Age"));
    }

    #[test]
    fn persistent_cookie_formats_expires_as_http_date() {
        let mut attrs = attrs("/oauth");
        attrs.expires = Some(Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap());
        attrs.secure = true;
        let cookie = serialize("access", "value", &attrs);
        assert!(cookie.contains("Expires=Sun, 06 Nov 1994 08:49:37 GMT"));
        assert!(cookie.ends_with("; Secure"));
    }

    #[test]
    fn deletion_cookie_carries_max_age_zero() {
        let mut attrs = attrs("/login");
        attrs.max_age = Some(0);
        let cookie = serialize("refresh", "", &attrs);
        assert!(cookie.contains("Max-Age=0"));
    }

    #[test]
    fn set_appends_without_clobbering() {
        let mut headers = HeaderMap::new();
        set(&mut headers, "a", "1", &attrs("/"));
        set(&mut headers, "b", "2", &attrs("/"));
        assert_eq!(headers.get_all(SET_COOKIE).iter().count(), 2);
    }

    #[test]
    fn get_finds_cookie_among_many() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("state=abc; refresh=def; access=ghi"),
        );
        assert_eq!(get(&headers, "refresh"), Some("def".to_string()));
        assert_eq!(get(&headers, "state"), Some("abc".to_string()));
        assert_eq!(get(&headers, "missing"), None);
    }
}
