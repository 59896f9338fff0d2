//! Cookies and the per-scenario cookie jar
//!
//! Manual cookie handling: the jar is passed explicitly to each probe, never
//! installed into the HTTP client, so a scenario decides which requests share
//! cookies.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// One cookie as set by a `Set-Cookie` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// Lowercased attribute name -> value (empty for flags like `HttpOnly`)
    pub attributes: BTreeMap<String, String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Parse a `Set-Cookie` header value. Returns `None` without a `name=value` pair.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let mut parts = header.split(';').map(str::trim);
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name, value.trim());
        for attr in parts.filter(|p| !p.is_empty()) {
            let (key, val) = match attr.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (attr, ""),
            };
            cookie
                .attributes
                .insert(key.to_ascii_lowercase(), val.to_string());
        }
        Some(cookie)
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `Path` attribute, `/` when absent
    pub fn path(&self) -> &str {
        self.attribute("path").unwrap_or("/")
    }

    /// Server asked for deletion via `Max-Age=0` (or negative)
    pub fn is_removal(&self) -> bool {
        self.attribute("max-age")
            .and_then(|v| v.parse::<i64>().ok())
            .map(|age| age <= 0)
            .unwrap_or(false)
    }
}

/// Cookie jar shared by reference between the steps of one scenario
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    cookies: Arc<Mutex<Vec<Cookie>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by name; removal cookies delete the entry
    pub fn store(&self, cookie: Cookie) {
        let mut cookies = self.cookies.lock();
        cookies.retain(|c| c.name != cookie.name);
        if !cookie.is_removal() {
            cookies.push(cookie);
        }
    }

    pub fn store_all<'a>(&self, cookies: impl IntoIterator<Item = &'a Cookie>) {
        for cookie in cookies {
            self.store(cookie.clone());
        }
    }

    pub fn get(&self, name: &str) -> Option<Cookie> {
        self.cookies.lock().iter().find(|c| c.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.cookies.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cookies.lock().clear();
    }

    /// Value for a `Cookie` request header, or `None` when empty
    pub fn header_value(&self) -> Option<String> {
        let cookies = self.cookies.lock();
        if cookies.is_empty() {
            return None;
        }
        Some(
            cookies
                .iter()
                .map(|c| format!("{}={}", c.name, c.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_cookie_with_attributes() {
        let cookie = Cookie::parse_set_cookie("JSESSIONID=dummy; Path=/; HttpOnly").unwrap();
        assert_eq!(cookie.name, "JSESSIONID");
        assert_eq!(cookie.value, "dummy");
        assert_eq!(cookie.path(), "/");
        assert_eq!(cookie.attribute("httponly"), Some(""));
        assert_eq!(cookie.attribute("HttpOnly"), Some(""));
    }

    #[test]
    fn test_parse_set_cookie_compact_form() {
        let cookie = Cookie::parse_set_cookie("JSESSIONID=abcdef;path=/").unwrap();
        assert_eq!(cookie.value, "abcdef");
        assert_eq!(cookie.attribute("path"), Some("/"));
    }

    #[test]
    fn test_parse_set_cookie_rejects_garbage() {
        assert!(Cookie::parse_set_cookie("novalue").is_none());
        assert!(Cookie::parse_set_cookie("=value").is_none());
        assert!(Cookie::parse_set_cookie("").is_none());
    }

    #[test]
    fn test_jar_replaces_by_name() {
        let jar = CookieJar::new();
        jar.store(Cookie::new("a", "1"));
        jar.store(Cookie::new("b", "2"));
        jar.store(Cookie::new("a", "3"));
        assert_eq!(jar.len(), 2);
        assert_eq!(jar.get("a").unwrap().value, "3");
        assert_eq!(jar.header_value().unwrap(), "b=2; a=3");
    }

    #[test]
    fn test_jar_removal_cookie() {
        let jar = CookieJar::new();
        jar.store(Cookie::new("a", "1"));
        jar.store(Cookie::parse_set_cookie("a=; Max-Age=0").unwrap());
        assert!(jar.is_empty());
        assert!(jar.header_value().is_none());
    }

    #[test]
    fn test_jar_clones_share_state() {
        let jar = CookieJar::new();
        let other = jar.clone();
        other.store(Cookie::new("JSESSIONID", "x"));
        assert_eq!(jar.get("JSESSIONID").unwrap().value, "x");
    }
}
