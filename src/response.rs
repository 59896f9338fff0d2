//! Normalized responses
//!
//! Every probe (HTTP client, raw socket, failed WebSocket upgrade) ends in the
//! same immutable shape so that one set of predicates covers all of them.

use std::borrow::Cow;

use crate::cookie::Cookie;

/// Case-insensitive header map keeping every value in arrival order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        self.entries
            .push((name.trim().to_ascii_lowercase(), value.into()));
    }

    /// Last value for `name` (last-wins on duplicates)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `name`, in arrival order
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Headers::new();
        for (k, v) in iter {
            headers.append(k.as_ref(), v);
        }
        headers
    }
}

/// What a probe observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedResponse {
    status: u16,
    headers: Headers,
    body: Vec<u8>,
    cookies: Vec<Cookie>,
}

impl NormalizedResponse {
    /// Build a response; cookies are parsed from `Set-Cookie` headers
    pub fn new(status: u16, headers: Headers, body: Vec<u8>) -> Self {
        let cookies = headers
            .get_all("set-cookie")
            .into_iter()
            .filter_map(Cookie::parse_set_cookie)
            .collect();
        Self {
            status,
            headers,
            body,
            cookies,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body as text, lossy for non-UTF-8 bytes
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().rev().find(|c| c.name == name)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}
