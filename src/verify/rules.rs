//! The protocol rules, one constructor per rule

use regex::Regex;

use super::{normalize_header_value, Check};
use crate::error::{AssertionFailure, Verdict};
use crate::protocol::{parse_frames, InfoDocument, SockJsFrame};

/// The only acceptable `Cache-Control` for uncacheable responses
pub const NOT_CACHED: &str = "no-store, no-cache, no-transform, must-revalidate, max-age=0";

/// Minimum `max-age` (and `Access-Control-Max-Age`) on preflight answers
pub const PREFLIGHT_MAX_AGE: u64 = 1_000_000;

const ABSENT: &str = "<absent>";

fn shown(value: Option<&str>) -> String {
    match value {
        Some(v) => format!("{:?}", v),
        None => ABSENT.to_string(),
    }
}

fn body_shown(body: &[u8]) -> String {
    const LIMIT: usize = 120;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() > LIMIT {
        let cut: String = text.chars().take(LIMIT).collect();
        format!("{:?}... ({} bytes)", cut, body.len())
    } else {
        format!("{:?}", text)
    }
}

pub fn expect_status(code: u16) -> Check {
    Check::rule("status", move |resp| {
        if resp.status() == code {
            Ok(())
        } else {
            Err(AssertionFailure::new(
                "status",
                code.to_string(),
                resp.status().to_string(),
            ))
        }
    })
}

pub fn expect_status_one_of(codes: &[u16]) -> Check {
    let codes = codes.to_vec();
    Check::rule("status", move |resp| {
        if codes.contains(&resp.status()) {
            Ok(())
        } else {
            Err(AssertionFailure::new(
                "status",
                format!("one of {:?}", codes),
                resp.status().to_string(),
            ))
        }
    })
}

pub fn expect_no_body() -> Check {
    Check::rule("body", |resp| {
        if resp.body().is_empty() {
            Ok(())
        } else {
            Err(AssertionFailure::new("body", "empty", body_shown(resp.body())))
        }
    })
}

pub fn expect_body_equals(expected: impl Into<Vec<u8>>) -> Check {
    let expected = expected.into();
    Check::rule("body", move |resp| {
        if resp.body() == expected.as_slice() {
            Ok(())
        } else {
            Err(AssertionFailure::new(
                "body",
                body_shown(&expected),
                body_shown(resp.body()),
            ))
        }
    })
}

/// Body (as lossy UTF-8) matches `pattern`. An invalid pattern fails every
/// response.
pub fn expect_body_matches(pattern: &str) -> Check {
    let compiled = Regex::new(pattern).map_err(|e| e.to_string());
    let pattern = pattern.to_string();
    Check::rule("body", move |resp| match &compiled {
        Ok(re) if re.is_match(&resp.text()) => Ok(()),
        Ok(_) => Err(AssertionFailure::new(
            "body",
            format!("match /{}/", pattern),
            body_shown(resp.body()),
        )),
        Err(e) => Err(AssertionFailure::new(
            "body",
            format!("valid pattern /{}/", pattern),
            e.clone(),
        )),
    })
}

pub fn expect_header(name: &str) -> Check {
    let name = name.to_ascii_lowercase();
    Check::rule(name.clone(), move |resp| {
        if resp.headers().contains(&name) {
            Ok(())
        } else {
            Err(AssertionFailure::new(name.as_str(), "present", ABSENT))
        }
    })
}

pub fn expect_no_header(name: &str) -> Check {
    let name = name.to_ascii_lowercase();
    Check::rule(name.clone(), move |resp| match resp.header(&name) {
        None => Ok(()),
        Some(value) => Err(AssertionFailure::new(name.as_str(), ABSENT, shown(Some(value)))),
    })
}

/// Header present with `value`, compared after normalization
pub fn expect_header_value(name: &str, value: &str) -> Check {
    let name = name.to_ascii_lowercase();
    let expected = normalize_header_value(value);
    Check::rule(name.clone(), move |resp| {
        let observed = resp.header(&name);
        if observed.map(normalize_header_value).as_deref() == Some(expected.as_str()) {
            Ok(())
        } else {
            Err(AssertionFailure::new(
                name.as_str(),
                format!("{:?}", expected),
                shown(observed),
            ))
        }
    })
}

pub fn expect_content_type(value: &str) -> Check {
    expect_header_value("content-type", value)
}

pub fn expect_no_cookie() -> Check {
    Check::rule("set-cookie", |resp| {
        let all = resp.headers().get_all("set-cookie");
        if all.is_empty() {
            Ok(())
        } else {
            Err(AssertionFailure::new("set-cookie", ABSENT, all.join(" | ")))
        }
    })
}

pub fn expect_cookie(name: &str) -> Check {
    let name = name.to_string();
    Check::rule("set-cookie", move |resp| {
        if resp.cookie(&name).is_some() {
            Ok(())
        } else {
            Err(AssertionFailure::new(
                "set-cookie",
                format!("cookie {}", name),
                shown(resp.header("set-cookie")),
            ))
        }
    })
}

pub fn expect_cookie_value(name: &str, value: &str) -> Check {
    let name = name.to_string();
    let value = value.to_string();
    Check::rule("set-cookie", move |resp| match resp.cookie(&name) {
        Some(cookie) if cookie.value == value => Ok(()),
        found => Err(AssertionFailure::new(
            "set-cookie",
            format!("{}={}", name, value),
            found
                .map(|c| format!("{}={}", c.name, c.value))
                .unwrap_or_else(|| ABSENT.to_string()),
        )),
    })
}

fn max_age(cache_control: &str) -> Option<u64> {
    normalize_header_value(cache_control)
        .split(',')
        .find_map(|token| token.strip_prefix("max-age="))
        .and_then(|age| age.parse().ok())
}

/// `Cache-Control: public` with `max-age` of at least `min_max_age`, and an
/// `Expires` header; its date is not interpreted
pub fn expect_cacheable(min_max_age: u64) -> Check {
    let public = Check::rule("cache-control", |resp| {
        let value = resp.header("cache-control");
        let normalized = value.map(normalize_header_value).unwrap_or_default();
        if normalized.split(',').any(|token| token == "public") {
            Ok(())
        } else {
            Err(AssertionFailure::new("cache-control", "public", shown(value)))
        }
    });

    let age = Check::rule("max-age", move |resp| {
        let value = resp.header("cache-control");
        match value.and_then(max_age) {
            Some(age) if age >= min_max_age => Ok(()),
            _ => Err(AssertionFailure::new(
                "max-age",
                format!(">= {}", min_max_age),
                shown(value),
            )),
        }
    });

    let expires = expect_header("expires");

    Check::empty("cacheable").and(public).and(age).and(expires)
}

/// Exactly the uncacheable `Cache-Control`, no `Expires`, no `Last-Modified`
pub fn expect_not_cached() -> Check {
    Check::empty("not_cached")
        .and(expect_header_value("cache-control", NOT_CACHED))
        .and(expect_no_header("expires"))
        .and(expect_no_header("last-modified"))
}

/// What a CORS-aware response must carry for a given request origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorsExpectation {
    pub origin: Option<String>,
    pub allowed_methods: Vec<String>,
}

impl CorsExpectation {
    pub fn new(origin: Option<&str>) -> Self {
        Self {
            origin: origin.map(str::to_string),
            allowed_methods: Vec::new(),
        }
    }

    pub fn with_methods(mut self, methods: &[&str]) -> Self {
        self.allowed_methods = methods.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn check(&self) -> Check {
        let mut check = match &self.origin {
            Some(origin) => Check::empty("cors")
                .and(expect_header_value("access-control-allow-origin", origin))
                .and(expect_header_value("access-control-allow-credentials", "true")),
            None => Check::empty("cors")
                .and(expect_header_value("access-control-allow-origin", "*"))
                .and(expect_no_header("access-control-allow-credentials")),
        };
        if !self.allowed_methods.is_empty() {
            check = check.and(allow_methods(self.allowed_methods.clone()));
        }
        check
    }
}

fn allow_methods(methods: Vec<String>) -> Check {
    Check::rule("access-control-allow-methods", move |resp| {
        let value = resp.header("access-control-allow-methods");
        let listed = value.map(normalize_header_value).unwrap_or_default();
        let listed: Vec<&str> = listed.split(',').collect();
        let missing: Vec<&str> = methods
            .iter()
            .map(String::as_str)
            .filter(|m| !listed.iter().any(|l| l.eq_ignore_ascii_case(m)))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(AssertionFailure::new(
                "access-control-allow-methods",
                format!("lists {}", methods.join(", ")),
                shown(value),
            ))
        }
    })
}

pub fn expect_cors(origin: Option<&str>) -> Check {
    CorsExpectation::new(origin).check()
}

/// The full OPTIONS contract: 200/204, cacheable for a long time, long
/// `Access-Control-Max-Age`, every method allowed, no body, CORS headers
pub fn expect_options_preflight(allowed_methods: &[&str], origin: Option<&str>) -> Check {
    let acma = Check::rule("access-control-max-age", |resp| {
        let value = resp.header("access-control-max-age");
        match value.and_then(|v| v.trim().parse::<u64>().ok()) {
            Some(age) if age > PREFLIGHT_MAX_AGE => Ok(()),
            _ => Err(AssertionFailure::new(
                "access-control-max-age",
                format!("> {}", PREFLIGHT_MAX_AGE),
                shown(value),
            )),
        }
    });

    Check::empty("preflight")
        .and(expect_status_one_of(&[200, 204]))
        .and(expect_cacheable(PREFLIGHT_MAX_AGE))
        .and(acma)
        .and(
            CorsExpectation::new(origin)
                .with_methods(allowed_methods)
                .check(),
        )
        .and(expect_no_body())
}

/// Method not allowed: 405, an absent or empty content type, a non-empty
/// `Allow`, no body
pub fn expect_405() -> Check {
    let content_type = Check::rule("content-type", |resp| match resp.header("content-type") {
        Some(value) if !value.is_empty() => Err(AssertionFailure::new(
            "content-type",
            "absent or empty",
            shown(Some(value)),
        )),
        _ => Ok(()),
    });
    let allow = Check::rule("allow", |resp| match resp.header("allow") {
        Some(value) if !value.trim().is_empty() => Ok(()),
        other => Err(AssertionFailure::new("allow", "non-empty", shown(other))),
    });
    Check::empty("405")
        .and(expect_status(405))
        .and(content_type)
        .and(allow)
        .and(expect_no_body())
}

/// Not found; the body is unconstrained
pub fn expect_404() -> Check {
    expect_status(404).labelled("404")
}

/// Body is exactly the given newline-terminated frames
pub fn expect_frames(frames: &[SockJsFrame]) -> Check {
    let expected = frames.to_vec();
    Check::rule("frames", move |resp| {
        let text = resp.text();
        match parse_frames(&text) {
            Ok(frames) if frames == expected => Ok(()),
            Ok(frames) => Err(AssertionFailure::new(
                "frames",
                render_frames(&expected),
                render_frames(&frames),
            )),
            Err(e) => Err(AssertionFailure::new(
                "frames",
                render_frames(&expected),
                e.to_string(),
            )),
        }
    })
}

pub fn expect_frame(frame: SockJsFrame) -> Check {
    expect_frames(&[frame])
}

fn render_frames(frames: &[SockJsFrame]) -> String {
    let rendered: Vec<String> = frames.iter().map(SockJsFrame::encode).collect();
    format!("{:?}", rendered)
}

/// Body is an `/info` document satisfying `predicate`
pub fn expect_json_info<F>(predicate: F) -> Check
where
    F: Fn(&InfoDocument) -> Verdict + Send + Sync + 'static,
{
    Check::rule("info", move |resp| match InfoDocument::parse(resp.body()) {
        Ok(info) => predicate(&info),
        Err(e) => Err(AssertionFailure::new(
            "info",
            "JSON info document",
            format!("{} in {}", e, body_shown(resp.body())),
        )),
    })
}
