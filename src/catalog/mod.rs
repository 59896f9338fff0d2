//! The conformance suite
//!
//! Each submodule contributes the scenarios for one area of the protocol.
//! Session ids are drawn fresh when the catalog is built, so two scenarios
//! never share a session.

mod base;
mod cookies;
mod iframe;
mod info;
mod polling;
mod session;
mod streaming;
mod websocket;

use crate::config::Config;
use crate::endpoint::Endpoints;
use crate::error::AssertionFailure;
use crate::scenario::Scenario;
use crate::verify::{expect_options_preflight, Findings};

pub const PLAIN: &str = "text/plain;charset=UTF-8";
pub const HTML: &str = "text/html;charset=UTF-8";
pub const JSON: &str = "application/json;charset=UTF-8";
pub const JAVASCRIPT: &str = "application/javascript;charset=UTF-8";
pub const EVENT_STREAM: &str = "text/event-stream;charset=UTF-8";

/// Origins every preflight is tried with
pub const ORIGINS: [&str; 2] = ["test", "null"];

/// Every scenario, in run order
pub fn all(config: &Config, endpoints: &Endpoints) -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    scenarios.extend(base::scenarios(endpoints));
    scenarios.extend(iframe::scenarios(endpoints));
    scenarios.extend(info::scenarios(endpoints));
    scenarios.extend(session::scenarios(config, endpoints));
    scenarios.extend(polling::scenarios(endpoints));
    scenarios.extend(streaming::scenarios(endpoints));
    scenarios.extend(websocket::scenarios(endpoints));
    scenarios.extend(cookies::scenarios(endpoints));
    scenarios
}

/// Scenarios whose name contains `filter` (case-insensitive)
pub fn filtered(config: &Config, endpoints: &Endpoints, filter: Option<&str>) -> Vec<Scenario> {
    let scenarios = all(config, endpoints);
    match filter {
        Some(filter) => scenarios.into_iter().filter(|s| s.matches(filter)).collect(),
        None => scenarios,
    }
}

/// One OPTIONS step per origin, each held to the full preflight contract.
/// `methods` is sent verbatim as `Access-Control-Request-Method`.
fn preflight(scenario: Scenario, url: &str, methods: &str) -> Scenario {
    let allowed: Vec<&str> = methods.split(',').map(str::trim).collect();
    ORIGINS.iter().fold(scenario, |scenario, origin| {
        scenario.options(
            url,
            &[("Access-Control-Request-Method", methods), ("Origin", origin)],
            expect_options_preflight(&allowed, Some(origin)),
        )
    })
}

/// Compare a streamed read against the exact expected text
fn expect_read(findings: &mut Findings, rule: &str, expected: &str, read: Option<Vec<u8>>) {
    match read {
        Some(bytes) if bytes == expected.as_bytes() => {}
        Some(bytes) => findings.push(AssertionFailure::new(
            rule,
            format!("{:?}", expected),
            format!("{:?}", String::from_utf8_lossy(&bytes)),
        )),
        None => findings.push(AssertionFailure::new(
            rule,
            format!("{:?}", expected),
            "nothing before timeout or end of body",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn catalog() -> Vec<Scenario> {
        let config = Config::default();
        let endpoints = Endpoints::from_root("http://localhost:8081").unwrap();
        all(&config, &endpoints)
    }

    #[test]
    fn test_names_are_unique() {
        let scenarios = catalog();
        let names: HashSet<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), scenarios.len());
    }

    #[test]
    fn test_every_scenario_has_steps() {
        for scenario in catalog() {
            assert!(!scenario.steps().is_empty(), "{} is empty", scenario.name);
            assert!(!scenario.description.is_empty(), "{} lacks a description", scenario.name);
        }
    }

    #[test]
    fn test_filter() {
        let config = Config::default();
        let endpoints = Endpoints::from_root("http://localhost:8081").unwrap();
        let greeting = filtered(&config, &endpoints, Some("greeting"));
        assert!(!greeting.is_empty());
        assert!(greeting.iter().all(|s| s.name.contains("greeting")));
        assert_eq!(
            filtered(&config, &endpoints, None).len(),
            all(&config, &endpoints).len()
        );
    }

    #[test]
    fn test_preflight_adds_step_per_origin() {
        let scenario = preflight(Scenario::new("p", ""), "http://h/echo/info", "OPTIONS, GET");
        assert_eq!(scenario.steps().len(), ORIGINS.len());
    }

    #[test]
    fn test_expect_read() {
        let mut findings = Findings::new();
        expect_read(&mut findings, "open", "o\n", Some(b"o\n".to_vec()));
        expect_read(&mut findings, "open", "o\n", Some(b"h\n".to_vec()));
        expect_read(&mut findings, "open", "o\n", None);
        assert_eq!(findings.len(), 2);
    }
}
