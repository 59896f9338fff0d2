//! Greeting and not-found pages under the base URL

use super::PLAIN;
use crate::endpoint::Endpoints;
use crate::http::ProbeRequest;
use crate::protocol::GREETING;
use crate::scenario::Scenario;
use crate::verify::{
    each, expect_404, expect_body_equals, expect_content_type, expect_no_cookie, expect_status,
    Check,
};

/// Suffixes that must not match any route
pub const NOT_FOUND_SUFFIXES: [&str; 7] = ["/a", "/a.html", "//", "///", "/a/a", "/a/a/", "/a/"];

pub fn greeting() -> Check {
    Check::empty("greeting")
        .and(expect_status(200))
        .and(expect_content_type(PLAIN))
        .and(expect_body_equals(GREETING))
        .and(expect_no_cookie())
}

pub(super) fn scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let echo = &endpoints.echo;

    let greeting_scenario = Scenario::new(
        "base/greeting",
        "base URL with and without a trailing slash serves the greeting",
    )
    .get(echo.base_url(), greeting())
    .get(&echo.url("/"), greeting());

    let not_found = Scenario::new("base/not_found", "other paths under the base URL are 404")
        .concurrent(
            NOT_FOUND_SUFFIXES
                .iter()
                .map(|suffix| ProbeRequest::get(echo.url(suffix)))
                .collect(),
            vec![each(expect_404())],
        );

    vec![greeting_scenario, not_found]
}
