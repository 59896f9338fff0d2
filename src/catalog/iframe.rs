//! The hidden iframe page used for cross-domain transports

use super::HTML;
use crate::endpoint::Endpoints;
use crate::http::ProbeRequest;
use crate::scenario::Scenario;
use crate::verify::{
    each, expect_404, expect_body_matches, expect_cacheable, expect_content_type, expect_header,
    expect_no_body, expect_no_cookie, expect_no_header, expect_status, Check, Findings,
};

/// Page body; the script URL is server-chosen
const IFRAME_PATTERN: &str = concat!(
    r#"^<!DOCTYPE html>\n<html>\n<head>\n"#,
    r#"  <meta http-equiv="X-UA-Compatible" content="IE=edge" />\n"#,
    r#"  <meta http-equiv="Content-Type" content="text/html; charset=UTF-8" />\n"#,
    r#"  <script>\n    document.domain = document.domain;\n"#,
    r#"    _sockjs_onload = function\(\)\{SockJS.bootstrap_iframe\(\);\};\n  </script>\n"#,
    r#"  <script src="[^"]*"></script>\n</head>\n<body>\n"#,
    r#"  <h2>Don't panic!</h2>\n"#,
    r#"  <p>This is a SockJS hidden iframe. It's used for cross domain magic.</p>\n"#,
    r#"</body>\n</html>$"#,
);

const VERSIONED: [&str; 4] = [
    "/iframe-a.html",
    "/iframe-.html",
    "/iframe-0.1.2.html",
    "/iframe-0.1.2abc-dirty.2144.html",
];

const QUERIED: [&str; 3] = [
    "/iframe-a.html?t=1234",
    "/iframe-0.1.2.html?t=123414",
    "/iframe-0.1.2abc-dirty.2144.html?t=qweqweq123",
];

const INVALID: [&str; 7] = [
    "/iframe.htm",
    "/iframe",
    "/IFRAME.HTML",
    "/IFRAME",
    "/iframe.HTML",
    "/iframe.xml",
    "/iframe-/.html",
];

/// A valid iframe page: HTML, long-lived cache, no cookie
pub fn iframe_page() -> Check {
    Check::empty("iframe")
        .and(expect_status(200))
        .and(expect_content_type(HTML))
        .and(expect_cacheable(1_000_000))
        .and(expect_no_header("last-modified"))
        .and(expect_header("etag"))
        .and(expect_body_matches(IFRAME_PATTERN))
        .and(expect_no_cookie())
}

fn each_url(scenario: Scenario, endpoints: &Endpoints, suffixes: &[&str], check: Check) -> Scenario {
    scenario.concurrent(
        suffixes
            .iter()
            .map(|suffix| ProbeRequest::get(endpoints.echo.url(suffix)))
            .collect(),
        vec![each(check)],
    )
}

pub(super) fn scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let simple = Scenario::new("iframe/simple", "iframe.html is served and cacheable")
        .get(&endpoints.echo.url("/iframe.html"), iframe_page());

    let versioned = each_url(
        Scenario::new("iframe/versioned", "versioned iframe names are served"),
        endpoints,
        &VERSIONED,
        iframe_page(),
    );

    let queried = each_url(
        Scenario::new("iframe/queried", "query strings on iframe URLs are ignored"),
        endpoints,
        &QUERIED,
        iframe_page(),
    );

    let invalid = each_url(
        Scenario::new("iframe/invalid", "near-miss iframe names are 404"),
        endpoints,
        &INVALID,
        expect_404(),
    );

    let url = endpoints.echo.url("/iframe.html");
    let cacheability = Scenario::new(
        "iframe/etag",
        "the ETag is stable and If-None-Match gives 304",
    )
    .interact("etag round trip", move |ctx| {
        let url = url.clone();
        async move {
            let mut findings = Findings::new();
            let first = ctx.http.get(&url, &[]).await?;
            let second = ctx.http.get(&url, &[]).await?;
            let etag = first.header("etag").unwrap_or_default().to_string();
            findings.expect(!etag.is_empty(), "etag", "present", "<absent>");
            findings.expect_eq("etag/stable", Some(etag.as_str()), second.header("etag"));

            let cached = ctx.http.get(&url, &[("If-None-Match", etag.as_str())]).await?;
            findings.check(
                &Check::empty("if-none-match")
                    .and(expect_status(304))
                    .and(expect_no_header("content-type"))
                    .and(expect_no_body()),
                &cached,
            );
            Ok(findings)
        }
    });

    vec![simple, versioned, queried, invalid, cacheability]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{Headers, NormalizedResponse};

    const PAGE: &str = "<!DOCTYPE html>\n<html>\n<head>\n  <meta http-equiv=\"X-UA-Compatible\" content=\"IE=edge\" />\n  <meta http-equiv=\"Content-Type\" content=\"text/html; charset=UTF-8\" />\n  <script>\n    document.domain = document.domain;\n    _sockjs_onload = function(){SockJS.bootstrap_iframe();};\n  </script>\n  <script src=\"https://cdn.example/sockjs.min.js\"></script>\n</head>\n<body>\n  <h2>Don't panic!</h2>\n  <p>This is a SockJS hidden iframe. It's used for cross domain magic.</p>\n</body>\n</html>";

    #[test]
    fn test_iframe_check_accepts_reference_page() {
        let headers: Headers = [
            ("Content-Type", "text/html; charset=UTF-8"),
            ("Cache-Control", "public, max-age=31536000"),
            ("Expires", "Fri, 15 Oct 2027 08:00:00 GMT"),
            ("ETag", "\"abc\""),
        ]
        .into_iter()
        .collect();
        let resp = NormalizedResponse::new(200, headers, PAGE.as_bytes().to_vec());
        assert_eq!(iframe_page().evaluate(&resp), vec![]);
    }
}
