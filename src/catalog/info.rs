//! The `/info` document

use super::{preflight, JSON};
use crate::endpoint::Endpoints;
use crate::error::AssertionFailure;
use crate::protocol::InfoDocument;
use crate::scenario::Scenario;
use crate::verify::{
    expect_content_type, expect_cors, expect_json_info, expect_no_cookie, expect_not_cached,
    expect_status, Check, Findings,
};

fn info_response(websocket: bool) -> Check {
    Check::empty("info")
        .and(expect_status(200))
        .and(expect_content_type(JSON))
        .and(expect_no_cookie())
        .and(expect_not_cached())
        .and(expect_cors(None))
        .and(expect_json_info(move |info| {
            if info.websocket != websocket {
                return Err(AssertionFailure::new(
                    "websocket",
                    websocket.to_string(),
                    info.websocket.to_string(),
                ));
            }
            if info.origins != ["*:*"] {
                return Err(AssertionFailure::new(
                    "origins",
                    r#"["*:*"]"#,
                    format!("{:?}", info.origins),
                ));
            }
            Ok(())
        }))
}

pub(super) fn scenarios(endpoints: &Endpoints) -> Vec<Scenario> {
    let info_url = endpoints.echo.url("/info");

    let basic = Scenario::new("info/basic", "/info is uncached JSON with the expected keys")
        .get(&info_url, info_response(true));

    let url = info_url.clone();
    let entropy = Scenario::new("info/entropy", "every /info carries fresh entropy").interact(
        "two info requests",
        move |ctx| {
            let url = url.clone();
            async move {
                let mut findings = Findings::new();
                let first = ctx.http.get(&url, &[]).await?;
                let second = ctx.http.get(&url, &[]).await?;
                match (
                    InfoDocument::parse(first.body()),
                    InfoDocument::parse(second.body()),
                ) {
                    (Ok(a), Ok(b)) => findings.expect(
                        a.entropy != b.entropy,
                        "entropy",
                        "two different values",
                        format!("{} twice", a.entropy),
                    ),
                    (a, b) => findings.push(AssertionFailure::new(
                        "info",
                        "two JSON documents",
                        format!("{:?} / {:?}", a.err(), b.err()),
                    )),
                }
                Ok(findings)
            }
        },
    );

    let options = preflight(
        Scenario::new("info/options", "/info answers CORS preflight"),
        &info_url,
        "OPTIONS, GET",
    );

    let disabled = Scenario::new(
        "info/disabled_websocket",
        "/info reports websocket off when the service disables it",
    )
    .get(&endpoints.wsoff.url("/info"), info_response(false));

    vec![basic, entropy, options, disabled]
}
