//! Scenarios: ordered probe steps with attached checks
//!
//! A scenario is data. It owns its requests and checks, and a `Runner`
//! executes it against a fresh `ScenarioContext`:
//!
//! ```rust,ignore
//! let scenario = Scenario::new("greeting", "base URL serves the greeting")
//!     .get(endpoints.echo.base_url(), expect_status(200).and(expect_no_cookie()))
//!     .get(&endpoints.echo.url("/"), expect_status(200));
//! let report = runner.run_scenario(&scenario).await;
//! ```

mod context;
mod runner;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

pub use context::ScenarioContext;
pub use runner::{RunSummary, Runner, ScenarioReport, ScenarioState};

use crate::error::TransportError;
use crate::http::ProbeRequest;
use crate::verify::{Check, Findings, GroupCheck};

/// Free-form step body
pub type Interaction =
    Arc<dyn Fn(ScenarioContext) -> BoxFuture<'static, Result<Findings, TransportError>> + Send + Sync>;

/// One step of a scenario
#[derive(Clone)]
pub enum Step {
    /// Issue one request and run the check on its response
    Probe { request: ProbeRequest, check: Check },
    /// Launch every request at once, join them all, then run the group checks
    Concurrent {
        requests: Vec<ProbeRequest>,
        checks: Vec<GroupCheck>,
    },
    /// Real sleep, for session-timeout windows
    Pace(Duration),
    /// Anything the declarative steps cannot express (streaming reads,
    /// websocket exchanges, multi-request flows)
    Interact { label: String, run: Interaction },
}

impl Step {
    /// Short description used in logs and failure prefixes
    pub fn label(&self) -> String {
        match self {
            Step::Probe { request, .. } => format!("{} {}", request.method, request.url),
            Step::Concurrent { requests, .. } => format!("{} concurrent requests", requests.len()),
            Step::Pace(d) => format!("pace {:?}", d),
            Step::Interact { label, .. } => label.clone(),
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// A named, ordered list of steps
#[derive(Clone)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    steps: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            steps: Vec::new(),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn probe(self, request: ProbeRequest, check: Check) -> Self {
        self.step(Step::Probe { request, check })
    }

    pub fn get(self, url: &str, check: Check) -> Self {
        self.probe(ProbeRequest::get(url), check)
    }

    pub fn post(self, url: &str, body: impl Into<Vec<u8>>, check: Check) -> Self {
        self.probe(ProbeRequest::post(url).body(body), check)
    }

    pub fn options(self, url: &str, headers: &[(&str, &str)], check: Check) -> Self {
        self.probe(
            ProbeRequest::options(url).headers(headers.iter().copied()),
            check,
        )
    }

    pub fn concurrent(self, requests: Vec<ProbeRequest>, checks: Vec<GroupCheck>) -> Self {
        self.step(Step::Concurrent { requests, checks })
    }

    pub fn pace(self, duration: Duration) -> Self {
        self.step(Step::Pace(duration))
    }

    pub fn interact<F, Fut>(self, label: &str, run: F) -> Self
    where
        F: Fn(ScenarioContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Findings, TransportError>> + Send + 'static,
    {
        self.step(Step::Interact {
            label: label.to_string(),
            run: Arc::new(move |ctx| run(ctx).boxed()),
        })
    }

    /// Case-insensitive substring match on the name
    pub fn matches(&self, filter: &str) -> bool {
        self.name
            .to_ascii_lowercase()
            .contains(&filter.to_ascii_lowercase())
    }
}

impl fmt::Debug for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scenario")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::{each, expect_status};

    #[test]
    fn test_builder_keeps_order() {
        let scenario = Scenario::new("order", "")
            .get("http://h/echo", expect_status(200))
            .pace(Duration::from_millis(5))
            .concurrent(
                vec![ProbeRequest::get("http://h/a"), ProbeRequest::get("http://h/b")],
                vec![each(expect_status(404))],
            )
            .interact("noop", |_ctx| async { Ok(Findings::new()) });

        let labels: Vec<String> = scenario.steps().iter().map(Step::label).collect();
        assert_eq!(
            labels,
            vec![
                "GET http://h/echo",
                "pace 5ms",
                "2 concurrent requests",
                "noop"
            ]
        );
    }

    #[test]
    fn test_matches_filter() {
        let scenario = Scenario::new("xhr_streaming/prelude", "");
        assert!(scenario.matches("XHR"));
        assert!(scenario.matches("prelude"));
        assert!(!scenario.matches("websocket"));
    }
}
