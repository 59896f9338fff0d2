use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, info_span, warn, Instrument};

use super::{Scenario, ScenarioContext, Step};
use crate::config::Config;
use crate::endpoint::Endpoints;
use crate::error::{AssertionFailure, TransportError};
use crate::http::{join_all, HttpProbe};

/// Lifecycle of one scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioState {
    Pending,
    Running,
    Passed,
    /// At least one rule did not hold
    Failed,
    /// Infrastructure failure; the remaining steps were skipped
    Aborted,
}

impl ScenarioState {
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            ScenarioState::Passed | ScenarioState::Failed | ScenarioState::Aborted
        )
    }
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioState::Pending => "PENDING",
            ScenarioState::Running => "RUNNING",
            ScenarioState::Passed => "PASS",
            ScenarioState::Failed => "FAIL",
            ScenarioState::Aborted => "ABORT",
        };
        f.pad(s)
    }
}

/// Outcome of one scenario
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub name: String,
    pub state: ScenarioState,
    pub elapsed: Duration,
    /// Every rule that did not hold, prefixed with the step that checked it
    pub failures: Vec<AssertionFailure>,
    /// Why the scenario was aborted
    pub error: Option<String>,
}

impl ScenarioReport {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            state: ScenarioState::Pending,
            elapsed: Duration::ZERO,
            failures: Vec::new(),
            error: None,
        }
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<5} {} ({:.2}s)",
            self.state,
            self.name,
            self.elapsed.as_secs_f64()
        )?;
        for failure in &self.failures {
            write!(f, "\n      {}", failure)?;
        }
        if let Some(error) = &self.error {
            write!(f, "\n      transport: {}", error)?;
        }
        Ok(())
    }
}

/// Reports for a whole run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub reports: Vec<ScenarioReport>,
}

impl RunSummary {
    pub fn count(&self, state: ScenarioState) -> usize {
        self.reports.iter().filter(|r| r.state == state).count()
    }

    pub fn passed(&self) -> usize {
        self.count(ScenarioState::Passed)
    }

    pub fn failed(&self) -> usize {
        self.count(ScenarioState::Failed)
    }

    pub fn aborted(&self) -> usize {
        self.count(ScenarioState::Aborted)
    }

    pub fn is_success(&self) -> bool {
        self.reports
            .iter()
            .all(|r| r.state == ScenarioState::Passed)
    }

    /// Process exit status: 0 only if every scenario passed
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.reports {
            writeln!(f, "{}", report)?;
        }
        write!(
            f,
            "{} scenarios: {} passed, {} failed, {} aborted",
            self.reports.len(),
            self.passed(),
            self.failed(),
            self.aborted()
        )
    }
}

/// Executes scenarios one after another
pub struct Runner {
    config: Arc<Config>,
    endpoints: Arc<Endpoints>,
    http: HttpProbe,
}

impl Runner {
    pub fn new(config: Config, endpoints: Endpoints) -> Result<Self, TransportError> {
        let http = HttpProbe::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            endpoints: Arc::new(endpoints),
            http,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Fresh context: new cookie jar, shared client
    pub fn context(&self) -> ScenarioContext {
        ScenarioContext::new(self.config.clone(), self.endpoints.clone(), &self.http)
    }

    /// Run every scenario in order; never interleaves them
    pub async fn run(&self, scenarios: &[Scenario]) -> RunSummary {
        let mut summary = RunSummary::default();
        for scenario in scenarios {
            summary.reports.push(self.run_scenario(scenario).await);
        }
        info!(
            passed = summary.passed(),
            failed = summary.failed(),
            aborted = summary.aborted(),
            "run complete"
        );
        summary
    }

    pub async fn run_scenario(&self, scenario: &Scenario) -> ScenarioReport {
        let span = info_span!("scenario", scenario = %scenario.name);
        self.execute(scenario).instrument(span).await
    }

    async fn execute(&self, scenario: &Scenario) -> ScenarioReport {
        let mut report = ScenarioReport::new(&scenario.name);
        let ctx = self.context();
        let started = Instant::now();
        report.state = ScenarioState::Running;
        debug!(steps = scenario.steps().len(), "scenario started");

        for (index, step) in scenario.steps().iter().enumerate() {
            let label = step.label();
            debug!(step = index, %label, "step");
            match run_step(&ctx, step).await {
                Ok(failures) => {
                    for failure in failures {
                        warn!(step = index, %failure, "rule violated");
                        report.failures.push(failure.within(&label));
                    }
                }
                Err(e) => {
                    warn!(step = index, %label, error = %e, "scenario aborted");
                    report.error = Some(format!("{}: {}", label, e));
                    report.state = ScenarioState::Aborted;
                    break;
                }
            }
        }

        report.elapsed = started.elapsed();
        if report.state == ScenarioState::Running {
            report.state = if report.failures.is_empty() {
                ScenarioState::Passed
            } else {
                ScenarioState::Failed
            };
        }
        info!(
            state = %report.state,
            failures = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "scenario finished"
        );
        report
    }
}

async fn run_step(
    ctx: &ScenarioContext,
    step: &Step,
) -> Result<Vec<AssertionFailure>, TransportError> {
    match step {
        Step::Probe { request, check } => {
            let response = ctx.http.execute(request.clone()).await?;
            Ok(check.evaluate(&response))
        }
        Step::Concurrent { requests, checks } => {
            let handles = requests
                .iter()
                .map(|request| ctx.http.spawn(request.clone()))
                .collect();
            let responses = join_all(handles).await?;
            Ok(checks
                .iter()
                .flat_map(|check| check.evaluate(&responses))
                .collect())
        }
        Step::Pace(duration) => {
            tokio::time::sleep(*duration).await;
            Ok(Vec::new())
        }
        Step::Interact { run, .. } => Ok(run(ctx.clone()).await?.into_failures()),
    }
}
