//! Scenario group execution

use crate::config::SuiteConfig;
use crate::context::{EnvironmentProvider, SharedContext, TestEnv, Toolkit};
use crate::dispatcher::{dispatch, extract_json, GraphQLRequest};
use crate::error::{Hook, StepError};
use crate::http::HttpEnvironment;
use crate::model::*;
use crate::resolver::{resolve_before_request, resolve_payload, resolve_session};
use crate::validator::{FalsyGating, OutcomeValidator};
use crate::variables::Variables;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Lifecycle of one group run. `Done` is reached exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    SettingUp,
    Running(usize),
    TearingDown,
    Done,
}

/// Receives progress of group runs.
pub trait Reporter: Send + Sync {
    fn group_started(&self, _name: &str, _steps: usize) {}

    fn phase_changed(&self, _group: &str, _phase: Phase) {}

    fn case_finished(&self, _case: &CaseResult) {}

    fn group_finished(&self, _result: &GroupResult) {}
}

/// Logs progress through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn group_started(&self, name: &str, steps: usize) {
        info!("Starting scenario group: {} ({} step(s))", name, steps);
    }

    fn case_finished(&self, case: &CaseResult) {
        match case.status {
            CaseStatus::Passed => {
                info!("PASS {} ({} ms)", case.name, case.duration_ms)
            }
            CaseStatus::Failed => error!(
                "FAIL {} ({} ms): {}",
                case.name,
                case.duration_ms,
                case.error.as_deref().unwrap_or("failed")
            ),
            CaseStatus::Skipped => warn!("SKIP {}", case.name),
        }
    }

    fn group_finished(&self, result: &GroupResult) {
        info!(
            "Scenario group finished: {} ({} ms) - Success: {}",
            result.name, result.duration_ms, result.success
        );
    }
}

/// A named, ordered list of steps sharing one variable store.
#[derive(Debug, Clone)]
pub struct ScenarioGroup {
    pub name: String,
    pub config: SuiteConfig,
    pub steps: Vec<Scenario>,
}

impl ScenarioGroup {
    pub fn new(
        name: impl Into<String>,
        config: SuiteConfig,
        steps: Vec<Scenario>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            steps,
        }
    }
}

/// Group runner trait
#[async_trait]
pub trait GroupRunner: Send + Sync {
    /// Execute a scenario group. Failures are recorded in the result.
    async fn run(&self, group: &ScenarioGroup) -> GroupResult;
}

/// Runs steps strictly in order against one environment.
pub struct DefaultGroupRunner {
    provider: Arc<dyn EnvironmentProvider>,
    reporter: Arc<dyn Reporter>,
}

impl DefaultGroupRunner {
    /// Runner dispatching over HTTP to the configured endpoint.
    pub fn new() -> Self {
        Self::with_provider(HttpEnvironment)
    }

    pub fn with_provider<P>(provider: P) -> Self
    where
        P: EnvironmentProvider + 'static,
    {
        Self {
            provider: Arc::new(provider),
            reporter: Arc::new(TracingReporter),
        }
    }

    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Arc::new(reporter);
        self
    }

    fn enter(&self, group: &str, phase: &mut Phase, next: Phase) {
        debug!("Group '{}': {:?} -> {:?}", group, phase, next);
        *phase = next;
        self.reporter.phase_changed(group, next);
    }

    async fn run_case(
        &self,
        scenario: &Scenario,
        variables: &mut Variables,
        toolkit: &Toolkit,
        gating: FalsyGating,
    ) -> CaseResult {
        let step_start = Instant::now();
        let mut request = None;

        let outcome = AssertUnwindSafe(execute_step(
            scenario,
            variables,
            toolkit,
            gating,
            &mut request,
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(StepError::Panicked(panic_message(panic.as_ref())))
        });

        let (status, error) = match outcome {
            Ok(()) => (CaseStatus::Passed, None),
            Err(err) => (CaseStatus::Failed, Some(err.to_string())),
        };

        CaseResult {
            name: scenario.name.clone(),
            status,
            error,
            request,
            duration_ms: step_start.elapsed().as_millis() as u64,
        }
    }
}

impl Default for DefaultGroupRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GroupRunner for DefaultGroupRunner {
    #[instrument(skip(self, group), fields(name = %group.name))]
    async fn run(&self, group: &ScenarioGroup) -> GroupResult {
        let start_time = Instant::now();
        let mut phase = Phase::Idle;
        let mut variables = Variables::new();
        let mut cases = Vec::with_capacity(group.steps.len());
        let mut group_error = None;

        self.reporter.group_started(&group.name, group.steps.len());
        self.enter(&group.name, &mut phase, Phase::SettingUp);

        let setup = self.provider.setup(&group.config).await;
        let env: Option<Arc<dyn TestEnv>> = match setup {
            Ok(env) => Some(env),
            Err(err) => {
                group_error = Some(format!("setup failed: {err:#}"));
                None
            }
        };

        let connected = match &env {
            Some(env) => match env.connect().await {
                Ok(()) => true,
                Err(err) => {
                    group_error = Some(format!("connect failed: {err:#}"));
                    false
                }
            },
            None => false,
        };

        if let (Some(env), true) = (&env, connected) {
            let toolkit = Toolkit {
                context: env.context(),
                config: Arc::new(group.config.clone()),
            };
            let mut aborted = false;

            for (step_idx, scenario) in group.steps.iter().enumerate() {
                if aborted {
                    let case = skipped(scenario, "an earlier step failed");
                    self.reporter.case_finished(&case);
                    cases.push(case);
                    continue;
                }

                self.enter(&group.name, &mut phase, Phase::Running(step_idx));
                info!(
                    "Running step {}/{}: {}",
                    step_idx + 1,
                    group.steps.len(),
                    scenario.name
                );

                let case = self
                    .run_case(
                        scenario,
                        &mut variables,
                        &toolkit,
                        group.config.falsy_gating,
                    )
                    .await;

                if !case.passed() && group.config.fail_fast {
                    info!("Stopping scenario group due to step failure");
                    aborted = true;
                }
                self.reporter.case_finished(&case);
                cases.push(case);
            }
        } else {
            for scenario in &group.steps {
                let case = skipped(scenario, "environment setup failed");
                self.reporter.case_finished(&case);
                cases.push(case);
            }
        }

        // Teardown runs whenever an environment exists, even if connect failed.
        if let Some(env) = &env {
            self.enter(&group.name, &mut phase, Phase::TearingDown);
            if let Err(err) = env.disconnect().await {
                error!("Teardown failed: {:#}", err);
                group_error
                    .get_or_insert_with(|| format!("teardown failed: {err:#}"));
            }
        }
        self.enter(&group.name, &mut phase, Phase::Done);

        let failed = cases.iter().filter(|c| !c.passed()).count();
        if group_error.is_none() && failed > 0 {
            group_error = Some(format!("{failed} step(s) did not pass"));
        }

        let result = GroupResult {
            name: group.name.clone(),
            success: group_error.is_none(),
            error: group_error,
            cases,
            variables: variables.into_inner(),
            duration_ms: start_time.elapsed().as_millis() as u64,
        };
        self.reporter.group_finished(&result);
        result
    }
}

/// Register and execute a group over HTTP, using `config.endpoint`.
pub async fn run(
    name: impl Into<String>,
    config: SuiteConfig,
    steps: Vec<Scenario>,
) -> GroupResult {
    DefaultGroupRunner::new()
        .run(&ScenarioGroup::new(name, config, steps))
        .await
}

async fn execute_step(
    scenario: &Scenario,
    variables: &mut Variables,
    toolkit: &Toolkit,
    gating: FalsyGating,
    request: &mut Option<RequestInfo>,
) -> Result<(), StepError> {
    match &scenario.kind {
        StepKind::Action(action) => {
            let updates = (action.test)(toolkit.clone())
                .await
                .map_err(|e| StepError::handler(Hook::Action, e))?;
            if let Some(updates) = updates {
                variables.merge(updates);
            }
            Ok(())
        }
        StepKind::Query(step) => {
            execute_query(step, variables, &toolkit.context, gating, request)
                .await
        }
    }
}

async fn execute_query(
    step: &QueryStep,
    variables: &mut Variables,
    context: &SharedContext,
    gating: FalsyGating,
    request_info: &mut Option<RequestInfo>,
) -> Result<(), StepError> {
    resolve_before_request(step.before_request.as_ref(), variables, context)
        .await?;
    let payload = resolve_payload(step.payload.as_ref(), variables).await?;
    let session = resolve_session(step.with_auth, variables)?;

    let request = GraphQLRequest {
        query: step.query.clone(),
        variables: payload,
    };
    *request_info = Some(RequestInfo {
        query: request.query.clone(),
        variables: request.variables.clone(),
        authenticated: session.is_some(),
    });

    let response =
        dispatch(context.as_ref(), &request, session.as_ref()).await?;
    let json = extract_json(response.data.as_ref());

    OutcomeValidator::new(step, response, json, context.clone(), gating)
        .validate(variables)
        .await
}

fn skipped(scenario: &Scenario, reason: &str) -> CaseResult {
    CaseResult {
        name: scenario.name.clone(),
        status: CaseStatus::Skipped,
        error: Some(format!("not executed: {reason}")),
        request: None,
        duration_ms: 0,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
