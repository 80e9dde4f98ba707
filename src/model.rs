//! Scenario descriptors and run reports.

use crate::context::{RequestScope, SharedContext, Toolkit};
use crate::validator::get_by_json_path;
use crate::variables::{IntoUpdates, VarMap, Variables};
use futures_util::future::{BoxFuture, FutureExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Outcome of a producer or handler: updates to merge, if any.
pub type Updates = anyhow::Result<Option<VarMap>>;

pub type ComputeFn<A> =
    Arc<dyn Fn(A) -> BoxFuture<'static, Updates> + Send + Sync>;

/// Boxed outcome handler invoked with the step's [`StepResult`].
pub type Handler = ComputeFn<StepResult>;

fn boxed<A, F, Fut, U>(f: F, normalize: fn(U) -> Updates) -> ComputeFn<A>
where
    A: Send + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = U> + Send + 'static,
    U: IntoUpdates + Send + 'static,
{
    Arc::new(move |arg| {
        let fut = f(arg);
        async move { normalize(fut.await) }.boxed()
    })
}

/// Build a [`Handler`] from an async closure.
pub fn handler<F, Fut, U>(f: F) -> Handler
where
    F: Fn(StepResult) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = U> + Send + 'static,
    U: IntoUpdates + Send + 'static,
{
    boxed(f, U::into_updates)
}

/// A dynamic step input: either a fixed value or computed from state.
pub enum Input<A> {
    Static(Value),
    Computed(ComputeFn<A>),
}

impl<A: Send + 'static> Input<A> {
    pub fn computed<F, Fut, U>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
        U: IntoUpdates + Send + 'static,
    {
        Input::Computed(boxed(f, U::into_mapping))
    }
}

impl<A> Clone for Input<A> {
    fn clone(&self) -> Self {
        match self {
            Input::Static(value) => Input::Static(value.clone()),
            Input::Computed(f) => Input::Computed(f.clone()),
        }
    }
}

impl<A> fmt::Debug for Input<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Static(value) => {
                f.debug_tuple("Static").field(value).finish()
            }
            Input::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// The view handed to outcome handlers.
///
/// `json` is the first top-level field of `data`, or `null` when `data`
/// is absent. `variables` is a snapshot of the store taken right before
/// the handler runs.
#[derive(Clone)]
pub struct StepResult {
    pub json: Value,
    pub variables: Variables,
    pub context: SharedContext,
    pub data: Option<Value>,
    pub errors: Option<Value>,
}

impl StepResult {
    /// Look up a dot path (`"owner.id"`, `"items.0"`) inside `json`.
    pub fn json_at(&self, path: &str) -> Option<&Value> {
        get_by_json_path(&self.json, path)
    }
}

impl fmt::Debug for StepResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepResult")
            .field("json", &self.json)
            .field("variables", &self.variables)
            .field("data", &self.data)
            .field("errors", &self.errors)
            .finish_non_exhaustive()
    }
}

/// A step that dispatches one GraphQL operation and validates the outcome.
#[derive(Clone)]
pub struct QueryStep {
    pub query: String,
    pub before_request: Option<Input<RequestScope>>,
    pub payload: Option<Input<Variables>>,
    pub test_response: Option<Handler>,
    pub test_error: Option<Handler>,
    pub test_falsy: Option<Handler>,
    pub with_auth: bool,
}

impl QueryStep {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            before_request: None,
            payload: None,
            test_response: None,
            test_error: None,
            test_falsy: None,
            with_auth: false,
        }
    }

    /// Variables merged into the store before the payload is resolved.
    pub fn before_request(mut self, value: Value) -> Self {
        self.before_request = Some(Input::Static(value));
        self
    }

    pub fn before_request_with<F, Fut, U>(mut self, f: F) -> Self
    where
        F: Fn(RequestScope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
        U: IntoUpdates + Send + 'static,
    {
        self.before_request = Some(Input::computed(f));
        self
    }

    /// GraphQL variables sent with the request.
    pub fn payload(mut self, value: Value) -> Self {
        self.payload = Some(Input::Static(value));
        self
    }

    pub fn payload_with<F, Fut, U>(mut self, f: F) -> Self
    where
        F: Fn(Variables) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
        U: IntoUpdates + Send + 'static,
    {
        self.payload = Some(Input::computed(f));
        self
    }

    /// Always runs after the error and falsy checks.
    pub fn test_response<F, Fut, U>(mut self, f: F) -> Self
    where
        F: Fn(StepResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
        U: IntoUpdates + Send + 'static,
    {
        self.test_response = Some(handler(f));
        self
    }

    /// Runs only when the response carries `errors`. Supplying it also
    /// disables the default "no errors" assertion.
    pub fn test_error<F, Fut, U>(mut self, f: F) -> Self
    where
        F: Fn(StepResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
        U: IntoUpdates + Send + 'static,
    {
        self.test_error = Some(handler(f));
        self
    }

    /// Supplying it disables the default "json is truthy" assertion. When it
    /// fires depends on [`FalsyGating`](crate::validator::FalsyGating).
    pub fn test_falsy<F, Fut, U>(mut self, f: F) -> Self
    where
        F: Fn(StepResult) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = U> + Send + 'static,
        U: IntoUpdates + Send + 'static,
    {
        self.test_falsy = Some(handler(f));
        self
    }

    /// Scope the request to `variables.session`.
    pub fn with_auth(mut self, with_auth: bool) -> Self {
        self.with_auth = with_auth;
        self
    }
}

impl fmt::Debug for QueryStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryStep")
            .field("query", &self.query)
            .field("before_request", &self.before_request)
            .field("payload", &self.payload)
            .field("test_response", &self.test_response.is_some())
            .field("test_error", &self.test_error.is_some())
            .field("test_falsy", &self.test_falsy.is_some())
            .field("with_auth", &self.with_auth)
            .finish()
    }
}

/// A step running an arbitrary function against the toolkit.
#[derive(Clone)]
pub struct ActionStep {
    pub test: ComputeFn<Toolkit>,
}

impl fmt::Debug for ActionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ActionStep(..)")
    }
}

#[derive(Clone, Debug)]
pub enum StepKind {
    Action(ActionStep),
    Query(QueryStep),
}

/// One named step of a scenario group.
#[derive(Clone, Debug)]
pub struct Scenario {
    pub name: String,
    pub kind: StepKind,
}

/// Tag a query descriptor with a display name.
pub fn query(name: impl Into<String>, step: QueryStep) -> Scenario {
    Scenario {
        name: name.into(),
        kind: StepKind::Query(step),
    }
}

/// Tag an arbitrary function step with a display name.
pub fn action<F, Fut, U>(name: impl Into<String>, f: F) -> Scenario
where
    F: Fn(Toolkit) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = U> + Send + 'static,
    U: IntoUpdates + Send + 'static,
{
    Scenario {
        name: name.into(),
        kind: StepKind::Action(ActionStep {
            test: boxed(f, U::into_updates),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed,
    /// Not executed because an earlier step failed with `fail_fast` on.
    Skipped,
}

/// Report for a single step within a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub status: CaseStatus,
    pub error: Option<String>,
    pub request: Option<RequestInfo>,
    pub duration_ms: u64,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }
}

/// What was actually dispatched for a query step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    pub query: String,
    pub variables: VarMap,
    pub authenticated: bool,
}

/// Report for one group run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupResult {
    pub name: String,
    pub success: bool,
    pub error: Option<String>,
    pub cases: Vec<CaseResult>,
    /// Final contents of the variable store.
    pub variables: VarMap,
    pub duration_ms: u64,
}

impl GroupResult {
    pub fn case(&self, name: &str) -> Option<&CaseResult> {
        self.cases.iter().find(|c| c.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseResult> {
        self.cases
            .iter()
            .filter(|c| c.status == CaseStatus::Failed)
    }

    /// Panic with every failure message unless the group passed.
    pub fn assert_passed(&self) {
        if self.success {
            return;
        }
        let mut message = format!("scenario group '{}' failed", self.name);
        if let Some(error) = &self.error {
            message.push_str(&format!(": {error}"));
        }
        for case in self.failures() {
            message.push_str(&format!(
                "\n  - {}: {}",
                case.name,
                case.error.as_deref().unwrap_or("failed")
            ));
        }
        panic!("{message}");
    }
}
