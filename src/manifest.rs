//! Declarative YAML scenario groups.
//!
//! A manifest describes query steps without code. Each step is compiled
//! into a regular [`QueryStep`], so manifests go through exactly the same
//! resolution, dispatch and validation path as hand-written scenarios:
//!
//! - `before` is a static `before_request` input.
//! - `payload` becomes a computed payload that expands `{{ var }}`
//!   placeholders against the current store.
//! - `expect.errors` installs `test_error` (storing the errors under
//!   `lastErrors`) and requires errors to be present.
//! - `expect.falsy` installs a no-op `test_falsy`, lifting the truthy check.
//! - `assert` and `save` run in `test_response`, on `json`.

use crate::config::SuiteConfig;
use crate::model::{action, query, QueryStep, Scenario, StepResult};
use crate::runner::ScenarioGroup;
use crate::template::expand_value;
use crate::validator::validate_json;
use crate::variables::{VarMap, Variables};
use anyhow::{anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Variable under which `expect.errors` steps store the returned errors.
pub const LAST_ERRORS_KEY: &str = "lastErrors";

/// A scenario group loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: SuiteConfig,
    /// Seeded into the store by a leading step.
    #[serde(default)]
    pub vars: VarMap,
    pub steps: Vec<StepManifest>,
}

/// One declarative query step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepManifest {
    pub name: String,
    pub query: String,
    #[serde(default)]
    pub before: Option<VarMap>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub with_auth: bool,
    #[serde(default)]
    pub expect: Expectation,
    /// Expected values at dot paths inside `json`.
    #[serde(default)]
    pub assert: BTreeMap<String, Value>,
    /// Variable name to dot path inside `json`.
    #[serde(default)]
    pub save: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expectation {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub falsy: bool,
}

impl GroupManifest {
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }

    /// Compile into a runnable group.
    pub fn into_group(self) -> ScenarioGroup {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);

        if !self.vars.is_empty() {
            let seed = self.vars;
            steps.push(action("seed variables", move |_toolkit| {
                let seed = seed.clone();
                async move { seed }
            }));
        }

        steps.extend(self.steps.into_iter().map(StepManifest::into_scenario));

        ScenarioGroup::new(self.name, self.config, steps)
    }
}

impl StepManifest {
    pub fn into_scenario(self) -> Scenario {
        let mut step = QueryStep::new(self.query).with_auth(self.with_auth);

        if let Some(before) = self.before {
            step = step.before_request(Value::Object(before));
        }

        if let Some(payload) = self.payload {
            step = step.payload_with(move |vars: Variables| {
                let expanded = expand_value(&payload, &vars.to_value());
                debug!("Expanded payload: {}", expanded);
                async move { expanded }
            });
        }

        if self.expect.errors {
            step = step.test_error(|r: StepResult| async move {
                json!({ LAST_ERRORS_KEY: r.errors })
            });
        }

        if self.expect.falsy {
            step = step.test_falsy(|_r| async {});
        }

        let expect_errors = self.expect.errors;
        let assert = self.assert;
        let save = self.save;
        if expect_errors || !assert.is_empty() || !save.is_empty() {
            step = step.test_response(move |r: StepResult| {
                let outcome = check_response(&r, expect_errors, &assert, &save);
                async move { outcome }
            });
        }

        query(self.name, step)
    }
}

fn check_response(
    response: &StepResult,
    expect_errors: bool,
    assert: &BTreeMap<String, Value>,
    save: &BTreeMap<String, String>,
) -> anyhow::Result<VarMap> {
    if expect_errors && response.errors.is_none() {
        bail!("expected the query to return errors, but it returned none");
    }

    let mismatches = validate_json(&response.json, assert);
    if !mismatches.is_empty() {
        bail!(mismatches.join("; "));
    }

    let mut saved = VarMap::new();
    for (var_name, path) in save {
        let value = response
            .json_at(path)
            .ok_or_else(|| {
                anyhow!("JSON path '{path}' not found in response")
            })?;
        debug!("Saved variable '{}' with value: {}", var_name, value);
        saved.insert(var_name.clone(), value.clone());
    }
    Ok(saved)
}
