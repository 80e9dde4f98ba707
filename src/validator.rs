//! Outcome validation for query steps and JSON path helpers.

use crate::context::SharedContext;
use crate::dispatcher::RawResponse;
use crate::error::{Hook, StepError};
use crate::model::{Handler, QueryStep, StepResult};
use crate::variables::Variables;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, error};

/// When a supplied `test_falsy` handler fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FalsyGating {
    /// Fire only when the response carries `errors`, the same condition as
    /// `test_error`.
    #[default]
    OnErrors,
    /// Fire when `json` is falsy.
    OnFalsyJson,
}

/// JavaScript-style truthiness: `null`, `false`, `0`, and `""` are falsy;
/// every object and array is truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Walk a dot-separated path through objects and arrays. An empty path
/// returns the root.
pub fn get_by_json_path<'a>(json: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = json;

    for part in path.split('.').filter(|p| !p.is_empty()) {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Compare values at dot paths against expectations, returning one message
/// per mismatch.
pub fn validate_json(
    json: &Value,
    expectations: &BTreeMap<String, Value>,
) -> Vec<String> {
    let mut errors = Vec::new();

    for (path, expected) in expectations {
        match get_by_json_path(json, path) {
            Some(actual) => {
                if actual != expected {
                    errors.push(format!(
                        "value at '{path}' does not match. expected: {expected}, actual: {actual}"
                    ));
                }
            }
            None => {
                errors.push(format!(
                    "path '{path}' does not exist in the response"
                ));
            }
        }
    }

    errors
}

/// Applies the three outcome channels of a query step in order:
/// error, falsy, response. Updates returned by a handler are merged before
/// the next handler runs.
pub struct OutcomeValidator<'a> {
    step: &'a QueryStep,
    response: RawResponse,
    json: Value,
    context: SharedContext,
    gating: FalsyGating,
}

impl<'a> OutcomeValidator<'a> {
    pub fn new(
        step: &'a QueryStep,
        response: RawResponse,
        json: Value,
        context: SharedContext,
        gating: FalsyGating,
    ) -> Self {
        Self {
            step,
            response,
            json,
            context,
            gating,
        }
    }

    pub async fn validate(
        self,
        variables: &mut Variables,
    ) -> Result<(), StepError> {
        let has_errors = self.response.errors.is_some();

        match &self.step.test_error {
            None => {
                if let Some(errors) = &self.response.errors {
                    error!(
                        "Query returned errors:\n{}",
                        serde_json::to_string_pretty(errors)
                            .unwrap_or_else(|_| errors.to_string())
                    );
                    return Err(StepError::UnexpectedErrors {
                        errors: errors.clone(),
                    });
                }
            }
            Some(handler) => {
                if has_errors {
                    self.invoke(handler, Hook::TestError, variables).await?;
                }
            }
        }

        match &self.step.test_falsy {
            None => {
                if !is_truthy(&self.json) {
                    return Err(StepError::UnexpectedFalsy {
                        json: self.json.clone(),
                    });
                }
            }
            Some(handler) => {
                let fire = match self.gating {
                    FalsyGating::OnErrors => has_errors,
                    FalsyGating::OnFalsyJson => !is_truthy(&self.json),
                };
                if fire {
                    self.invoke(handler, Hook::TestFalsy, variables).await?;
                }
            }
        }

        if let Some(handler) = &self.step.test_response {
            self.invoke(handler, Hook::TestResponse, variables).await?;
        }

        Ok(())
    }

    fn view(&self, variables: &Variables) -> StepResult {
        StepResult {
            json: self.json.clone(),
            variables: variables.clone(),
            context: self.context.clone(),
            data: self.response.data.clone(),
            errors: self.response.errors.clone(),
        }
    }

    async fn invoke(
        &self,
        handler: &Handler,
        hook: Hook,
        variables: &mut Variables,
    ) -> Result<(), StepError> {
        debug!("Running {} handler", hook);
        let updates = handler(self.view(variables))
            .await
            .map_err(|e| StepError::handler(hook, e))?;
        if let Some(updates) = updates {
            variables.merge(updates);
        }
        Ok(())
    }
}
