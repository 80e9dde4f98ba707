//! Request dispatch and `json` extraction.

use crate::context::ExecutionContext;
use crate::error::StepError;
use crate::variables::{Session, VarMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

/// The body of a GraphQL operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default)]
    pub variables: VarMap,
}

/// Unprocessed `{ data, errors }` response.
///
/// A JSON `null` in either field deserializes to `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
}

impl RawResponse {
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data).filter(|d| !d.is_null()),
            errors: None,
        }
    }

    pub fn errors(errors: Value) -> Self {
        Self {
            data: None,
            errors: Some(errors),
        }
    }

    pub fn with_errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }
}

/// Take the first top-level field of `data` in response order.
///
/// Absent data, non-object data and empty objects all yield `null`.
pub fn extract_json(data: Option<&Value>) -> Value {
    match data {
        Some(Value::Object(fields)) => fields
            .values()
            .next()
            .cloned()
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Issue exactly one request through the execution context.
#[instrument(skip_all, fields(authenticated = session.is_some()))]
pub async fn dispatch(
    context: &dyn ExecutionContext,
    request: &GraphQLRequest,
    session: Option<&Session>,
) -> Result<RawResponse, StepError> {
    debug!(
        "Dispatching operation with {} variable(s)",
        request.variables.len()
    );
    let response = context
        .raw(session, request)
        .await
        .map_err(StepError::Dispatch)?;
    debug!(
        has_data = response.data.is_some(),
        has_errors = response.errors.is_some(),
        "Received response"
    );

    Ok(response)
}
