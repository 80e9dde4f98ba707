//! Resolution of the dynamic inputs of a query step.

use crate::context::{RequestScope, SharedContext};
use crate::error::{Hook, StepError};
use crate::model::{Input, Updates};
use crate::variables::{IntoUpdates, Session, VarMap, Variables};
use tracing::debug;

/// Evaluate a static-or-computed input into an optional map.
///
/// `arg` is only built for computed inputs.
pub async fn evaluate<A>(input: &Input<A>, arg: impl FnOnce() -> A) -> Updates {
    match input {
        Input::Static(value) => value.clone().into_mapping(),
        Input::Computed(f) => f(arg()).await,
    }
}

/// Run `before_request` and merge its result into the store, so that the
/// payload resolved afterwards observes it.
pub async fn resolve_before_request(
    input: Option<&Input<RequestScope>>,
    variables: &mut Variables,
    context: &SharedContext,
) -> Result<(), StepError> {
    let Some(input) = input else {
        return Ok(());
    };

    let updates = evaluate(input, || RequestScope {
        variables: variables.clone(),
        context: context.clone(),
    })
    .await
    .map_err(|e| StepError::handler(Hook::BeforeRequest, e))?;

    if let Some(updates) = updates {
        debug!("before_request produced {} update(s)", updates.len());
        variables.merge(updates);
    }
    Ok(())
}

/// Resolve the GraphQL variables; an absent payload is an empty map.
pub async fn resolve_payload(
    input: Option<&Input<Variables>>,
    variables: &Variables,
) -> Result<VarMap, StepError> {
    let Some(input) = input else {
        return Ok(VarMap::new());
    };

    let payload = evaluate(input, || variables.clone())
        .await
        .map_err(|e| StepError::handler(Hook::Payload, e))?;
    Ok(payload.unwrap_or_default())
}

/// Pick the credential for the request. Without `with_auth` no session
/// is attached, whatever the store holds.
pub fn resolve_session(
    with_auth: bool,
    variables: &Variables,
) -> Result<Option<Session>, StepError> {
    if !with_auth {
        return Ok(None);
    }
    let session = variables.session().map_err(StepError::InvalidSession)?;
    if session.is_none() {
        debug!("with_auth is set but variables.session is absent");
    }
    Ok(session)
}
