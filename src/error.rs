//! Failure taxonomy for a single step.

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// The user-supplied hook that raised a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    BeforeRequest,
    Payload,
    TestError,
    TestFalsy,
    TestResponse,
    Action,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::BeforeRequest => "before_request",
            Hook::Payload => "payload",
            Hook::TestError => "test_error",
            Hook::TestFalsy => "test_falsy",
            Hook::TestResponse => "test_response",
            Hook::Action => "action",
        };
        f.write_str(name)
    }
}

/// Why a step failed.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(
        "query returned errors and no test_error handler was supplied: {errors}"
    )]
    UnexpectedErrors { errors: Value },

    #[error(
        "query returned a falsy result ({json}) and no test_falsy handler was supplied"
    )]
    UnexpectedFalsy { json: Value },

    #[error("{hook} failed: {source:#}")]
    Handler {
        hook: Hook,
        #[source]
        source: anyhow::Error,
    },

    #[error("dispatch failed: {0:#}")]
    Dispatch(#[source] anyhow::Error),

    #[error("variables.session is not a valid session object: {0}")]
    InvalidSession(#[source] serde_json::Error),

    #[error("step panicked: {0}")]
    Panicked(String),
}

impl StepError {
    pub fn handler(hook: Hook, source: anyhow::Error) -> Self {
        StepError::Handler { hook, source }
    }
}
