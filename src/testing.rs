//! In-memory execution context used by the unit tests.

use crate::context::ExecutionContext;
use crate::dispatcher::{GraphQLRequest, RawResponse};
use crate::variables::Session;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub session: Option<Session>,
    pub request: GraphQLRequest,
}

enum Reply {
    Response(RawResponse),
    Fault(String),
}

/// Replays queued responses and records every call. An empty queue
/// answers with `{ "data": { "ok": true } }`.
#[derive(Clone, Default)]
pub(crate) struct RecordingContext {
    replies: Arc<Mutex<VecDeque<Reply>>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl RecordingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: RawResponse) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Response(response));
    }

    pub fn fail_next(&self, message: &str) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Fault(message.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionContext for RecordingContext {
    async fn raw(
        &self,
        session: Option<&Session>,
        request: &GraphQLRequest,
    ) -> Result<RawResponse> {
        self.calls.lock().unwrap().push(Call {
            session: session.cloned(),
            request: request.clone(),
        });
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Fault(message)) => Err(anyhow!(message)),
            None => Ok(RawResponse::data(serde_json::json!({"ok": true}))),
        }
    }
}
