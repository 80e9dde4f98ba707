//! Boundary traits for the environment that actually executes queries.
//!
//! A group run asks an [`EnvironmentProvider`] for a [`TestEnv`] once,
//! connects it, dispatches every query step through its
//! [`ExecutionContext`], and disconnects it at the end.

use crate::config::SuiteConfig;
use crate::dispatcher::{GraphQLRequest, RawResponse};
use crate::variables::{Session, Variables};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Executes one GraphQL operation, optionally scoped to a session.
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    async fn raw(
        &self,
        session: Option<&Session>,
        request: &GraphQLRequest,
    ) -> Result<RawResponse>;
}

pub type SharedContext = Arc<dyn ExecutionContext>;

/// A live environment for one group run.
#[async_trait]
pub trait TestEnv: Send + Sync {
    fn context(&self) -> SharedContext;

    async fn connect(&self) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Creates the environment for a group run.
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    async fn setup(&self, config: &SuiteConfig) -> Result<Arc<dyn TestEnv>>;
}

/// Handle passed to action steps.
#[derive(Clone)]
pub struct Toolkit {
    pub context: SharedContext,
    pub config: Arc<SuiteConfig>,
}

impl fmt::Debug for Toolkit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Toolkit")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Argument of a computed `before_request` input.
#[derive(Clone)]
pub struct RequestScope {
    pub variables: Variables,
    pub context: SharedContext,
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestScope")
            .field("variables", &self.variables)
            .finish_non_exhaustive()
    }
}

/// Provider wrapping an already constructed context, e.g. an in-process
/// schema executor. Connect and disconnect do nothing.
#[derive(Clone)]
pub struct FixedEnvironment {
    context: SharedContext,
}

impl FixedEnvironment {
    pub fn new(context: SharedContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl EnvironmentProvider for FixedEnvironment {
    async fn setup(&self, _config: &SuiteConfig) -> Result<Arc<dyn TestEnv>> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl TestEnv for FixedEnvironment {
    fn context(&self) -> SharedContext {
        self.context.clone()
    }

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}
