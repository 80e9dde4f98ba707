//! reqwest-backed execution environment talking to a GraphQL endpoint.

use crate::config::{SessionConfig, SuiteConfig};
use crate::context::{
    EnvironmentProvider, ExecutionContext, SharedContext, TestEnv,
};
use crate::dispatcher::{GraphQLRequest, RawResponse};
use crate::template::expand_str;
use crate::variables::{Session, VarMap};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Posts `{ query, variables }` to the endpoint and parses `{ data, errors }`.
#[derive(Debug, Clone)]
pub struct HttpContext {
    endpoint: url::Url,
    session: SessionConfig,
    http: reqwest::Client,
}

impl HttpContext {
    pub fn from_config(config: &SuiteConfig) -> Result<Self> {
        let endpoint = config.endpoint_url()?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .context(format!("Invalid header name: {name}"))?;
            let value = HeaderValue::from_str(value)
                .context(format!("Invalid value for header {name}"))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            endpoint,
            session: config.session.clone(),
            http,
        })
    }

    /// Render the auth header value for `session`.
    pub fn session_header_value(&self, session: &Session) -> String {
        expand_str(&self.session.template, &session.to_value())
    }
}

#[async_trait]
impl ExecutionContext for HttpContext {
    async fn raw(
        &self,
        session: Option<&Session>,
        request: &GraphQLRequest,
    ) -> Result<RawResponse> {
        let mut builder = self.http.post(self.endpoint.clone()).json(request);

        if let Some(session) = session {
            builder = builder.header(
                self.session.header.as_str(),
                self.session_header_value(session),
            );
        }

        debug!("Sending request to {}", self.endpoint);
        let response = builder.send().await.context("Failed to send request")?;
        let status = response.status();
        debug!("Received response with status: {}", status);

        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        // Non-2xx responses count only if they still carry `data` or
        // `errors`.
        let parsed = serde_json::from_str::<Value>(&body).ok();
        let carries_result = parsed.as_ref().is_some_and(is_graphql_result);
        if !status.is_success() && !carries_result {
            bail!("Request failed: {status} - {body}");
        }

        let parsed = parsed.context(format!("Response is not JSON: {body}"))?;
        serde_json::from_value(parsed)
            .context(format!("Response is not a GraphQL result: {body}"))
    }
}

fn is_graphql_result(body: &Value) -> bool {
    body.as_object().is_some_and(|fields| {
        fields.contains_key("data") || fields.contains_key("errors")
    })
}

/// Environment provider creating an [`HttpContext`] from the suite config.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpEnvironment;

#[async_trait]
impl EnvironmentProvider for HttpEnvironment {
    async fn setup(&self, config: &SuiteConfig) -> Result<Arc<dyn TestEnv>> {
        let context = HttpContext::from_config(config)?;
        info!("Using GraphQL endpoint {}", context.endpoint);
        Ok(Arc::new(HttpTestEnv {
            context: Arc::new(context),
            probe: config.probe_on_connect,
        }))
    }
}

struct HttpTestEnv {
    context: Arc<HttpContext>,
    probe: bool,
}

#[async_trait]
impl TestEnv for HttpTestEnv {
    fn context(&self) -> SharedContext {
        self.context.clone()
    }

    async fn connect(&self) -> Result<()> {
        if !self.probe {
            return Ok(());
        }
        let probe = GraphQLRequest {
            query: "{ __typename }".to_string(),
            variables: VarMap::new(),
        };
        let response = self
            .context
            .raw(None, &probe)
            .await
            .context("Endpoint probe failed")?;
        if let Some(errors) = response.errors {
            warn!("Endpoint probe returned errors: {}", errors);
            bail!("Endpoint probe returned errors: {errors}");
        }
        debug!("Endpoint probe succeeded");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        debug!("Releasing HTTP environment for {}", self.context.endpoint);
        Ok(())
    }
}
