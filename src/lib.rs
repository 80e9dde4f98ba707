//! Declarative scenario testing for GraphQL APIs.
//!
//! A scenario group is an ordered list of steps sharing one variable store.
//! Query steps resolve their inputs from the store, dispatch one operation,
//! validate the outcome (error, falsy, response) and may write values back
//! for later steps. Action steps run arbitrary code against the execution
//! context.
//!
//! ```no_run
//! use gqlscenario::{
//!     query, run, QueryStep, StepResult, SuiteConfig, Variables,
//! };
//! use serde_json::json;
//!
//! # async fn example() {
//! let config = SuiteConfig::default()
//!     .with_endpoint("http://localhost:3000/api/graphql");
//! let result = run(
//!     "widgets",
//!     config,
//!     vec![
//!         query(
//!             "create",
//!             QueryStep::new("mutation { createWidget { id } }")
//!                 .test_response(|r: StepResult| async move {
//!                     json!({ "id": r.json["id"] })
//!                 }),
//!         ),
//!         query(
//!             "read",
//!             QueryStep::new("query($id: ID!) { widget(id: $id) { id } }")
//!                 .payload_with(|v: Variables| async move {
//!                     json!({ "id": v.get("id") })
//!                 }),
//!         ),
//!     ],
//! )
//! .await;
//! result.assert_passed();
//! # }
//! ```

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod manifest;
pub mod model;
pub mod resolver;
pub mod runner;
pub mod template;
pub mod validator;
pub mod variables;

#[cfg(test)]
mod testing;

pub use config::*;
pub use context::*;
pub use dispatcher::{GraphQLRequest, RawResponse};
pub use error::{Hook, StepError};
pub use http::{HttpContext, HttpEnvironment};
pub use manifest::GroupManifest;
pub use model::*;
pub use runner::*;
pub use validator::FalsyGating;
pub use variables::*;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
