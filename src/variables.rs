//! Variable store shared by every step of one group run.
//!
//! The store is a flat JSON object. Steps read it through owned snapshots
//! and write to it by returning updates, which are shallow-merged with
//! last-write-wins semantics.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// A JSON object used for variable updates and request payloads.
pub type VarMap = Map<String, Value>;

/// Reserved key holding the credential used by authenticated steps.
pub const SESSION_KEY: &str = "session";

/// Authentication credential stored under `variables.session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "itemId")]
    pub item_id: String,
    #[serde(default)]
    pub data: Value,
}

impl Session {
    pub fn new(item_id: impl Into<String>, data: Value) -> Self {
        Self {
            item_id: item_id.into(),
            data,
        }
    }

    /// Render the session as the JSON value stored in the variable map.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("itemId".into(), Value::String(self.item_id.clone()));
        map.insert("data".into(), self.data.clone());
        Value::Object(map)
    }
}

/// Mutable key-value store threaded across the steps of a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Variables {
    vars: VarMap,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_all(&self) -> &VarMap {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    /// Convenience accessor for string variables.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.vars.get(key).and_then(Value::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Shallow merge: existing keys are overwritten, new keys are added.
    pub fn merge(&mut self, updates: VarMap) {
        for (key, value) in updates {
            debug!("Setting variable '{}' = {}", key, value);
            self.vars.insert(key, value);
        }
    }

    /// Store a session credential under the reserved `session` key.
    pub fn set_session(&mut self, session: &Session) {
        self.vars.insert(SESSION_KEY.to_string(), session.to_value());
    }

    /// Read `variables.session`.
    ///
    /// A missing or `null` session yields `Ok(None)`; any other value must
    /// have the `{ itemId, data }` shape.
    pub fn session(&self) -> Result<Option<Session>, serde_json::Error> {
        match self.vars.get(SESSION_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some),
        }
    }

    /// The whole store as a JSON object, for path lookups and templating.
    pub fn to_value(&self) -> Value {
        Value::Object(self.vars.clone())
    }

    pub fn into_inner(self) -> VarMap {
        self.vars
    }
}

impl From<VarMap> for Variables {
    fn from(vars: VarMap) -> Self {
        Self { vars }
    }
}

/// Normalises whatever a producer or handler returns into an optional set
/// of variable updates.
///
/// Only JSON objects are merged. `()`, `None`, `null` and non-object values
/// leave the store untouched; an `Err` is a handler fault.
pub trait IntoUpdates: Sized {
    fn into_updates(self) -> Result<Option<VarMap>>;

    /// Like [`into_updates`](Self::into_updates), but a value that is
    /// neither an object nor `null` is an error. Used for step inputs.
    fn into_mapping(self) -> Result<Option<VarMap>> {
        self.into_updates()
    }
}

impl IntoUpdates for () {
    fn into_updates(self) -> Result<Option<VarMap>> {
        Ok(None)
    }
}

impl IntoUpdates for VarMap {
    fn into_updates(self) -> Result<Option<VarMap>> {
        Ok(Some(self))
    }
}

impl IntoUpdates for Value {
    fn into_updates(self) -> Result<Option<VarMap>> {
        match self {
            Value::Object(map) => Ok(Some(map)),
            Value::Null => Ok(None),
            other => {
                debug!("Ignoring non-object update value: {}", other);
                Ok(None)
            }
        }
    }

    fn into_mapping(self) -> Result<Option<VarMap>> {
        match self {
            Value::Object(map) => Ok(Some(map)),
            Value::Null => Ok(None),
            other => bail!("expected an object, got {other}"),
        }
    }
}

impl IntoUpdates for Variables {
    fn into_updates(self) -> Result<Option<VarMap>> {
        Ok(Some(self.vars))
    }
}

impl<T: IntoUpdates> IntoUpdates for Option<T> {
    fn into_updates(self) -> Result<Option<VarMap>> {
        match self {
            Some(inner) => inner.into_updates(),
            None => Ok(None),
        }
    }

    fn into_mapping(self) -> Result<Option<VarMap>> {
        match self {
            Some(inner) => inner.into_mapping(),
            None => Ok(None),
        }
    }
}

impl<T: IntoUpdates> IntoUpdates for Result<T> {
    fn into_updates(self) -> Result<Option<VarMap>> {
        self?.into_updates()
    }

    fn into_mapping(self) -> Result<Option<VarMap>> {
        self?.into_mapping()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> VarMap {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_last_write_wins() {
        let mut vars = Variables::new();
        vars.merge(map(json!({"a": 1})));
        vars.merge(map(json!({"a": 2})));
        assert_eq!(vars.get("a"), Some(&json!(2)));
        assert_eq!(vars.len(), 1);
    }

    #[test]
    fn merge_adds_new_keys() {
        let mut vars = Variables::new();
        vars.merge(map(json!({"a": 1})));
        vars.merge(map(json!({"b": 1})));
        assert_eq!(vars.get("a"), Some(&json!(1)));
        assert_eq!(vars.get("b"), Some(&json!(1)));
    }

    #[test]
    fn merge_is_shallow() {
        let mut vars = Variables::new();
        vars.merge(map(json!({"user": {"id": 1, "name": "a"}})));
        vars.merge(map(json!({"user": {"id": 2}})));
        assert_eq!(vars.get("user"), Some(&json!({"id": 2})));
    }

    #[test]
    fn session_absent_or_null() {
        let mut vars = Variables::new();
        assert_eq!(vars.session().unwrap(), None);
        vars.merge(map(json!({"session": null})));
        assert_eq!(vars.session().unwrap(), None);
    }

    #[test]
    fn session_roundtrips_through_store() {
        let mut vars = Variables::new();
        vars.set_session(&Session::new("1", json!({})));
        assert_eq!(
            vars.get("session"),
            Some(&json!({"itemId": "1", "data": {}}))
        );
        assert_eq!(vars.session().unwrap(), Some(Session::new("1", json!({}))));
    }

    #[test]
    fn malformed_session_is_an_error() {
        let mut vars = Variables::new();
        vars.merge(map(json!({"session": "token"})));
        assert!(vars.session().is_err());
    }

    #[test]
    fn into_updates_normalises_return_values() {
        assert_eq!(().into_updates().unwrap(), None);
        assert_eq!(Value::Null.into_updates().unwrap(), None);
        assert_eq!(json!(5).into_updates().unwrap(), None);
        assert_eq!(
            json!({"id": "x"}).into_updates().unwrap(),
            Some(map(json!({"id": "x"})))
        );
        assert_eq!(Option::<Value>::None.into_updates().unwrap(), None);

        let failed: Result<Value> = Err(anyhow::anyhow!("boom"));
        assert!(failed.into_updates().is_err());
    }

    #[test]
    fn into_mapping_rejects_non_objects() {
        assert_eq!(Value::Null.into_mapping().unwrap(), None);
        assert_eq!(().into_mapping().unwrap(), None);
        assert_eq!(
            Some(json!({"id": 1})).into_mapping().unwrap(),
            Some(map(json!({"id": 1})))
        );

        let err = json!([1]).into_mapping().unwrap_err();
        assert_eq!(err.to_string(), "expected an object, got [1]");
        assert!(Some(json!("x")).into_mapping().is_err());
    }
}
