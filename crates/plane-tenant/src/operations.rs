//! Operation Dispatch Table
//!
//! String-named operations resolve to typed handlers registered up front.
//! Handler shapes are validated at registration time; parameter presence is
//! checked before any credential work happens.

use crate::model::TenantRecord;
use async_trait::async_trait;
use plane_graph::{ApiRequest, CallContext, CallError, Credential, ThrottleAwareClient};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("operation {0} is already registered")]
    Duplicate(String),
    #[error("invalid operation spec: {0}")]
    InvalidSpec(String),
    #[error("operation {operation} is missing required parameter {parameter}")]
    MissingParameter { operation: String, parameter: String },
    #[error("operation {operation} does not accept parameter {parameter}")]
    UnknownParameter { operation: String, parameter: String },
}

/// Declared shape of an operation.
#[derive(Clone, Copy, Debug)]
pub struct OperationSpec {
    pub name: &'static str,
    pub required_params: &'static [&'static str],
    pub optional_params: &'static [&'static str],
}

impl OperationSpec {
    /// Check an invocation's parameters against the declared shape.
    pub fn validate_params(&self, params: &Map<String, Value>) -> Result<(), OperationError> {
        for required in self.required_params {
            if !params.contains_key(*required) {
                return Err(OperationError::MissingParameter {
                    operation: self.name.to_string(),
                    parameter: (*required).to_string(),
                });
            }
        }
        for key in params.keys() {
            let known = self.required_params.iter().any(|p| p == key)
                || self.optional_params.iter().any(|p| p == key);
            if !known {
                return Err(OperationError::UnknownParameter {
                    operation: self.name.to_string(),
                    parameter: key.clone(),
                });
            }
        }
        Ok(())
    }

    fn validate_shape(&self) -> Result<(), OperationError> {
        if self.name.is_empty() {
            return Err(OperationError::InvalidSpec("empty operation name".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for param in self.required_params.iter().chain(self.optional_params) {
            if !seen.insert(*param) {
                return Err(OperationError::InvalidSpec(format!(
                    "parameter {param} declared twice by {}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Everything a handler needs to run within one tenant's boundary.
pub struct OperationContext<'a> {
    pub record: &'a TenantRecord,
    pub credential: &'a Credential,
    pub client: &'a ThrottleAwareClient,
    pub call: &'a CallContext,
    pub parameters: &'a Map<String, Value>,
}

/// A typed operation against the tenant's API surface.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    fn spec(&self) -> OperationSpec;
    async fn run(&self, ctx: OperationContext<'_>) -> Result<Value, CallError>;
}

/// Registry of known operations, populated at startup.
pub struct OperationRegistry {
    handlers: HashMap<&'static str, Arc<dyn OperationHandler>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry pre-loaded with the built-in directory operations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // Built-in specs are statically valid.
        let _ = registry.register(Arc::new(ListUsersOperation));
        let _ = registry.register(Arc::new(CreateGroupOperation));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn OperationHandler>) -> Result<(), OperationError> {
        let spec = handler.spec();
        spec.validate_shape()?;
        if self.handlers.contains_key(spec.name) {
            return Err(OperationError::Duplicate(spec.name.to_string()));
        }
        self.handlers.insert(spec.name, handler);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OperationHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// First page of directory users.
pub struct ListUsersOperation;

#[async_trait]
impl OperationHandler for ListUsersOperation {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "list-users",
            required_params: &[],
            optional_params: &["top"],
        }
    }

    async fn run(&self, ctx: OperationContext<'_>) -> Result<Value, CallError> {
        let top = ctx
            .parameters
            .get("top")
            .and_then(Value::as_u64)
            .unwrap_or(10);
        let response = ctx
            .client
            .call(
                ctx.credential,
                ApiRequest::get(format!("/v1.0/users?$top={top}")),
                ctx.call,
            )
            .await?;
        Ok(response
            .body
            .get("value")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }
}

/// Create a security group in the tenant directory.
pub struct CreateGroupOperation;

#[async_trait]
impl OperationHandler for CreateGroupOperation {
    fn spec(&self) -> OperationSpec {
        OperationSpec {
            name: "create-group",
            required_params: &["display_name"],
            optional_params: &["description"],
        }
    }

    async fn run(&self, ctx: OperationContext<'_>) -> Result<Value, CallError> {
        let display_name = ctx
            .parameters
            .get("display_name")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let description = ctx
            .parameters
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let payload = serde_json::json!({
            "displayName": display_name,
            "description": description,
            "securityEnabled": true,
            "mailEnabled": false,
            "groupTypes": [],
        });
        let response = ctx
            .client
            .call(ctx.credential, ApiRequest::post("/v1.0/groups", payload), ctx.call)
            .await?;
        Ok(response.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BadSpecOperation;

    #[async_trait]
    impl OperationHandler for BadSpecOperation {
        fn spec(&self) -> OperationSpec {
            OperationSpec {
                name: "bad-spec",
                required_params: &["x"],
                optional_params: &["x"],
            }
        }

        async fn run(&self, _ctx: OperationContext<'_>) -> Result<Value, CallError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = OperationRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["create-group", "list-users"]);
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = OperationRegistry::with_builtins();
        let err = registry.register(Arc::new(ListUsersOperation)).unwrap_err();
        assert!(matches!(err, OperationError::Duplicate(_)));
    }

    #[test]
    fn test_conflicting_spec_is_rejected_at_registration() {
        let mut registry = OperationRegistry::new();
        let err = registry.register(Arc::new(BadSpecOperation)).unwrap_err();
        assert!(matches!(err, OperationError::InvalidSpec(_)));
    }

    #[test]
    fn test_missing_required_parameter() {
        let spec = CreateGroupOperation.spec();
        let err = spec.validate_params(&Map::new()).unwrap_err();
        assert!(matches!(err, OperationError::MissingParameter { .. }));
    }

    #[test]
    fn test_unknown_parameter_is_rejected() {
        let spec = ListUsersOperation.spec();
        let mut params = Map::new();
        params.insert("page_size".to_string(), Value::from(5));
        let err = spec.validate_params(&params).unwrap_err();
        assert!(matches!(err, OperationError::UnknownParameter { .. }));
    }

    #[test]
    fn test_valid_parameters_pass() {
        let spec = ListUsersOperation.spec();
        let mut params = Map::new();
        params.insert("top".to_string(), Value::from(25));
        assert!(spec.validate_params(&params).is_ok());
    }
}
