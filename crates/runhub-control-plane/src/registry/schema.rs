//! Schema resources addressed by name (`<runtime>-<task>-schema.json`).

use std::collections::HashMap;

use serde_json::Value;

use super::ValidationError;

const DBT_TRANSFORM_SCHEMA: &str = include_str!("../../schemas/dbt-transform-schema.json");
const NEFERTEM_SCHEMA: &str = include_str!("../../schemas/nefertem-schema.json");
const CONTAINER_SCHEMA: &str = include_str!("../../schemas/container-schema.json");

/// Resolves schema documents by resource name.
pub trait SchemaSource: Send + Sync {
    /// Look up and parse a schema.
    ///
    /// A missing resource is [`ValidationError::SchemaNotFound`]; a resource
    /// that is not valid JSON is [`ValidationError::InvalidSchema`].
    fn resolve(&self, name: &str) -> Result<Value, ValidationError>;
}

/// Schemas compiled into the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmbeddedSchemas;

impl EmbeddedSchemas {
    fn raw(name: &str) -> Option<&'static str> {
        match name {
            "dbt-transform-schema.json" => Some(DBT_TRANSFORM_SCHEMA),
            "nefertem-infer-schema.json"
            | "nefertem-validate-schema.json"
            | "nefertem-profile-schema.json"
            | "nefertem-metric-schema.json" => Some(NEFERTEM_SCHEMA),
            "container-job-schema.json"
            | "container-deploy-schema.json"
            | "container-serve-schema.json" => Some(CONTAINER_SCHEMA),
            _ => None,
        }
    }
}

impl SchemaSource for EmbeddedSchemas {
    fn resolve(&self, name: &str) -> Result<Value, ValidationError> {
        let raw = Self::raw(name).ok_or_else(|| ValidationError::SchemaNotFound(name.to_string()))?;
        serde_json::from_str(raw).map_err(|e| ValidationError::InvalidSchema {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

/// In-memory schema catalog, for deployments that load schemas at startup.
#[derive(Debug, Default, Clone)]
pub struct MapSchemaSource {
    schemas: HashMap<String, Value>,
}

impl MapSchemaSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a schema under `name`.
    pub fn with_schema(mut self, name: impl Into<String>, schema: Value) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }
}

impl SchemaSource for MapSchemaSource {
    fn resolve(&self, name: &str) -> Result<Value, ValidationError> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| ValidationError::SchemaNotFound(name.to_string()))
    }
}
