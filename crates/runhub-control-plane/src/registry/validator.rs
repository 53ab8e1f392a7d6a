//! Spec validators and the registry that selects one per kind.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use thiserror::Error;
use tracing::{debug, warn};

use runhub_core::{Kind, Metadata, SpecDocument};

use super::SchemaSource;

/// Validator registry errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No validator registered for kind: {0}")]
    NoValidator(Kind),

    #[error("Validator already registered for kind: {0}")]
    DuplicateValidator(Kind),

    #[error("Validator '{validator}' does not implement {operation}")]
    Unimplemented {
        validator: &'static str,
        operation: &'static str,
    },

    #[error("Schema resource not found: {0}")]
    SchemaNotFound(String),

    #[error("Invalid schema '{name}': {reason}")]
    InvalidSchema { name: String, reason: String },
}

/// Capability set of a kind validator.
///
/// Implementations may support only part of it; an unsupported check fails
/// with [`ValidationError::Unimplemented`] instead of passing.
pub trait SpecValidator: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Check a spec document. `Ok(false)` means the document does not conform.
    fn validate_spec(&self, _spec: &SpecDocument) -> Result<bool, ValidationError> {
        Err(ValidationError::Unimplemented {
            validator: self.name(),
            operation: "validate_spec",
        })
    }

    /// Check entity metadata.
    fn validate_metadata(&self, _metadata: &Metadata) -> Result<bool, ValidationError> {
        Err(ValidationError::Unimplemented {
            validator: self.name(),
            operation: "validate_metadata",
        })
    }
}

/// Validates specs against a named JSON Schema resource.
///
/// The schema is resolved and compiled on first use and cached afterwards.
pub struct JsonSchemaValidator {
    schema_name: String,
    source: Arc<dyn SchemaSource>,
    compiled: OnceLock<jsonschema::Validator>,
}

impl JsonSchemaValidator {
    /// Validator for the schema resource named by convention after `kind`.
    pub fn for_kind(kind: &Kind, source: Arc<dyn SchemaSource>) -> Self {
        Self::new(kind.schema_name(), source)
    }

    pub fn new(schema_name: impl Into<String>, source: Arc<dyn SchemaSource>) -> Self {
        Self {
            schema_name: schema_name.into(),
            source,
            compiled: OnceLock::new(),
        }
    }

    pub fn schema_name(&self) -> &str {
        &self.schema_name
    }

    fn compiled(&self) -> Result<&jsonschema::Validator, ValidationError> {
        if let Some(validator) = self.compiled.get() {
            return Ok(validator);
        }
        let schema = self.source.resolve(&self.schema_name)?;
        let validator =
            jsonschema::validator_for(&schema).map_err(|e| ValidationError::InvalidSchema {
                name: self.schema_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(self.compiled.get_or_init(|| validator))
    }
}

impl SpecValidator for JsonSchemaValidator {
    fn name(&self) -> &'static str {
        "json-schema"
    }

    fn validate_spec(&self, spec: &SpecDocument) -> Result<bool, ValidationError> {
        let validator = self.compiled()?;
        let document = spec.to_value();

        let errors: Vec<String> = validator
            .iter_errors(&document)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            return Ok(true);
        }

        warn!(
            schema = %self.schema_name,
            errors = %errors.join("; "),
            "Spec failed schema validation"
        );
        Ok(false)
    }
}

/// One validator per kind, populated at startup.
#[derive(Default)]
pub struct ValidatorRegistry {
    validators: HashMap<Kind, Arc<dyn SpecValidator>>,
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the validator for `kind`. At most one is allowed per kind.
    pub fn register(
        &mut self,
        kind: Kind,
        validator: Arc<dyn SpecValidator>,
    ) -> Result<(), ValidationError> {
        if self.validators.contains_key(&kind) {
            return Err(ValidationError::DuplicateValidator(kind));
        }
        debug!(kind = %kind, validator = validator.name(), "Registered validator");
        self.validators.insert(kind, validator);
        Ok(())
    }

    /// Register a [`JsonSchemaValidator`] using the conventional schema name.
    pub fn register_schema(
        &mut self,
        kind: Kind,
        source: Arc<dyn SchemaSource>,
    ) -> Result<(), ValidationError> {
        let validator = JsonSchemaValidator::for_kind(&kind, source);
        self.register(kind, Arc::new(validator))
    }

    pub fn get(&self, kind: &Kind) -> Option<&Arc<dyn SpecValidator>> {
        self.validators.get(kind)
    }

    pub fn contains(&self, kind: &Kind) -> bool {
        self.validators.contains_key(kind)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Validate a spec with the validator registered for `kind`.
    pub fn validate_spec(&self, kind: &Kind, spec: &SpecDocument) -> Result<bool, ValidationError> {
        let validator = self
            .get(kind)
            .ok_or_else(|| ValidationError::NoValidator(kind.clone()))?;
        let valid = validator.validate_spec(spec)?;
        debug!(kind = %kind, valid, "Spec validated");
        Ok(valid)
    }

    /// Validate metadata with the validator registered for `kind`.
    pub fn validate_metadata(
        &self,
        kind: &Kind,
        metadata: &Metadata,
    ) -> Result<bool, ValidationError> {
        let validator = self
            .get(kind)
            .ok_or_else(|| ValidationError::NoValidator(kind.clone()))?;
        validator.validate_metadata(metadata)
    }
}
