//! Startup-time registries keyed by [`Kind`](runhub_core::Kind).
//!
//! Both registries are populated once during process initialization and are
//! read-only afterwards, so lookups take no locks.

pub mod factory;
pub mod schema;
pub mod validator;

pub use factory::{Builder, FactoryError, KindBuilderFactory};
pub use schema::{EmbeddedSchemas, MapSchemaSource, SchemaSource};
pub use validator::{JsonSchemaValidator, SpecValidator, ValidationError, ValidatorRegistry};
