//! Kinds shipped with the control plane.
//!
//! Each kind is one flat registration. Adding a kind means adding a row here
//! (or registering it from the embedding binary); the run service is not
//! touched.

use std::sync::Arc;

use runhub_core::Kind;

use super::{RunBuilderFactory, TaskBuilderFactory, TaskRunBuilder, TaskVersionBuilder};
use crate::registry::{FactoryError, SchemaSource, ValidationError, ValidatorRegistry};

/// Built-in kinds and whether a schema validator ships for them.
pub const BUILTIN_KINDS: &[(&str, bool)] = &[
    ("dbt:transform", true),
    ("nefertem:infer", true),
    ("nefertem:validate", true),
    ("nefertem:profile", true),
    ("nefertem:metric", true),
    ("mlrun:job", false),
    ("container:job", true),
    ("container:deploy", true),
    ("container:serve", true),
];

fn builtin_kinds() -> impl Iterator<Item = (Kind, bool)> {
    BUILTIN_KINDS.iter().filter_map(|(token, validated)| {
        Kind::parse(token).ok().map(|kind| (kind, *validated))
    })
}

/// Task -> Run builders for every built-in kind.
pub fn builtin_run_builders() -> Result<RunBuilderFactory, FactoryError> {
    let mut factory = RunBuilderFactory::new();
    let builder = Arc::new(TaskRunBuilder::new());
    for (kind, _) in builtin_kinds() {
        factory.register(kind, builder.clone())?;
    }
    Ok(factory)
}

/// Task -> Task admission builders for every built-in kind.
pub fn builtin_task_builders() -> Result<TaskBuilderFactory, FactoryError> {
    let mut factory = TaskBuilderFactory::new();
    for (kind, _) in builtin_kinds() {
        factory.register(kind, Arc::new(TaskVersionBuilder))?;
    }
    Ok(factory)
}

/// Schema validators for the built-in kinds that have one.
pub fn builtin_validators(
    source: Arc<dyn SchemaSource>,
) -> Result<ValidatorRegistry, ValidationError> {
    let mut registry = ValidatorRegistry::new();
    for (kind, validated) in builtin_kinds() {
        if validated {
            registry.register_schema(kind, source.clone())?;
        }
    }
    Ok(registry)
}
