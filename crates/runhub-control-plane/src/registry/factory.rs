//! Kind-keyed builder factory.
//!
//! The factory is generic over what is being built: the same type resolves
//! Task -> Run builders for run creation and Task -> Task builders for task
//! versioning.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use runhub_core::{CoreError, Kind};

/// Factory errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FactoryError {
    #[error("No builder registered for kind: {0}")]
    KindNotFound(Kind),

    #[error("Builder already registered for kind: {0}")]
    DuplicateKind(Kind),
}

/// Pure transformation from a source artifact to a target artifact.
pub trait Builder<S, T>: Send + Sync {
    fn build(&self, source: &S) -> Result<T, CoreError>;
}

/// Builders registered by kind. Exactly one builder per kind; no wildcard.
pub struct KindBuilderFactory<S, T> {
    builders: HashMap<Kind, Arc<dyn Builder<S, T>>>,
}

impl<S, T> Default for KindBuilderFactory<S, T> {
    fn default() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }
}

impl<S, T> KindBuilderFactory<S, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the builder for `kind`.
    pub fn register(
        &mut self,
        kind: Kind,
        builder: Arc<dyn Builder<S, T>>,
    ) -> Result<(), FactoryError> {
        if self.builders.contains_key(&kind) {
            return Err(FactoryError::DuplicateKind(kind));
        }
        debug!(kind = %kind, "Registered builder");
        self.builders.insert(kind, builder);
        Ok(())
    }

    /// Resolve the builder for `kind`.
    pub fn get_builder(&self, kind: &Kind) -> Result<Arc<dyn Builder<S, T>>, FactoryError> {
        self.builders
            .get(kind)
            .cloned()
            .ok_or_else(|| FactoryError::KindNotFound(kind.clone()))
    }

    pub fn contains(&self, kind: &Kind) -> bool {
        self.builders.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&Kind> {
        let mut kinds: Vec<&Kind> = self.builders.keys().collect();
        kinds.sort();
        kinds
    }
}
