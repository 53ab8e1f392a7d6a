//! Task templates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, Kind, SpecDocument, TaskId};

/// Descriptive metadata shared by Tasks and Runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Human readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Version tag of the entity this metadata belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Free-form labels.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// A Task is a reusable, parameterized job template bound to a kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Raw kind token, `<runtime>:<task>`.
    pub kind: String,

    /// Kind-specific specification.
    #[serde(default)]
    pub spec: SpecDocument,

    #[serde(default)]
    pub metadata: Metadata,

    /// When the task was created.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Task {
    /// Create a new Task.
    pub fn new(kind: impl Into<String>, spec: SpecDocument) -> Self {
        Self {
            id: TaskId::generate(),
            kind: kind.into(),
            spec,
            metadata: Metadata::default(),
            created_at: Utc::now(),
        }
    }

    /// Builder method to set a specific ID (useful for testing).
    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = id.into();
        self
    }

    /// Builder method to set metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Parse the task's kind token.
    pub fn parsed_kind(&self) -> Result<Kind, CoreError> {
        Kind::parse(&self.kind)
    }
}
