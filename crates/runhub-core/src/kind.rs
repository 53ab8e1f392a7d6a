//! Kind tokens: the `(runtime, task)` pair that selects builders and validators.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Separator between the runtime and task parts of a kind token.
pub const KIND_SEPARATOR: char = ':';

/// Task part of the kind assigned to runs produced by a runtime.
pub const RUN_TASK: &str = "run";

/// Composite kind identifier, e.g. `dbt:transform`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Kind {
    runtime: String,
    task: String,
}

impl Kind {
    /// Build a kind from its two parts.
    ///
    /// Both parts must be non-empty and must not contain the separator.
    pub fn new(runtime: impl Into<String>, task: impl Into<String>) -> Result<Self, CoreError> {
        let runtime = runtime.into();
        let task = task.into();
        if runtime.is_empty()
            || task.is_empty()
            || runtime.contains(KIND_SEPARATOR)
            || task.contains(KIND_SEPARATOR)
        {
            return Err(CoreError::MalformedKind(format!(
                "{runtime}{KIND_SEPARATOR}{task}"
            )));
        }
        Ok(Self { runtime, task })
    }

    /// Parse a `<runtime>:<task>` token.
    pub fn parse(token: &str) -> Result<Self, CoreError> {
        let (runtime, task) = token
            .split_once(KIND_SEPARATOR)
            .ok_or_else(|| CoreError::MalformedKind(token.to_string()))?;
        Self::new(runtime, task).map_err(|_| CoreError::MalformedKind(token.to_string()))
    }

    /// Runtime part (e.g. `dbt`).
    pub fn runtime(&self) -> &str {
        &self.runtime
    }

    /// Task part (e.g. `transform`).
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Kind carried by runs produced from this kind (`<runtime>:run`).
    pub fn run_kind(&self) -> Kind {
        Kind {
            runtime: self.runtime.clone(),
            task: RUN_TASK.to_string(),
        }
    }

    /// Name of the schema resource for this kind: `<runtime>-<task>-schema.json`.
    pub fn schema_name(&self) -> String {
        format!("{}-{}-schema.json", self.runtime, self.task)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.runtime, KIND_SEPARATOR, self.task)
    }
}

impl FromStr for Kind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Kind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Kind> for String {
    fn from(kind: Kind) -> Self {
        kind.to_string()
    }
}
