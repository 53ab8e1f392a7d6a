//! Task -> Run builder.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use runhub_core::{CoreError, Run, RunId, RunStatus, SpecDocument, Task};

use crate::registry::Builder;

/// Source of run identifiers.
pub type IdSource = Arc<dyn Fn() -> RunId + Send + Sync>;

/// Source of creation timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Input of a run build: the task plus the caller's spec overrides.
#[derive(Debug, Clone)]
pub struct RunBuildInput {
    pub task: Task,
    pub overrides: SpecDocument,
}

impl RunBuildInput {
    pub fn new(task: Task, overrides: SpecDocument) -> Self {
        Self { task, overrides }
    }
}

/// Builds a `CREATED` run from a task.
///
/// The run spec is a copy of the task spec with the overrides merged on top
/// (shallow, overrides win). No I/O, no validation, no persistence.
#[derive(Clone)]
pub struct TaskRunBuilder {
    ids: IdSource,
    clock: Clock,
}

impl Default for TaskRunBuilder {
    fn default() -> Self {
        Self {
            ids: Arc::new(RunId::generate),
            clock: Arc::new(Utc::now),
        }
    }
}

impl TaskRunBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to replace the identifier source.
    pub fn with_id_source(mut self, ids: IdSource) -> Self {
        self.ids = ids;
        self
    }

    /// Builder method to replace the clock.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

impl Builder<RunBuildInput, Run> for TaskRunBuilder {
    fn build(&self, input: &RunBuildInput) -> Result<Run, CoreError> {
        let task_kind = input.task.parsed_kind()?;
        let spec = input.task.spec.clone().merged(&input.overrides);
        let now = (self.clock)();

        Ok(Run {
            id: (self.ids)(),
            task_id: input.task.id.clone(),
            kind: task_kind.run_kind(),
            task_kind,
            spec,
            status: RunStatus::Created,
            metadata: input.task.metadata.clone(),
            created_at: now,
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    use chrono::TimeZone;
    use serde_json::json;

    fn spec(value: serde_json::Value) -> SpecDocument {
        SpecDocument::from_value(value).unwrap()
    }

    fn dbt_task() -> Task {
        Task::new("dbt:transform", spec(json!({"query": "select 1"}))).with_id("t1")
    }

    fn deterministic_builder() -> TaskRunBuilder {
        let counter = Arc::new(AtomicU64::new(0));
        TaskRunBuilder::new()
            .with_id_source(Arc::new(move || {
                RunId::new(format!("run-{}", counter.fetch_add(1, Ordering::SeqCst)))
            }))
            .with_clock(Arc::new(|| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    }

    #[test]
    fn overrides_win_over_task_spec() {
        let builder = TaskRunBuilder::new();
        let input = RunBuildInput::new(dbt_task(), spec(json!({"query": "select 2"})));

        let run = builder.build(&input).unwrap();

        assert_eq!(run.spec.to_value(), json!({"query": "select 2"}));
        assert_eq!(run.status, RunStatus::Created);
        assert_eq!(run.task_id.as_str(), "t1");
        assert_eq!(run.kind.to_string(), "dbt:run");
        assert_eq!(run.task_kind.to_string(), "dbt:transform");
    }

    #[test]
    fn run_spec_keys_are_task_keys_union_overrides() {
        let task = Task::new(
            "nefertem:infer",
            spec(json!({"framework": "frictionless", "parallel": false, "num_worker": 1})),
        );
        let overrides = spec(json!({"num_worker": 4, "exec_args": {"limit": 10}}));
        let run = TaskRunBuilder::new()
            .build(&RunBuildInput::new(task.clone(), overrides.clone()))
            .unwrap();

        let expected: BTreeSet<&String> = task.spec.keys().chain(overrides.keys()).collect();
        let actual: BTreeSet<&String> = run.spec.keys().collect();
        assert_eq!(actual, expected);
        assert_eq!(run.spec.get("framework"), Some(&json!("frictionless")));
        assert_eq!(run.spec.get("num_worker"), Some(&json!(4)));
    }

    #[test]
    fn run_does_not_alias_task_state() {
        let mut input = RunBuildInput::new(dbt_task(), SpecDocument::new());
        let run = TaskRunBuilder::new().build(&input).unwrap();

        input.task.spec.insert("query", json!("mutated"));
        assert_eq!(run.spec.get("query"), Some(&json!("select 1")));
    }

    #[test]
    fn builds_are_deterministic_apart_from_identity() {
        let builder = deterministic_builder();
        let input = RunBuildInput::new(dbt_task(), SpecDocument::new());

        let first = builder.build(&input).unwrap();
        let second = builder.build(&input).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(Run { id: first.id.clone(), ..second }, first);
    }

    #[test]
    fn malformed_task_kind_fails() {
        let task = Task::new("dbt", SpecDocument::new());
        let err = TaskRunBuilder::new()
            .build(&RunBuildInput::new(task, SpecDocument::new()))
            .unwrap_err();
        assert_eq!(err, CoreError::MalformedKind("dbt".to_string()));
    }
}
