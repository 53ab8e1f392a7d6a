//! Run orchestration: build, validate, persist and dispatch runs.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use runhub_core::{Kind, Page, PageRequest, Run, RunExecRequest, RunId, RunStatus};

use crate::builder::{RunBuildInput, RunBuilderFactory};
use crate::config::Config;
use crate::dispatch::{DispatchMessage, Dispatcher};
use crate::error::ServiceError;
use crate::idempotency::{IdempotencyLedger, IdempotencyRecord};
use crate::registry::{ValidationError, ValidatorRegistry};
use crate::store::{RunStore, StoreError, TaskStore};

/// Run orchestration service.
///
/// Builder and validator registries are read-only once the service is
/// constructed; the run store is the only shared mutable resource.
pub struct RunService {
    tasks: Arc<dyn TaskStore>,
    runs: Arc<dyn RunStore>,
    builders: Arc<RunBuilderFactory>,
    validators: Arc<ValidatorRegistry>,
    dispatcher: Arc<dyn Dispatcher>,
    idempotency: IdempotencyLedger,
    config: Config,
}

impl RunService {
    /// Create a new RunService with the default configuration.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        runs: Arc<dyn RunStore>,
        builders: Arc<RunBuilderFactory>,
        validators: Arc<ValidatorRegistry>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            tasks,
            runs,
            builders,
            validators,
            dispatcher,
            idempotency: IdempotencyLedger::new(),
            config: Config::default(),
        }
    }

    /// Builder method to set the configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Create a run from a task and dispatch it.
    ///
    /// Requests carrying an idempotency key that already produced a run
    /// return that run without creating or dispatching anything. Reusing a
    /// key for a different task or different overrides is rejected.
    pub async fn create_run(&self, request: RunExecRequest) -> Result<Run, ServiceError> {
        let Some(key) = request.idempotency_key.clone() else {
            return self.create_and_dispatch(request).await;
        };

        loop {
            let slot = self.idempotency.slot(&key);
            let mut record = slot.lock().await;
            // Released or evicted while this request waited.
            if !self.idempotency.is_current(&key, &slot) {
                continue;
            }

            if let Some(existing) = record.as_ref() {
                if !existing.matches(&request) {
                    warn!(
                        idempotency_key = %key,
                        task_id = %request.task_id,
                        "Idempotency key reused for a different request"
                    );
                    return Err(ServiceError::ValidationFailed(format!(
                        "idempotency key {key} was already used for a different request"
                    )));
                }
                if let Some(run) = self.find(&existing.run_id).await? {
                    info!(
                        run_id = %run.id,
                        idempotency_key = %key,
                        "Returning existing run for idempotency key"
                    );
                    return Ok(run);
                }
                debug!(
                    run_id = %existing.run_id,
                    idempotency_key = %key,
                    "Keyed run was deleted, creating again"
                );
            }

            return match self.create_and_dispatch(request.clone()).await {
                Ok(run) => {
                    *record = Some(IdempotencyRecord::new(&request, run.id.clone()));
                    Ok(run)
                }
                Err(e) => {
                    *record = None;
                    self.idempotency.release(&key, &slot);
                    Err(e)
                }
            };
        }
    }

    async fn create_and_dispatch(&self, request: RunExecRequest) -> Result<Run, ServiceError> {
        let task_id = request.task_id;

        let task = self
            .tasks
            .get_task(&task_id)
            .await
            .map_err(|e| {
                error!(task_id = %task_id, error = %e, "Task lookup failed");
                ServiceError::internal()
            })?
            .ok_or_else(|| ServiceError::TaskNotFound(task_id.clone()))?;

        let kind = task.parsed_kind().map_err(|e| {
            error!(task_id = %task_id, error = %e, "Task carries a malformed kind");
            ServiceError::internal()
        })?;

        let builder = self.builders.get_builder(&kind).map_err(|e| {
            error!(task_id = %task_id, error = %e, "No run builder for task kind");
            ServiceError::internal()
        })?;

        // Overrides are merged before persistence: the stored run, the
        // returned run and the dispatched spec are the same document.
        let run = builder
            .build(&RunBuildInput::new(task, request.spec_overrides))
            .map_err(|e| {
                error!(task_id = %task_id, kind = %kind, error = %e, "Run build failed");
                ServiceError::internal()
            })?;

        self.validate(&kind, &run)?;

        let stored = self.runs.save(run).await.map_err(|e| {
            error!(task_id = %task_id, error = %e, "Failed to persist run");
            ServiceError::internal()
        })?;

        info!(
            run_id = %stored.id,
            task_id = %task_id,
            kind = %kind,
            "Run created"
        );

        Ok(self.dispatch(stored).await)
    }

    fn validate(&self, kind: &Kind, run: &Run) -> Result<(), ServiceError> {
        match self.validators.validate_spec(kind, &run.spec) {
            Ok(true) => Ok(()),
            Ok(false) => Err(ServiceError::ValidationFailed(format!(
                "spec does not conform to the schema for kind {kind}"
            ))),
            Err(ValidationError::NoValidator(_)) if !self.config.require_validator => {
                debug!(kind = %kind, "No validator registered, skipping spec validation");
                Ok(())
            }
            Err(e) => {
                error!(kind = %kind, error = %e, "Spec validation could not run");
                Err(ServiceError::internal())
            }
        }
    }

    /// Mark a persisted run submitted and publish its dispatch message.
    ///
    /// The run is `SUBMITTED` before any executor can see the message. A
    /// publish failure moves it back to `CREATED` and is only logged.
    async fn dispatch(&self, stored: Run) -> Run {
        let submitted = match self
            .runs
            .transition(&stored.id, RunStatus::Created, RunStatus::Submitted)
            .await
        {
            Ok(Some(submitted)) => submitted,
            Ok(None) => {
                warn!(run_id = %stored.id, "Run left CREATED before dispatch; not publishing");
                return self.current_or(stored).await;
            }
            Err(e) => {
                error!(
                    run_id = %stored.id,
                    error = %e,
                    "Failed to record submission; run persisted but not dispatched"
                );
                return stored;
            }
        };

        match self.dispatcher.publish(DispatchMessage::from(&submitted)).await {
            Ok(()) => {
                info!(run_id = %submitted.id, "Run submitted");
                submitted
            }
            Err(e) => {
                error!(
                    run_id = %submitted.id,
                    error = %e,
                    "Dispatch failed; run persisted but not submitted"
                );
                self.revert_submission(submitted).await
            }
        }
    }

    async fn revert_submission(&self, submitted: Run) -> Run {
        match self
            .runs
            .transition(&submitted.id, RunStatus::Submitted, RunStatus::Created)
            .await
        {
            Ok(Some(reverted)) => {
                warn!(run_id = %reverted.id, "Submission reverted, run is CREATED");
                reverted
            }
            Ok(None) => {
                warn!(run_id = %submitted.id, "Run moved on before submission could be reverted");
                self.current_or(submitted).await
            }
            Err(e) => {
                error!(run_id = %submitted.id, error = %e, "Failed to revert submission");
                submitted
            }
        }
    }

    /// The stored version of `fallback`, or `fallback` if it cannot be read.
    async fn current_or(&self, fallback: Run) -> Run {
        match self.runs.find_by_id(&fallback.id).await {
            Ok(Some(current)) => current,
            Ok(None) => fallback,
            Err(e) => {
                warn!(run_id = %fallback.id, error = %e, "Failed to re-read run");
                fallback
            }
        }
    }

    /// Get a run by id.
    pub async fn get_run(&self, id: &RunId) -> Result<Run, ServiceError> {
        self.find(id)
            .await?
            .ok_or_else(|| ServiceError::RunNotFound(id.clone()))
    }

    /// List runs, one page at a time.
    pub async fn get_runs(&self, request: PageRequest) -> Result<Page<Run>, ServiceError> {
        let request = self.normalize(request);
        self.runs.find_all(request).await.map_err(|e| {
            error!(error = %e, "Failed to list runs");
            ServiceError::internal()
        })
    }

    /// Delete a run. Returns false if it did not exist.
    pub async fn delete_run(&self, id: &RunId) -> Result<bool, ServiceError> {
        let deleted = self.runs.delete_by_id(id).await.map_err(|e| {
            error!(run_id = %id, error = %e, "Failed to delete run");
            ServiceError::internal()
        })?;
        info!(run_id = %id, deleted, "Run delete requested");
        Ok(deleted)
    }

    /// Persist a caller-provided run.
    ///
    /// A new run is validated against its task kind before it is written.
    /// An existing run only accepts metadata changes and a legal status
    /// transition; its task, kinds, spec and creation time are fixed. Both
    /// writes are conditional on the record the checks were made against.
    pub async fn save(&self, run: Run) -> Result<Run, ServiceError> {
        match self.find(&run.id).await? {
            None => self.save_new(run).await,
            Some(existing) => self.save_existing(existing, run).await,
        }
    }

    async fn save_new(&self, run: Run) -> Result<Run, ServiceError> {
        if run.kind != run.task_kind.run_kind() {
            return Err(ServiceError::ValidationFailed(format!(
                "run kind {} does not match task kind {}",
                run.kind, run.task_kind
            )));
        }
        self.validate(&run.task_kind, &run)?;

        let inserted = self
            .runs
            .insert(run.clone())
            .await
            .map_err(|e| save_error(&run.id, e))?;
        if !inserted {
            return Err(ServiceError::ValidationFailed(format!(
                "run {} was created concurrently",
                run.id
            )));
        }

        info!(run_id = %run.id, kind = %run.task_kind, "Run saved");
        Ok(run)
    }

    async fn save_existing(&self, existing: Run, mut run: Run) -> Result<Run, ServiceError> {
        let fixed = fixed_field_changes(&existing, &run);
        if !fixed.is_empty() {
            return Err(ServiceError::ValidationFailed(format!(
                "run {} cannot change {}",
                run.id,
                fixed.join(", ")
            )));
        }
        if run.status != existing.status && !existing.status.can_transition_to(run.status) {
            return Err(ServiceError::InvalidTransition {
                from: existing.status,
                to: run.status,
            });
        }

        run.updated_at = Utc::now();
        let replaced = self
            .runs
            .replace(&existing, run.clone())
            .await
            .map_err(|e| save_error(&run.id, e))?;
        if !replaced {
            return Err(ServiceError::ValidationFailed(format!(
                "run {} was modified concurrently",
                run.id
            )));
        }

        info!(run_id = %run.id, status = %run.status, "Run saved");
        Ok(run)
    }

    /// Status update path used by executors.
    pub async fn update_status(&self, id: &RunId, next: RunStatus) -> Result<Run, ServiceError> {
        let current = self.get_run(id).await?;
        if !current.status.can_transition_to(next) {
            return Err(ServiceError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }

        let updated = self
            .runs
            .transition(id, current.status, next)
            .await
            .map_err(|e| {
                error!(run_id = %id, error = %e, "Failed to update run status");
                ServiceError::internal()
            })?;

        match updated {
            Some(run) => {
                info!(run_id = %id, from = %current.status, to = %next, "Run status updated");
                Ok(run)
            }
            None => {
                // Lost a race with another update; report against the fresh state.
                let fresh = self.get_run(id).await?;
                Err(ServiceError::InvalidTransition {
                    from: fresh.status,
                    to: next,
                })
            }
        }
    }

    async fn find(&self, id: &RunId) -> Result<Option<Run>, ServiceError> {
        self.runs.find_by_id(id).await.map_err(|e| {
            error!(run_id = %id, error = %e, "Failed to read run");
            ServiceError::internal()
        })
    }

    fn normalize(&self, mut request: PageRequest) -> PageRequest {
        if request.size == 0 {
            request.size = self.config.default_page_size;
        }
        request.size = request.size.min(self.config.max_page_size.max(1));
        request
    }
}

fn save_error(id: &RunId, e: StoreError) -> ServiceError {
    error!(run_id = %id, error = %e, "Failed to save run");
    ServiceError::RunSaveError(e.to_string())
}

/// Names of the fields that differ between `existing` and `run` but are
/// fixed once a run is created.
fn fixed_field_changes(existing: &Run, run: &Run) -> Vec<&'static str> {
    let mut changed = Vec::new();
    if existing.task_id != run.task_id {
        changed.push("task_id");
    }
    if existing.kind != run.kind {
        changed.push("kind");
    }
    if existing.task_kind != run.task_kind {
        changed.push("task_kind");
    }
    if existing.spec != run.spec {
        changed.push("spec");
    }
    if existing.created_at != run.created_at {
        changed.push("created_at");
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{builtin_run_builders, builtin_validators};
    use crate::dispatch::{self, DispatchReceiver};
    use crate::registry::EmbeddedSchemas;
    use crate::store::{InMemoryRunStore, InMemoryTaskStore};
    use runhub_core::{SpecDocument, Task, TaskId};
    use serde_json::json;

    fn spec(value: serde_json::Value) -> SpecDocument {
        SpecDocument::from_value(value).unwrap()
    }

    fn service(tasks: Vec<Task>) -> (RunService, Arc<InMemoryRunStore>, DispatchReceiver) {
        let runs = Arc::new(InMemoryRunStore::new());
        let (dispatcher, receiver) = dispatch::channel(16);
        let service = RunService::new(
            Arc::new(InMemoryTaskStore::with_tasks(tasks)),
            runs.clone(),
            Arc::new(builtin_run_builders().unwrap()),
            Arc::new(builtin_validators(Arc::new(EmbeddedSchemas)).unwrap()),
            Arc::new(dispatcher),
        );
        (service, runs, receiver)
    }

    fn dbt_task() -> Task {
        Task::new("dbt:transform", spec(json!({"query": "select 1"}))).with_id("t1")
    }

    #[tokio::test]
    async fn create_run_merges_overrides_and_submits() {
        let (service, _runs, mut receiver) = service(vec![dbt_task()]);

        let run = service
            .create_run(
                RunExecRequest::new("t1").with_overrides(spec(json!({"query": "select 2"}))),
            )
            .await
            .unwrap();

        assert_eq!(run.spec.to_value(), json!({"query": "select 2"}));
        assert_eq!(run.status, RunStatus::Submitted);

        let message = receiver.try_recv().unwrap();
        assert_eq!(message.run_id, run.id);
        assert_eq!(message.spec, run.spec);
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let (service, runs, mut receiver) = service(vec![]);

        let err = service.create_run(RunExecRequest::new("nope")).await.unwrap_err();

        assert!(matches!(err, ServiceError::TaskNotFound(_)));
        assert!(runs.is_empty().await);
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn malformed_kind_is_internal() {
        let task = Task::new("dbt-transform", SpecDocument::new()).with_id("bad");
        let (service, runs, _receiver) = service(vec![task]);

        let err = service.create_run(RunExecRequest::new("bad")).await.unwrap_err();

        assert_eq!(err, ServiceError::internal());
        assert!(runs.is_empty().await);
    }

    #[tokio::test]
    async fn invalid_spec_is_rejected_before_persisting() {
        let task = Task::new("nefertem:infer", spec(json!({"parallel": true}))).with_id("t2");
        let (service, runs, mut receiver) = service(vec![task]);

        let err = service.create_run(RunExecRequest::new("t2")).await.unwrap_err();

        assert!(matches!(err, ServiceError::ValidationFailed(_)));
        assert!(err.is_user_error());
        assert!(runs.is_empty().await);
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn kinds_without_validator_follow_config() {
        let task = Task::new("mlrun:job", SpecDocument::new()).with_id("t3");

        let (lenient, _, _rx) = service(vec![task.clone()]);
        assert!(lenient.create_run(RunExecRequest::new("t3")).await.is_ok());

        let (strict, runs, _rx) = service(vec![task]);
        let strict = strict.with_config(Config {
            require_validator: true,
            ..Config::default()
        });
        let err = strict.create_run(RunExecRequest::new("t3")).await.unwrap_err();
        assert_eq!(err, ServiceError::internal());
        assert!(runs.is_empty().await);
    }

    #[tokio::test]
    async fn failed_dispatch_keeps_run_created() {
        let (service, runs, receiver) = service(vec![dbt_task()]);
        drop(receiver);

        let run = service.create_run(RunExecRequest::new("t1")).await.unwrap();

        assert_eq!(run.status, RunStatus::Created);
        let stored = runs.find_by_id(&run.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Created);
    }

    #[tokio::test]
    async fn get_runs_clamps_page_size() {
        let (service, _runs, _rx) = service(vec![dbt_task()]);
        for _ in 0..3 {
            service.create_run(RunExecRequest::new("t1")).await.unwrap();
        }

        let page = service.get_runs(PageRequest::new(0, 0)).await.unwrap();
        assert_eq!(page.size, 20);
        assert_eq!(page.content.len(), 3);

        let page = service.get_runs(PageRequest::new(0, 10_000)).await.unwrap();
        assert_eq!(page.size, 100);
    }

    #[tokio::test]
    async fn save_rejects_spec_changes() {
        let (service, _runs, _rx) = service(vec![dbt_task()]);
        let run = service.create_run(RunExecRequest::new("t1")).await.unwrap();

        let mut changed = run.clone();
        changed.spec.insert("query", json!("drop table x"));
        let err = service.save(changed).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(_)));

        let mut relabeled = run.clone();
        relabeled.metadata.labels.insert("team".into(), "data".into());
        let saved = service.save(relabeled).await.unwrap();
        assert_eq!(saved.metadata.labels.get("team").map(String::as_str), Some("data"));
    }

    #[tokio::test]
    async fn save_keeps_identity_fields_fixed() {
        let (service, runs, _rx) = service(vec![dbt_task()]);
        let run = service.create_run(RunExecRequest::new("t1")).await.unwrap();

        let mut forged = run.clone();
        forged.task_id = TaskId::new("someone-else");
        forged.task_kind = Kind::parse("mlrun:job").unwrap();
        let err = service.save(forged).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::ValidationFailed(format!("run {} cannot change task_id, task_kind", run.id))
        );

        let stored = runs.find_by_id(&run.id).await.unwrap().unwrap();
        assert_eq!(stored, run);
    }

    #[tokio::test]
    async fn save_only_moves_status_forward() {
        let (service, _runs, _rx) = service(vec![dbt_task()]);
        let run = service.create_run(RunExecRequest::new("t1")).await.unwrap();

        let mut running = run.clone();
        running.status = RunStatus::Running;
        let running = service.save(running).await.unwrap();
        assert_eq!(running.status, RunStatus::Running);

        let mut back = running.clone();
        back.status = RunStatus::Created;
        let err = service.save(back).await.unwrap_err();
        assert_eq!(
            err,
            ServiceError::InvalidTransition {
                from: RunStatus::Running,
                to: RunStatus::Created
            }
        );
    }

    #[tokio::test]
    async fn save_validates_new_runs_before_writing() {
        let (service, runs, mut receiver) = service(vec![]);
        let kind = Kind::parse("dbt:transform").unwrap();
        let now = chrono::Utc::now();
        let run = Run {
            id: RunId::new("r-new"),
            task_id: TaskId::new("t1"),
            kind: kind.run_kind(),
            task_kind: kind,
            spec: spec(json!({"not_a_query": 1})),
            status: RunStatus::Created,
            metadata: Default::default(),
            created_at: now,
            updated_at: now,
        };

        let err = service.save(run.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(_)));
        assert!(runs.is_empty().await);

        let mut valid = run;
        valid.spec = spec(json!({"query": "select 1"}));
        let saved = service.save(valid.clone()).await.unwrap();
        assert_eq!(saved, valid);
        assert_eq!(runs.len().await, 1);
        assert!(receiver.try_recv().is_none());
    }

    #[tokio::test]
    async fn reused_key_must_match_the_first_request() {
        let mlrun = Task::new("mlrun:job", SpecDocument::new()).with_id("t3");
        let (service, runs, _rx) = service(vec![dbt_task(), mlrun]);

        let first = service
            .create_run(RunExecRequest::new("t1").with_idempotency_key("k"))
            .await
            .unwrap();

        let err = service
            .create_run(RunExecRequest::new("t3").with_idempotency_key("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(_)));

        let err = service
            .create_run(
                RunExecRequest::new("t1")
                    .with_overrides(spec(json!({"query": "select 2"})))
                    .with_idempotency_key("k"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ValidationFailed(_)));

        let again = service
            .create_run(RunExecRequest::new("t1").with_idempotency_key("k"))
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(runs.len().await, 1);
    }

    #[tokio::test]
    async fn failed_keyed_create_leaves_no_trace() {
        let (service, _runs, _rx) = service(vec![dbt_task()]);

        let err = service
            .create_run(RunExecRequest::new("missing").with_idempotency_key("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TaskNotFound(_)));
        assert!(service.idempotency.is_empty());

        // The key is free for a different request now.
        let run = service
            .create_run(RunExecRequest::new("t1").with_idempotency_key("k"))
            .await
            .unwrap();
        assert_eq!(run.task_id, TaskId::new("t1"));
        assert_eq!(service.idempotency.len(), 1);
    }

    #[tokio::test]
    async fn update_status_enforces_lifecycle() {
        let (service, _runs, _rx) = service(vec![dbt_task()]);
        let run = service.create_run(RunExecRequest::new("t1")).await.unwrap();

        let running = service.update_status(&run.id, RunStatus::Running).await.unwrap();
        assert_eq!(running.status, RunStatus::Running);

        let err = service
            .update_status(&run.id, RunStatus::Submitted)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::InvalidTransition {
                from: RunStatus::Running,
                to: RunStatus::Submitted
            }
        );
    }
}
