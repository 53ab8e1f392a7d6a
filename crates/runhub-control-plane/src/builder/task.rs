//! Task -> Task builder admitting a task into the store.

use uuid::Uuid;

use runhub_core::{CoreError, Task};

use crate::registry::Builder;

/// Prepares a task for storage.
///
/// The kind token must parse, and a task without a version tag gets a fresh
/// one so that runs can tell task revisions apart. Identity, spec and
/// creation time are kept.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaskVersionBuilder;

impl Builder<Task, Task> for TaskVersionBuilder {
    fn build(&self, source: &Task) -> Result<Task, CoreError> {
        // Reject tokens that could never be dispatched.
        source.parsed_kind()?;

        let mut next = source.clone();
        if next.metadata.version.is_none() {
            next.metadata.version = Some(Uuid::new_v4().to_string());
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runhub_core::{Metadata, SpecDocument};
    use serde_json::json;

    #[test]
    fn unversioned_task_gets_a_version() {
        let spec = SpecDocument::from_value(json!({"image": "busybox"})).unwrap();
        let task = Task::new("container:job", spec.clone()).with_id("t1");

        let next = TaskVersionBuilder.build(&task).unwrap();

        assert_eq!(next.id, task.id);
        assert_eq!(next.kind, task.kind);
        assert_eq!(next.spec, spec);
        assert!(next.metadata.version.is_some());
    }

    #[test]
    fn existing_version_is_kept() {
        let task = Task::new("container:job", SpecDocument::new()).with_metadata(Metadata {
            version: Some("3".into()),
            ..Metadata::default()
        });

        let next = TaskVersionBuilder.build(&task).unwrap();
        assert_eq!(next, task);
    }

    #[test]
    fn malformed_kind_is_rejected() {
        let task = Task::new("container", SpecDocument::new());
        assert!(TaskVersionBuilder.build(&task).is_err());
    }
}
