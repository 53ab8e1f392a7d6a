//! Builders that turn Tasks into Runs (and new Task versions).

pub mod builtin;
pub mod run;
pub mod task;

pub use builtin::{builtin_run_builders, builtin_task_builders, builtin_validators, BUILTIN_KINDS};
pub use run::{Clock, IdSource, RunBuildInput, TaskRunBuilder};
pub use task::TaskVersionBuilder;

use runhub_core::{Run, Task};

use crate::registry::KindBuilderFactory;

/// Factory resolving Task -> Run builders.
pub type RunBuilderFactory = KindBuilderFactory<RunBuildInput, Run>;

/// Factory resolving the Task -> Task builders that admit seeded tasks.
pub type TaskBuilderFactory = KindBuilderFactory<Task, Task>;
