//! RunHub Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Storage backends
//! - Dispatch transports
//! - Runtime specifics
//!
//! Tasks, Runs and the kind tokens that tie them to a runtime all live here.

pub mod error;
pub mod ids;
pub mod kind;
pub mod page;
pub mod run;
pub mod spec;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use ids::{RunId, TaskId};
pub use kind::Kind;
pub use page::{Page, PageRequest, Sort};
pub use run::{Run, RunExecRequest};
pub use spec::SpecDocument;
pub use status::RunStatus;
pub use task::{Metadata, Task};
