//! RunHub Control Plane Library
//!
//! This crate turns Tasks into validated, persisted Runs and signals
//! executors that they are ready, via:
//! - kind-keyed builder and validator registries
//! - run and task storage boundaries
//! - an asynchronous dispatch channel
//! - the run orchestration service tying them together

pub mod builder;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod idempotency;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod store;

pub use config::Config;
pub use dispatch::{ChannelDispatcher, DispatchMessage, DispatchReceiver, Dispatcher};
pub use error::ServiceError;
pub use registry::{KindBuilderFactory, ValidatorRegistry};
pub use service::RunService;
pub use store::{InMemoryRunStore, InMemoryTaskStore, RunStore, TaskStore};
