//! RunHub Control Plane
//!
//! Boots the run pipeline with in-memory stores, seeds tasks from a JSON
//! file, creates runs for the requested tasks and logs what the dispatch
//! channel hands to executors.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use runhub_control_plane::builder::{
    builtin_run_builders, builtin_task_builders, builtin_validators, TaskBuilderFactory,
};
use runhub_control_plane::registry::EmbeddedSchemas;
use runhub_control_plane::{
    dispatch, metrics, Config, InMemoryRunStore, InMemoryTaskStore, RunService,
};
use runhub_core::{RunExecRequest, SpecDocument, Task};

/// RunHub control plane
#[derive(Parser)]
#[command(name = "runhub-control-plane")]
#[command(about = "Create and dispatch runs for pipeline tasks", long_about = None)]
struct Cli {
    /// JSON file holding an array of tasks to seed the task store with
    #[arg(long, env = "RUNHUB_TASKS_FILE")]
    tasks_file: Option<PathBuf>,

    /// Task id to create a run for (repeatable)
    #[arg(long = "run", value_name = "TASK_ID")]
    runs: Vec<String>,

    /// JSON object merged over each task spec
    #[arg(long)]
    overrides: Option<String>,

    /// Capacity of the dispatch queue
    #[arg(long, env = "RUNHUB_DISPATCH_CAPACITY")]
    dispatch_capacity: Option<usize>,

    /// Fail run creation for kinds without a registered validator
    #[arg(long, env = "RUNHUB_REQUIRE_VALIDATOR")]
    require_validator: bool,

    /// Log level used when RUST_LOG is unset
    #[arg(long, env = "RUNHUB_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    fn config(&self) -> Config {
        let defaults = Config::default();
        Config {
            dispatch_capacity: self.dispatch_capacity.unwrap_or(defaults.dispatch_capacity),
            require_validator: self.require_validator,
            log_level: self.log_level.clone().unwrap_or(defaults.log_level.clone()),
            ..defaults
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = cli.config();

    // Initialize tracing
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Seed tasks
    let tasks: Vec<Task> = match &cli.tasks_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                format!("Failed to read tasks file '{}': {}", path.display(), e)
            })?;
            serde_json::from_str(&raw).map_err(|e| {
                format!("Failed to parse tasks file '{}': {}", path.display(), e)
            })?
        }
        None => Vec::new(),
    };
    let tasks = admit_tasks(&builtin_task_builders()?, tasks);
    info!(tasks = tasks.len(), "Task store seeded");

    let overrides = match &cli.overrides {
        Some(raw) => SpecDocument::from_value(serde_json::from_str(raw)?)?,
        None => SpecDocument::new(),
    };

    // Registries are populated once, before any request is served
    let builders = builtin_run_builders()?;
    let validators = builtin_validators(Arc::new(EmbeddedSchemas))?;
    info!(
        kinds = ?builders.kinds().iter().map(|k| k.to_string()).collect::<Vec<_>>(),
        validators = validators.len(),
        "Kinds registered"
    );

    let (dispatcher, mut receiver) = dispatch::channel(config.dispatch_capacity);
    let consumer = tokio::spawn(async move {
        while let Some(message) = receiver.recv().await {
            info!(
                run_id = %message.run_id,
                task_id = %message.task_id,
                kind = %message.kind,
                "Run ready for execution"
            );
        }
    });

    let runs = Arc::new(InMemoryRunStore::new());
    let service = RunService::new(
        Arc::new(InMemoryTaskStore::with_tasks(tasks)),
        runs.clone(),
        Arc::new(builders),
        Arc::new(validators),
        Arc::new(dispatcher),
    )
    .with_config(config);

    for task_id in &cli.runs {
        let request = RunExecRequest::new(task_id.as_str()).with_overrides(overrides.clone());
        match service.create_run(request).await {
            Ok(run) => println!("{}", serde_json::to_string_pretty(&run)?),
            Err(e) => error!(task_id = %task_id, error = %e, "Failed to create run"),
        }
    }

    // Closing the service closes the dispatch channel and ends the consumer
    drop(service);
    if let Err(e) = consumer.await {
        error!(error = %e, "Dispatch consumer panicked");
    }

    info!("{}", metrics::collect_metrics(runs.as_ref()).await?);

    Ok(())
}

/// Run each seeded task through the builder for its kind, dropping tasks
/// whose kind is malformed or unknown.
fn admit_tasks(builders: &TaskBuilderFactory, tasks: Vec<Task>) -> Vec<Task> {
    tasks
        .into_iter()
        .filter_map(|task| {
            let admitted = task
                .parsed_kind()
                .map_err(|e| e.to_string())
                .and_then(|kind| builders.get_builder(&kind).map_err(|e| e.to_string()))
                .and_then(|builder| builder.build(&task).map_err(|e| e.to_string()));
            match admitted {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(task_id = %task.id, kind = %task.kind, error = %e, "Skipping seeded task");
                    None
                }
            }
        })
        .collect()
}
