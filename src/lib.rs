//! Vigil - Check Dispatch & Queue Reconciliation Core
//!
//! Vigil dispatches user-defined automated checks (browser scripts and
//! load-test scripts) onto a distributed work queue, tracks each run's
//! lifecycle from submission through completion, and continuously reconciles
//! the run store's view of "what is running" against live broker state.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, port traits, and domain errors
//! - **Service Layer** (`services`): admission, dispatch, run lifecycle,
//!   reconciliation
//! - **Adapters** (`adapters`): SQLite run store, queue broker clients,
//!   variable resolver, event sinks
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use vigil::services::Dispatcher;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Wire adapters and dispatch a check
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DispatchError, DomainError, DomainResult};
pub use domain::models::{
    CheckTask, Config, ExecutionProfile, ProjectScope, QueueClass, Run, RunOutcome, RunStatus,
    ScriptSpec, TriggerSource,
};
pub use domain::ports::{
    QueueBroker, RunEventSink, RunFilters, RunRepository, VariableResolver,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    AdmissionController, AdmissionDecision, DispatchOutcome, Dispatcher, QueueReconciler,
    ReconcileReport, RunService,
};
