//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters
//! must implement:
//! - `RunRepository`: database operations for run records
//! - `QueueBroker`: submit/probe/outstanding against the queue broker
//! - `VariableResolver`: variable and secret resolution for script bodies
//! - `RunEventSink`: run-completion event delivery
//!
//! These traits define the contracts that allow the domain to be independent
//! of specific infrastructure implementations.

pub mod event_sink;
pub mod queue_broker;
pub mod run_repository;
pub mod variable_resolver;

pub use event_sink::{CompletionSource, RunCompleted, RunEventSink};
pub use queue_broker::{
    BrokerError, EntryProbe, EntryState, QueueBroker, QueuePayload, QueueScript, SubmitReceipt,
};
pub use run_repository::{Finalization, RunFilters, RunRepository};
pub use variable_resolver::{ResolveError, ResolvedScript, Substitution, VariableResolver};
