//! Service layer: business logic coordination over the domain ports.

pub mod admission;
pub mod dispatcher;
pub mod reconciler;
pub mod run_service;

pub use admission::{AdmissionController, AdmissionDecision};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use reconciler::{QueueReconciler, ReconcileReport, LOST_DETAIL, TIMEOUT_DETAIL};
pub use run_service::RunService;
