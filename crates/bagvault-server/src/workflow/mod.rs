//! External workflow processing
//!
//! Already-archived works can be dispatched to a remote processing service.
//! [`client::WorkflowClient`] speaks the remote protocol,
//! [`orchestrator::WorkflowOrchestrator`] handles submissions, and
//! [`reconcile::ReconciliationLoop`] is the single periodic task that polls
//! remote job status and finalizes outcomes.

pub mod client;
pub mod orchestrator;
pub mod reconcile;

pub use client::{ResultTarget, WorkflowClient};
pub use orchestrator::WorkflowOrchestrator;
pub use reconcile::ReconciliationLoop;
