use crate::keywords::state_machine::ResumeStateMachine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the per-resume sessions and every keyword operation.
    pub machine: ResumeStateMachine,
}
