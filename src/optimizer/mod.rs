//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `job_orchestrator`: Orchestratore del run, stop cooperativo e riepilogo
//! - `progress_tracker`: Statistiche, spinner ed eventi JSON unificati

pub mod job_orchestrator;
pub mod progress_tracker;

pub use job_orchestrator::{JobOrchestrator, JobReport, JobState, StopHandle};
pub use progress_tracker::ProgressTracker;
