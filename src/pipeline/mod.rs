//! Training pipeline abstractions
//!
//! This module provides composable pieces for:
//! - Running the episode loop for one learner against one simulation
//! - Recording telemetry and run logs during training

pub mod observers;
pub mod training;

// Re-export observer implementations (adapters)
pub use observers::{
    JsonlObserver, MetricsObserver, MetricsSummary, ProgressObserver, RunLogObserver,
    RunLogRecord, TelemetryEvent, TracingObserver,
};
pub use training::{StopSignal, TrainingConfig, TrainingPipeline, TrainingResult};

pub use crate::ports::{Learner, Observer};
