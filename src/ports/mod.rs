//! Ports (trait boundaries) for external dependencies.
//!
//! These traits are owned by the domain and implemented by adapters: the
//! simulation being driven, the learners choosing actions, the observers
//! collecting telemetry and the repository persisting learned state.

pub mod learner;
pub mod observer;
pub mod repository;
pub mod simulation;

pub use learner::{AgentKind, Decision, DecisionSource, Learner, UpdateReport};
pub use observer::{ActionTelemetry, Observer, RewardTelemetry, UpdateTelemetry};
pub use repository::AgentRepository;
pub use simulation::{SimInfo, SimStep, Simulation};
