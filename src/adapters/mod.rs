//! Adapters implementing domain ports.
//!
//! Two simulations (a headless course and a frame script) stand behind
//! [`crate::ports::Simulation`], and two stores behind
//! [`crate::ports::AgentRepository`]. Adapters depend on the ports, never the
//! reverse.

pub mod course_simulation;
pub mod in_memory_repository;
pub mod msgpack_repository;
pub mod scripted_simulation;

pub use course_simulation::{CourseLayout, CourseSimulation, Patrol, Pipe};
pub use in_memory_repository::InMemoryRepository;
pub use msgpack_repository::MsgPackRepository;
pub use scripted_simulation::{ScriptHandle, ScriptedSimulation};
