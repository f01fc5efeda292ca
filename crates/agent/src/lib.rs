//! The agentic reasoning loop for Drover.
//!
//! One [`Engine`] serves the whole process; each request runs its own
//! think → act → observe loop with request-scoped state and a request-scoped
//! deadline. See [`engine`] for the loop and [`context`] for the tiered
//! context-window management applied before every completion call.

pub mod context;
pub mod engine;

pub use engine::{Engine, EngineSettings, Runner};
