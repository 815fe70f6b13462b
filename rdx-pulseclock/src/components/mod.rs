//! Contains the synchronous building blocks of both engines.
//!
//! Nothing in here owns a timer or a clock. Each component is a plain state
//! machine that is handed the current time (or a tick delta) by its engine.

pub mod beat;
pub mod click;
pub mod cursor;
pub mod resolver;
pub mod scheduler;
