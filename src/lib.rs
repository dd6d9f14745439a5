//! AlephTX Bus - Core Library
//! Message-driven concurrency substrate: mailboxes, state machines, throttling

// Public modules
pub mod core;
pub mod execution;
pub mod fsm;
pub mod messaging;
pub mod order;
pub mod risk;
pub mod scheduler;
pub mod throttle;

// Re-exports
pub use core::{Config, Error, Result};
