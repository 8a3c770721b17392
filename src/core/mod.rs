//! Core deterministic primitives.
//!
//! Pure functions with no I/O and no dependence on ambient state.
//! Both the coordinator and any client-side renderer consume these to
//! arrive at identical results independently.

pub mod shuffle;
pub mod timer;

// Re-export core helpers
pub use shuffle::{option_seed, shuffle_options, shuffle_with_seed};
pub use timer::{epoch_millis, is_time_up, remaining_ms};
