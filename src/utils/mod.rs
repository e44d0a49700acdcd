//! Utils Module - Helper Functions & Shared Utilities
//!
//! Constants, unit conversion, the KV cache abstraction and telemetry.

pub mod cache;
pub mod constants;
pub mod telemetry;

pub use cache::*;
pub use constants::*;
pub use telemetry::*;
