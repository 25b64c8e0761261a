//! Device pipeline abstraction
//!
//! The bins never talk to a graphics API directly. Every state change goes
//! through the small [`Pipeline`] surface, so a recording
//! [`DummyPipeline`] can stand in for a real device in tests.

pub mod dummy;
pub mod traits;
pub mod types;

pub use dummy::*;
pub use traits::*;
pub use types::*;
