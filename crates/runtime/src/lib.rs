//! Cooperative scheduling primitives that every session, listener and
//! bridge in the routing core is built on top of.
//!
//! Tokio tasks stand in for the spec's stackful coroutines: each task is
//! a unit of cooperative scheduling, suspension points are the points
//! where a task actually awaits (socket I/O, sleep, a condition), and
//! `Interrupt` models forced cancellation at those points.

pub mod cancel;
pub mod cid;
pub mod hourglass;

pub use cancel::Interrupt;
pub use cid::Cid;
pub use hourglass::Hourglass;
