//! Enrollment flows: the request sender and the loops that drive it.

pub mod direct;
pub mod enroller;
pub mod timed;
pub mod watcher;

pub use direct::DirectEnroller;
pub use enroller::{Enroller, SubmitError};
pub use timed::TimedEnrollment;
pub use watcher::{SeatWatcher, WatchCycle};
