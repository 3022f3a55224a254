//! Shared building blocks: the error taxonomy and the time source.

pub mod clock;
pub mod error;

pub use clock::{timestamp_ns, Clock, ManualClock, SystemClock};
pub use error::{ConnectionError, Error, Result};
