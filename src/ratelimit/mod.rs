//! Rate limiting logic and state management.

mod clock;
mod history;
mod limiter;
mod operation;
mod registry;
mod tier;

pub use clock::{Clock, ManualClock, TokioClock};
pub use limiter::{RateLimit, StartOptions, DEFAULT_INITIAL_BURST_ALLOWANCE};
pub use operation::Operation;
pub use registry::RateLimiterRegistry;
pub use tier::{Constraint, Tier, TierConfig, Window, MAX_QUOTA};
