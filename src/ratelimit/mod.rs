//! Rate limiting logic and state management.

mod clock;
mod key;
mod limiter;
mod registry;
mod rules;
mod store;
mod sweeper;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use key::ClientKey;
pub use limiter::RateLimiter;
pub use registry::{LimiterRegistry, DEFAULT_ROUTE};
pub use rules::{RateLimitRule, RateLimitRules, RouteRule, TimeUnit};
pub use store::{LockedStore, ShardedStore, StoreKind, WindowStore};
pub use sweeper::{Sweeper, SweeperHandle};
pub use window::{Decision, Quota, Timestamp, WindowRecord};
