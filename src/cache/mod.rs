//! # Read-Mostly Caches
//!
//! Time source abstraction and the TTL cache used for reviewer workload and
//! role membership. Expiry is evaluated lazily on read; nothing runs in the
//! background.

pub mod clock;
pub mod ttl_cache;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ttl_cache::TtlCache;
