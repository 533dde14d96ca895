//! Tag-addressable response caching.
//!
//! Eligible GET responses are captured at the response-emission boundary and
//! stored as MessagePack blobs under deterministic keys
//! (`cache:<method>:<path>:<query>:<subject>:<vary>`), with a per-key tag
//! record and inverted `tag_index:<tag>` sets enabling bulk invalidation.
//!
//! ## Population Races
//!
//! Cache writes are fire-and-forget after the client is answered, so
//! concurrent identical requests during a miss may each run the handler and
//! each write the same key. That bounded duplication is accepted in place of
//! request coalescing; the last write wins and entries are immutable
//! otherwise.
//!
//! ## Graceful Degradation
//!
//! Every store error during lookup, write, or invalidation is logged and
//! becomes a miss / no-op. The cache is a soft layer; its unavailability never
//! surfaces as a request failure.

pub mod entry;
pub mod invalidation;
pub mod key;
pub mod middleware;
pub mod policy;

pub use self::entry::CachedResponse;
pub use self::invalidation::{CacheManager, CacheStats};
pub use self::middleware::{ResponseCacheState, response_cache};
pub use self::policy::CachePolicy;
pub use self::policy::presets as policy_presets;
