//! Caching layer.
//!
//! One generic two-tier cache ([`TieredCache`]) and its three instances:
//! - [`ToolResultCache`]: tool outputs keyed by a digest of (tool, params)
//! - [`ResourceCache`]: resource reads with per-type TTLs and ETags
//! - [`EvidenceCache`]: evidence bundles, swept by [`EvidenceSweeper`]
//!
//! The optional distributed tier is any [`DistributedStore`]; [`SqliteStore`]
//! is the bundled one.

pub mod codec;
pub mod entry;
mod memory;
pub mod evidence_cache;
pub mod resource_cache;
pub mod store;
pub mod sweeper;
pub mod tiered;
pub mod tool_cache;

pub use entry::{CacheEntry, CacheStats, CacheTier, CategoryStats};
pub use evidence_cache::EvidenceCache;
pub use resource_cache::{CachedResource, CachedResourceInfo, ResourceCache};
pub use store::{DistributedStore, SqliteStore, StoreError, StoredValue};
pub use sweeper::{EvidenceSweeper, SweepHandle, SweepStats};
pub use tiered::{Lookup, TierSettings, TieredCache};
pub use tool_cache::{generate_key, CachedToolResult, ToolResultCache};
