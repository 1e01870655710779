//! Plaza Cache System
//!
//! The fast store doubles as a cache and as the ranking engine's storage:
//!
//! - **Fast store** (`store`, `memory`): keyed strings, sets and sorted sets with
//!   per-key expiry and atomic batches
//! - **Post cache** (`posts`): read-through cache of assembled posts with
//!   jittered TTLs, negative markers and delayed invalidation
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `plaza.toml`:
//!
//! ```toml
//! [cache]
//! post_ttl_seconds = 1800
//! post_jitter_percent = 20
//! double_delete_delay_ms = 500
//! # ... see config.rs for all options
//! ```

mod config;
pub mod deferred;
pub mod jitter;
pub mod keys;
pub(crate) mod lock;
pub mod memory;
pub mod posts;
pub mod store;

pub use config::CacheConfig;
pub use deferred::DeferredTasks;
pub use jitter::{jittered_ttl, sample_jitter};
pub use keys::KeyLayout;
pub use memory::MemoryStore;
pub use posts::PostCache;
pub use store::{Batch, Command, FastStore, Reply, StoreError};
