//! Client-side synchronization: optimistic local state, per-item requests,
//! a debounced bulk save and a local snapshot cache for outages.

pub mod api;
pub mod cache;
pub mod config;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod store;

pub use api::{HttpProgressApi, ProgressApi, Session};
pub use cache::{FileCache, LocalCache, MemoryCache};
pub use config::SyncConfig;
pub use debounce::Debouncer;
pub use engine::{FlushOutcome, LoadSource, RoleReset, SyncEngine};
pub use error::{CacheError, SyncError};
pub use store::ProgressStore;
