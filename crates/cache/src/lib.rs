//! Caching layer for ragpipe.
//!
//! `ExpiringCache` is a fingerprint-keyed LRU with per-entry TTL.
//! `CacheService` owns one instance per value class so eviction pressure
//! from one class never starves another.

pub mod expiring;
pub mod service;

pub use expiring::{CacheEntry, ExpiringCache};
pub use service::{CacheService, normalize_query};
