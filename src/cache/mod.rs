//! The in-process LRU cache engine: a size-bounded, namespaced, TTL-aware
//! LRU shared across namespaces, with encryption-at-rest. See spec.md §4.5.

pub mod crypto;
pub mod engine;
pub mod size;

pub use crypto::{Aes256CbcCipher, Cipher, NoopCipher};
pub use engine::CacheStore;
pub use size::parse_max_bytes;

use std::sync::Arc;

use crate::error::FrameworkError;

/// Builds the process-wide [`CacheStore`] from the `CACHE_MAX_BYTES`
/// configuration string, resolving a percentage spec against host physical
/// memory via `sys_info::mem_info` (kibibytes, per that crate's contract).
pub fn build_store(max_bytes_spec: &str, log_enabled: bool) -> Result<CacheStore, FrameworkError> {
    let total_memory_bytes = sys_info::mem_info()
        .map(|info| info.total * 1024)
        .unwrap_or(0);
    let max_bytes = parse_max_bytes(max_bytes_spec, total_memory_bytes)?;
    Ok(CacheStore::new(max_bytes, Arc::new(Aes256CbcCipher::new()), log_enabled))
}
