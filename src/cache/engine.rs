//! The size-bounded, namespaced, TTL-aware LRU cache engine. See spec.md
//! §3 "Cache entry" and §4.5.
//!
//! Grounded in the §9 redesign note: "implement via arena of nodes indexed
//! by integer handles and a `key -> handle` map; prev/next are handles, not
//! raw references" — this replaces the source system's doubly linked list of
//! owned pointers, which has no safe equivalent in Rust without `unsafe` or
//! reference counting overhead on every link.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::warn;

use crate::cache::crypto::Cipher;
use crate::error::FrameworkError;

/// Fixed per-entry bookkeeping overhead charged against `sizeBytes`: 8 bytes
/// for the expiry timestamp, 8 for the created-at timestamp, 8 for the
/// arena-node's linked-list bookkeeping (spec.md §3 "Cache entry").
const ENTRY_OVERHEAD_BYTES: usize = 24;

/// An index into a [`Lru`]'s arena. `usize::MAX` is reserved as the "no
/// node" sentinel, matching the arena-of-handles redesign in spec.md §9.
type NodeHandle = usize;
const NIL: NodeHandle = usize::MAX;

struct Slot {
    key: String,
    value: Vec<u8>,
    expiry_ms: Option<u64>,
    created_at_ms: u64,
    size_bytes: usize,
    prev: NodeHandle,
    next: NodeHandle,
}

/// One namespace's bytes-bounded doubly linked LRU list, backed by an arena
/// of [`Slot`]s addressed by [`NodeHandle`] instead of owned pointers.
struct Lru {
    slots: Vec<Slot>,
    free_list: Vec<NodeHandle>,
    index: HashMap<String, NodeHandle>,
    head: NodeHandle,
    tail: NodeHandle,
    size_bytes: usize,
}

impl Lru {
    fn new() -> Self {
        Lru {
            slots: Vec::new(),
            free_list: Vec::new(),
            index: HashMap::new(),
            head: NIL,
            tail: NIL,
            size_bytes: 0,
        }
    }

    fn detach(&mut self, handle: NodeHandle) {
        let (prev, next) = (self.slots[handle].prev, self.slots[handle].next);
        if prev != NIL {
            self.slots[prev].next = next;
        } else {
            self.head = next;
        }
        if next != NIL {
            self.slots[next].prev = prev;
        } else {
            self.tail = prev;
        }
        self.slots[handle].prev = NIL;
        self.slots[handle].next = NIL;
    }

    fn push_front(&mut self, handle: NodeHandle) {
        self.slots[handle].prev = NIL;
        self.slots[handle].next = self.head;
        if self.head != NIL {
            self.slots[self.head].prev = handle;
        }
        self.head = handle;
        if self.tail == NIL {
            self.tail = handle;
        }
    }

    fn move_to_front(&mut self, handle: NodeHandle) {
        if self.head == handle {
            return;
        }
        self.detach(handle);
        self.push_front(handle);
    }

    fn alloc(&mut self, slot: Slot) -> NodeHandle {
        if let Some(handle) = self.free_list.pop() {
            self.slots[handle] = slot;
            handle
        } else {
            self.slots.push(slot);
            self.slots.len() - 1
        }
    }

    fn remove(&mut self, handle: NodeHandle) -> Slot {
        self.detach(handle);
        self.index.remove(&self.slots[handle].key);
        self.size_bytes = self.size_bytes.saturating_sub(self.slots[handle].size_bytes);
        let removed = std::mem::replace(
            &mut self.slots[handle],
            Slot {
                key: String::new(),
                value: Vec::new(),
                expiry_ms: None,
                created_at_ms: 0,
                size_bytes: 0,
                prev: NIL,
                next: NIL,
            },
        );
        self.free_list.push(handle);
        removed
    }

    fn pop_tail(&mut self) -> Option<Slot> {
        if self.tail == NIL {
            return None;
        }
        Some(self.remove(self.tail))
    }

    fn keys(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.index.len());
        let mut cur = self.head;
        while cur != NIL {
            out.push(self.slots[cur].key.clone());
            cur = self.slots[cur].next;
        }
        out
    }

    /// Ciphertext values in the same head-to-tail (most- to least-recently
    /// used) order as `keys`. Decryption happens in [`CacheStore::values`].
    fn values(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(self.index.len());
        let mut cur = self.head;
        while cur != NIL {
            out.push(self.slots[cur].value.clone());
            cur = self.slots[cur].next;
        }
        out
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn entry_size(key: &str, value: &[u8]) -> usize {
    key.len() + value.len() + ENTRY_OVERHEAD_BYTES
}

/// The process-wide cache store: `namespace -> Lru`, with a shared byte
/// budget enforced across every namespace (spec.md §3 invariant: `sum(sizeBytes
/// across all namespaces) == globalSize <= globalMaxBytes`).
pub struct CacheStore {
    max_bytes: u64,
    cipher: Arc<dyn Cipher>,
    on_delete: Option<Arc<dyn Fn(&str, &str) + Send + Sync>>,
    log_enabled: bool,
    namespaces: Mutex<HashMap<String, Lru>>,
    global_size: Mutex<u64>,
}

impl CacheStore {
    pub fn new(max_bytes: u64, cipher: Arc<dyn Cipher>, log_enabled: bool) -> Self {
        CacheStore {
            max_bytes,
            cipher,
            on_delete: None,
            log_enabled,
            namespaces: Mutex::new(HashMap::new()),
            global_size: Mutex::new(0),
        }
    }

    pub fn with_on_delete(mut self, f: Arc<dyn Fn(&str, &str) + Send + Sync>) -> Self {
        self.on_delete = Some(f);
        self
    }

    /// Encrypts `value`, evicts across all namespaces until it fits, then
    /// inserts at the head of `ns`'s list. `ttl_ms = None` means infinite TTL.
    pub fn set(&self, ns: &str, key: &str, value: &[u8], ttl_ms: Option<u64>) {
        let ciphertext = self.cipher.encrypt(value);
        let size = entry_size(key, &ciphertext);

        let mut namespaces = self.namespaces.lock();
        let mut global_size = self.global_size.lock();

        // Replacing an existing entry first frees its old size so the
        // eviction loop below doesn't evict to make room for bytes this
        // `set` is about to reclaim anyway.
        if let Some(lru) = namespaces.get_mut(ns) {
            if let Some(&handle) = lru.index.get(key) {
                let removed = lru.remove(handle);
                *global_size = global_size.saturating_sub(removed.size_bytes as u64);
            }
        }

        self.enforce_global(&mut namespaces, &mut global_size, size as u64);

        let lru = namespaces.entry(ns.to_string()).or_insert_with(Lru::new);
        let created_at_ms = now_ms();
        let slot = Slot {
            key: key.to_string(),
            value: ciphertext,
            expiry_ms: ttl_ms.map(|ttl| created_at_ms + ttl),
            created_at_ms,
            size_bytes: size,
            prev: NIL,
            next: NIL,
        };
        let handle = lru.alloc(slot);
        lru.push_front(handle);
        lru.index.insert(key.to_string(), handle);
        lru.size_bytes += size;
        *global_size += size as u64;
    }

    /// Returns the decrypted value and promotes the entry to most-recently
    /// used, or `None` if absent or expired (expired entries are deleted).
    pub fn get(&self, ns: &str, key: &str) -> Option<Vec<u8>> {
        let mut namespaces = self.namespaces.lock();
        let mut global_size = self.global_size.lock();
        let lru = namespaces.get_mut(ns)?;
        let &handle = lru.index.get(key)?;

        if let Some(expiry) = lru.slots[handle].expiry_ms {
            if now_ms() >= expiry {
                let removed = lru.remove(handle);
                *global_size = global_size.saturating_sub(removed.size_bytes as u64);
                self.notify_delete(ns, key);
                return None;
            }
        }

        lru.move_to_front(handle);
        self.cipher.decrypt(&lru.slots[handle].value).ok()
    }

    pub fn delete(&self, ns: &str, key: &str) {
        let mut namespaces = self.namespaces.lock();
        let mut global_size = self.global_size.lock();
        if let Some(lru) = namespaces.get_mut(ns) {
            if let Some(&handle) = lru.index.get(key) {
                let removed = lru.remove(handle);
                *global_size = global_size.saturating_sub(removed.size_bytes as u64);
                self.notify_delete(ns, key);
            }
        }
    }

    /// Clears one namespace, or every namespace if `ns` is `None`.
    pub fn clear(&self, ns: Option<&str>) {
        let mut namespaces = self.namespaces.lock();
        let mut global_size = self.global_size.lock();
        match ns {
            Some(ns) => {
                if let Some(lru) = namespaces.remove(ns) {
                    *global_size = global_size.saturating_sub(lru.size_bytes as u64);
                }
            }
            None => {
                namespaces.clear();
                *global_size = 0;
            }
        }
    }

    pub fn has(&self, ns: &str, key: &str) -> bool {
        self.namespaces
            .lock()
            .get(ns)
            .map(|lru| lru.index.contains_key(key))
            .unwrap_or(false)
    }

    pub fn size(&self, ns: &str) -> usize {
        self.namespaces.lock().get(ns).map(|lru| lru.index.len()).unwrap_or(0)
    }

    pub fn keys(&self, ns: &str) -> Vec<String> {
        self.namespaces.lock().get(ns).map(|lru| lru.keys()).unwrap_or_default()
    }

    /// Decrypted values for every live entry in `ns`, head-to-tail (does not
    /// check or evict expired entries — callers wanting expiry semantics
    /// should go through `get`).
    pub fn values(&self, ns: &str) -> Vec<Vec<u8>> {
        let namespaces = self.namespaces.lock();
        let Some(lru) = namespaces.get(ns) else {
            return Vec::new();
        };
        lru.values()
            .iter()
            .filter_map(|ciphertext| self.cipher.decrypt(ciphertext).ok())
            .collect()
    }

    pub fn paginated_keys(&self, ns: &str, page: usize, page_size: usize) -> Vec<String> {
        let all = self.keys(ns);
        let start = page.saturating_mul(page_size).min(all.len());
        let end = (start + page_size).min(all.len());
        all[start..end].to_vec()
    }

    pub fn global_size(&self) -> u64 {
        *self.global_size.lock()
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn notify_delete(&self, ns: &str, key: &str) {
        if self.log_enabled {
            tracing::debug!(namespace = ns, key, "cache entry deleted");
        }
        if let Some(cb) = &self.on_delete {
            cb(ns, key);
        }
    }

    /// Evicts tails across namespaces (arbitrary but deterministic order —
    /// `HashMap` iteration here, re-derived fresh each pass since a removed
    /// tail can make a previously-empty namespace ineligible) until
    /// `global_size + required <= max_bytes` or no candidate remains.
    /// Hard safety cap of 1000 iterations and a break on non-decreasing
    /// `global_size`, per spec.md §4.5 "enforceGlobal".
    fn enforce_global(&self, namespaces: &mut HashMap<String, Lru>, global_size: &mut u64, required: u64) {
        let mut iterations = 0;
        while *global_size + required > self.max_bytes {
            iterations += 1;
            if iterations > 1000 {
                warn!("cache eviction loop hit its 1000-iteration safety cap");
                break;
            }
            let before = *global_size;

            let victim_ns = namespaces
                .iter()
                .find(|(_, lru)| lru.tail != NIL)
                .map(|(ns, _)| ns.clone());

            let Some(ns) = victim_ns else {
                break;
            };
            let lru = namespaces.get_mut(&ns).expect("looked up above");
            if let Some(removed) = lru.pop_tail() {
                *global_size = global_size.saturating_sub(removed.size_bytes as u64);
                self.notify_delete(&ns, &removed.key);
            }

            if *global_size >= before {
                warn!("cache eviction made no progress; breaking to avoid an infinite loop");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::crypto::NoopCipher;

    fn store(max_bytes: u64) -> CacheStore {
        CacheStore::new(max_bytes, Arc::new(NoopCipher), false)
    }

    #[test]
    fn set_then_get_round_trips_with_infinite_ttl() {
        let store = store(10_000);
        store.set("ns", "k", b"value", None);
        assert_eq!(store.get("ns", "k"), Some(b"value".to_vec()));
    }

    #[test]
    fn delete_then_get_is_none() {
        let store = store(10_000);
        store.set("ns", "k", b"value", None);
        store.delete("ns", "k");
        assert_eq!(store.get("ns", "k"), None);
        assert_eq!(store.global_size(), 0);
    }

    #[test]
    fn expired_entry_is_absent_on_get() {
        let store = store(10_000);
        store.set("ns", "k", b"value", Some(0));
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(store.get("ns", "k"), None);
    }

    #[test]
    fn global_size_matches_sum_of_entries_and_stays_under_budget() {
        let store = store(1000);
        store.set("A", "k1", &vec![b'x'; 400], None);
        store.set("B", "k2", &vec![b'y'; 400], None);
        store.set("A", "k3", &vec![b'z'; 400], None);

        assert!(store.global_size() <= 1000);
        // one of the two original entries must have been evicted to make room.
        let k1_alive = store.get("A", "k1").is_some();
        let k2_alive = store.get("B", "k2").is_some();
        assert!(!(k1_alive && k2_alive));
        // the most recently touched survivor (k3, just inserted) always wins.
        assert!(store.get("A", "k3").is_some());
    }

    #[test]
    fn get_promotes_to_most_recently_used() {
        let entry_bytes = entry_size("k", b"0123456789") as u64;
        let store = store(entry_bytes * 2);
        store.set("ns", "a", b"0123456789", None);
        store.set("ns", "b", b"0123456789", None);
        // touch "a" so "b" becomes the LRU victim on the next eviction.
        store.get("ns", "a");
        store.set("ns", "c", b"0123456789", None);
        assert!(store.get("ns", "a").is_some());
        assert!(store.get("ns", "b").is_none());
    }

    #[test]
    fn clear_one_namespace_leaves_others_intact() {
        let store = store(10_000);
        store.set("A", "k", b"v", None);
        store.set("B", "k", b"v", None);
        store.clear(Some("A"));
        assert!(store.get("A", "k").is_none());
        assert!(store.get("B", "k").is_some());
    }

    #[test]
    fn values_returns_every_live_entry_in_the_namespace() {
        let store = store(10_000);
        store.set("ns", "a", b"one", None);
        store.set("ns", "b", b"two", None);
        store.set("other", "c", b"three", None);

        let mut values = store.values("ns");
        values.sort();
        assert_eq!(values, vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(store.values("missing-ns").is_empty());
    }
}
