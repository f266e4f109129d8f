//! Sharded identity locks.
//!
//! Creating an entity runs under the locks for every identity key of the
//! record: each identifier and the normalized name. Two records that could
//! match each other share at least one key, so they serialize on create while
//! imports of unrelated entities proceed in parallel. Keys map to shards by
//! hash and shards are always taken in ascending order.

use std::sync::{Mutex, MutexGuard};

use blake3::Hasher;

use crate::import::ImportEvent;
use crate::storage::StorageError;

/// The key an import locks on: the first preferred identifier present for
/// its type, else any identifier, else the normalized name.
#[must_use]
pub fn identity_key(event: &ImportEvent) -> String {
    let entity_type = event.entity_type;
    let identifiers = event.normalized_identifiers();

    let preferred = entity_type
        .preferred_identifiers()
        .iter()
        .find_map(|key| identifiers.get_key_value(*key));
    if let Some((key, value)) = preferred.or_else(|| identifiers.iter().next()) {
        return format!("{entity_type}:{key}:{value}");
    }
    format!("{entity_type}:name:{}", event.name_key())
}

/// Every key an import can collide on: one per normalized identifier plus
/// the normalized name.
#[must_use]
pub fn identity_keys(event: &ImportEvent) -> Vec<String> {
    let entity_type = event.entity_type;
    let mut keys: Vec<String> = event
        .normalized_identifiers()
        .iter()
        .map(|(key, value)| format!("{entity_type}:{key}:{value}"))
        .collect();
    keys.push(format!("{entity_type}:name:{}", event.name_key()));
    keys
}

/// Fixed set of mutexes indexed by identity-key hash.
#[derive(Debug)]
pub struct IdentityLocks {
    shards: Vec<Mutex<()>>,
}

impl IdentityLocks {
    /// Creates `shards` locks (at least one).
    #[must_use]
    pub fn new(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard index for `key`.
    #[must_use]
    pub fn shard_for(&self, key: &str) -> usize {
        let mut h = Hasher::new();
        h.update(key.as_bytes());
        let hash = h.finalize();

        let mut bucket = [0u8; 8];
        bucket.copy_from_slice(&hash.as_bytes()[..8]);
        let bucket = u64::from_le_bytes(bucket);

        #[allow(clippy::cast_possible_truncation)]
        let idx = (bucket % self.shards.len() as u64) as usize;
        idx
    }

    /// Blocks until the shards for all `keys` are held.
    ///
    /// Shards are deduplicated and taken in index order, so callers with
    /// overlapping key sets cannot deadlock.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if a previous holder panicked.
    pub fn lock_all<S: AsRef<str>>(&self, keys: &[S]) -> Result<Vec<MutexGuard<'_, ()>>, StorageError> {
        let mut shards: Vec<usize> = keys.iter().map(|k| self.shard_for(k.as_ref())).collect();
        shards.sort_unstable();
        shards.dedup();
        shards
            .into_iter()
            .map(|idx| {
                self.shards[idx]
                    .lock()
                    .map_err(|_| StorageError::BackendError("poisoned lock: identity shard".to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::entity::EntityType;

    #[test]
    fn identity_key_prefers_type_identifiers() {
        let company = ImportEvent::new(EntityType::Company, "Acme")
            .identifier("network_id", "linkedin.com/company/acme")
            .identifier("domain", "WWW.ACME.COM");
        assert_eq!(identity_key(&company), "company:domain:acme.com");

        let person = ImportEvent::new(EntityType::Person, "Jane")
            .identifier("email", "jane@acme.com")
            .identifier("network_id", "linkedin.com/in/jane");
        assert_eq!(identity_key(&person), "person:network_id:linkedin.com/in/jane");
    }

    #[test]
    fn identity_key_falls_back_to_other_identifiers_then_name() {
        let event = ImportEvent::new(EntityType::PeFirm, "Summit").identifier("crm_id", "A-17");
        assert_eq!(identity_key(&event), "pe_firm:crm_id:a-17");

        let event = ImportEvent::new(EntityType::PeFirm, "  Summit   Partners ");
        assert_eq!(identity_key(&event), "pe_firm:name:summit partners");
    }

    #[test]
    fn identity_keys_cover_identifiers_and_name() {
        let event = ImportEvent::new(EntityType::Company, "Acme  Corp")
            .identifier("domain", "acme.com")
            .identifier("network_id", "linkedin.com/company/acme");
        let keys = identity_keys(&event);
        assert_eq!(keys.len(), 3);
        assert!(keys.contains(&"company:domain:acme.com".to_string()));
        assert_eq!(keys.last().map(String::as_str), Some("company:name:acme corp"));
    }

    #[test]
    fn lock_all_takes_each_shard_once() {
        let locks = IdentityLocks::new(1);
        let guards = locks.lock_all(&["a", "b", "c"]).unwrap();
        assert_eq!(guards.len(), 1);
        drop(guards);
        assert!(locks.lock_all(&["a"]).is_ok());
    }

    #[test]
    fn shard_for_is_stable_and_in_range() {
        let locks = IdentityLocks::new(16);
        let a = locks.shard_for("company:domain:acme.com");
        assert_eq!(a, locks.shard_for("company:domain:acme.com"));
        assert!(a < locks.shard_count());
        assert_eq!(IdentityLocks::new(0).shard_count(), 1);
    }

    #[test]
    fn lock_and_release() {
        let locks = IdentityLocks::new(4);
        {
            let _guards = locks.lock_all(&["company:domain:acme.com"]).unwrap();
        }
        assert!(locks.lock_all(&["company:domain:acme.com"]).is_ok());
    }
}
