//! Instrumented-class registry
//!
//! Records, per transformed class, how many synced members it declares.
//! Subclasses transformed later consult this to continue wire index
//! numbering where their ancestors left off, and packet dispatch uses it
//! to tell instrumented classes apart. Transformation of unrelated classes
//! may run concurrently, so the map is a concurrent one.

use dashmap::DashMap;

use crate::consts::JAVA_LANG_OBJECT;
use crate::error::Result;
use crate::info::ClassInfoCache;

#[derive(Debug, Default)]
pub struct SyncRegistry {
    /// Class internal name to the number of synced members it declares
    /// itself (not counting inherited ones).
    member_counts: DashMap<String, u16>,
}

impl SyncRegistry {
    pub fn new() -> SyncRegistry {
        SyncRegistry::default()
    }

    pub fn record(&self, class: &str, member_count: u16) {
        self.member_counts.insert(class.to_string(), member_count);
    }

    pub fn is_instrumented(&self, class: &str) -> bool {
        self.member_counts.contains_key(class)
    }

    pub fn member_count(&self, class: &str) -> Option<u16> {
        self.member_counts.get(class).map(|c| *c)
    }

    /// Total synced members declared by `class`'s strict ancestors. This is
    /// the first wire index the class itself may assign. Also reports
    /// whether any ancestor is instrumented at all, which decides whether
    /// generated routines must delegate to a super implementation.
    pub fn super_member_count(&self, cache: &ClassInfoCache, class: &str) -> Result<SuperSyncs> {
        let mut total: u32 = 0;
        let mut instrumented = false;
        let mut current = cache.get(class)?;
        while let Some(super_name) = current.super_name() {
            if super_name == JAVA_LANG_OBJECT {
                break;
            }
            if let Some(count) = self.member_count(super_name) {
                instrumented = true;
                total += count as u32;
            }
            current = cache.get(super_name)?;
        }
        Ok(SuperSyncs { first_index: total, any_instrumented: instrumented })
    }
}

/// Result of the super-chain accounting walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperSyncs {
    /// First wire index available to the class being transformed.
    pub first_index: u32,
    /// True when some ancestor already carries generated sync routines.
    pub any_instrumented: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::flags::AccessFlags;
    use crate::info::{ClassInfoCache, MapResolver};
    use std::sync::Arc;

    fn cache() -> ClassInfoCache {
        let r = MapResolver::new();
        r.register_stub("game/BaseEntity", Some(JAVA_LANG_OBJECT), AccessFlags::PUBLIC);
        r.register_stub("game/Animal", Some("game/BaseEntity"), AccessFlags::PUBLIC);
        r.register_stub("game/Wolf", Some("game/Animal"), AccessFlags::PUBLIC);
        ClassInfoCache::new(Arc::new(r))
    }

    #[test]
    fn uninstrumented_chain_starts_fresh() {
        let registry = SyncRegistry::new();
        let syncs = registry.super_member_count(&cache(), "game/Wolf").unwrap();
        assert_eq!(syncs, SuperSyncs { first_index: 0, any_instrumented: false });
    }

    #[test]
    fn indices_continue_past_instrumented_ancestors() {
        let registry = SyncRegistry::new();
        registry.record("game/BaseEntity", 3);
        registry.record("game/Animal", 2);
        let syncs = registry.super_member_count(&cache(), "game/Wolf").unwrap();
        assert_eq!(syncs, SuperSyncs { first_index: 5, any_instrumented: true });
    }

    #[test]
    fn own_count_does_not_shift_own_indices() {
        let registry = SyncRegistry::new();
        registry.record("game/Animal", 2);
        let syncs = registry.super_member_count(&cache(), "game/Animal").unwrap();
        assert_eq!(syncs.first_index, 0);
        assert!(!syncs.any_instrumented);
    }
}
