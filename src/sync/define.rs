//! Generated class definition hand-off
//!
//! Freshly assembled bytecode is handed to the host's class-definition
//! service together with per-class generation data. The data travels
//! through a one-shot token keyed into a concurrent map, so concurrent
//! definitions never interleave and no critical section is needed: each
//! definition claims exactly its own context.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use once_cell::sync::Lazy;
use tracing::debug;

use crate::classfile::emit::emit_class;
use crate::classfile::tree::ClassNode;
use crate::error::{Error, Result};

/// Host service that turns emitted bytes into a loadable class.
pub trait ClassDefiner: Send + Sync {
    fn define(&self, name: &str, bytes: &[u8], context_token: u64) -> Result<()>;
}

/// Per-class generation data passed to the freshly defined class.
#[derive(Debug, Clone)]
pub struct GenerationContext {
    /// Internal name of the class the definition is for.
    pub target_class: String,
    /// Wire indices assigned to the target's own members, declaration
    /// order.
    pub member_indices: Vec<u16>,
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);
static PENDING: Lazy<DashMap<u64, GenerationContext>> = Lazy::new(DashMap::new);

/// Park a context and get the token that claims it.
pub fn register_context(context: GenerationContext) -> u64 {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    PENDING.insert(token, context);
    token
}

/// Claim a parked context. Each token is good for exactly one claim.
pub fn claim_context(token: u64) -> Result<GenerationContext> {
    PENDING
        .remove(&token)
        .map(|(_, context)| context)
        .ok_or_else(|| Error::codegen(format!("generation context token {token} already claimed")))
}

/// Serialize a transformed class and hand it to the host's definition
/// service, parking its generation data under a fresh token. Returns the
/// token so the caller can correlate the definition.
pub fn define_transformed(
    definer: &dyn ClassDefiner,
    clazz: &ClassNode,
    member_indices: Vec<u16>,
) -> Result<u64> {
    let bytes = emit_class(clazz)?;
    let token = register_context(GenerationContext {
        target_class: clazz.name.clone(),
        member_indices,
    });
    debug!(class = %clazz.name, token, size = bytes.len(), "defining");
    definer.define(&clazz.name, &bytes, token)?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::flags::AccessFlags;
    use crate::consts::JAVA_LANG_OBJECT;
    use std::sync::Mutex;

    #[test]
    fn token_claims_exactly_once() {
        let token = register_context(GenerationContext {
            target_class: "a/B".to_string(),
            member_indices: vec![0, 1],
        });
        let context = claim_context(token).unwrap();
        assert_eq!(context.target_class, "a/B");
        assert!(claim_context(token).is_err());
    }

    #[test]
    fn concurrent_registrations_stay_separate() {
        let first = register_context(GenerationContext {
            target_class: "a/First".to_string(),
            member_indices: vec![0],
        });
        let second = register_context(GenerationContext {
            target_class: "a/Second".to_string(),
            member_indices: vec![0],
        });
        assert_ne!(first, second);
        assert_eq!(claim_context(second).unwrap().target_class, "a/Second");
        assert_eq!(claim_context(first).unwrap().target_class, "a/First");
    }

    struct RecordingDefiner {
        defined: Mutex<Vec<(String, usize, u64)>>,
    }

    impl ClassDefiner for RecordingDefiner {
        fn define(&self, name: &str, bytes: &[u8], context_token: u64) -> Result<()> {
            self.defined
                .lock()
                .unwrap()
                .push((name.to_string(), bytes.len(), context_token));
            Ok(())
        }
    }

    #[test]
    fn hand_off_emits_and_parks_the_context() {
        let definer = RecordingDefiner { defined: Mutex::new(Vec::new()) };
        let clazz = ClassNode::new(AccessFlags::PUBLIC, "gen/Companion", JAVA_LANG_OBJECT);
        let token = define_transformed(&definer, &clazz, vec![0, 1, 2]).unwrap();

        let defined = definer.defined.lock().unwrap();
        assert_eq!(defined.len(), 1);
        assert_eq!(defined[0].0, "gen/Companion");
        assert!(defined[0].1 > 10);
        assert_eq!(defined[0].2, token);

        drop(defined);
        assert_eq!(claim_context(token).unwrap().member_indices, vec![0, 1, 2]);
    }
}
