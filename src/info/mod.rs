//! Class metadata and assignability
//!
//! A lazy, cached view over class hierarchies. Hierarchy walks never load
//! classes through the host; they go through a [`ClassResolver`] that
//! answers from whatever the host has already parsed. Ancestor sets are
//! computed at most once per class and shared.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::OnceCell;

use crate::classfile::flags::AccessFlags;
use crate::classfile::tree::ClassNode;
use crate::consts::JAVA_LANG_OBJECT;
use crate::error::{Error, Result};

/// Resolved metadata for one class: names only, never loaded code.
#[derive(Debug)]
pub struct ClassInfo {
    name: String,
    super_name: Option<String>,
    interfaces: Vec<String>,
    access: AccessFlags,
    /// Transitive ancestor names; computed once, then immutable.
    supers: OnceCell<HashSet<String>>,
}

impl ClassInfo {
    pub fn new(
        name: impl Into<String>,
        super_name: Option<String>,
        interfaces: Vec<String>,
        access: AccessFlags,
    ) -> ClassInfo {
        ClassInfo {
            name: name.into(),
            super_name,
            interfaces,
            access,
            supers: OnceCell::new(),
        }
    }

    pub fn of_node(node: &ClassNode) -> ClassInfo {
        ClassInfo::new(
            node.name.clone(),
            node.super_name.clone(),
            node.interfaces.clone(),
            node.access,
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn is_interface(&self) -> bool {
        self.access.is_interface()
    }

    pub fn is_abstract(&self) -> bool {
        self.access.is_abstract()
    }

    pub fn is_enum(&self) -> bool {
        self.access.is_enum()
    }

    fn is_object(&self) -> bool {
        self.name == JAVA_LANG_OBJECT
    }

    /// The transitive ancestor set: every superclass and every interface
    /// reachable from this class, not including the class itself.
    pub fn supers(&self, cache: &ClassInfoCache) -> Result<&HashSet<String>> {
        self.supers.get_or_try_init(|| {
            let mut out = HashSet::new();
            collect_supers(self, cache, &mut out)?;
            Ok(out)
        })
    }

    /// `self.is_assignable_from(other)`: can a value of `other`'s type be
    /// bound to a reference of `self`'s type.
    pub fn is_assignable_from(&self, other: &ClassInfo, cache: &ClassInfoCache) -> Result<bool> {
        // Object has no supertypes but itself.
        if other.is_object() {
            return Ok(self.is_object());
        }
        // Cheap paths before any hierarchy walk.
        if self.is_object()
            || self.name == other.name
            || other.super_name() == Some(&self.name)
            || other.interfaces.iter().any(|i| *i == self.name)
        {
            return Ok(true);
        }
        // A class is never assignable from an unrelated interface.
        if !self.is_interface() && other.is_interface() {
            return Ok(false);
        }
        Ok(other.supers(cache)?.contains(&self.name))
    }
}

/// Superclass chain plus interfaces, interfaces short-circuited: one
/// reachable through several paths is expanded only the first time. A
/// revisited name is treated as already processed, so even a malformed
/// cyclic hierarchy terminates.
fn collect_supers(info: &ClassInfo, cache: &ClassInfoCache, out: &mut HashSet<String>) -> Result<()> {
    if let Some(super_name) = info.super_name() {
        if out.insert(super_name.to_string()) && super_name != JAVA_LANG_OBJECT {
            let parent = cache.get(super_name)?;
            collect_supers(&parent, cache, out)?;
        }
    }
    for iface in &info.interfaces {
        if out.insert(iface.clone()) {
            let parent = cache.get(iface)?;
            collect_supers(&parent, cache, out)?;
        }
    }
    Ok(())
}

/// Answers class-name lookups for the metadata cache.
pub trait ClassResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<ClassInfo>;
}

/// Resolver over classes registered up front. Unknown well-known names
/// (`java/lang/Object` and anything registered as an external stub) come
/// back as plain extension-less classes.
#[derive(Default)]
pub struct MapResolver {
    classes: DashMap<String, (Option<String>, Vec<String>, AccessFlags)>,
}

impl MapResolver {
    pub fn new() -> MapResolver {
        let resolver = MapResolver { classes: DashMap::new() };
        resolver.register_stub(JAVA_LANG_OBJECT, None, AccessFlags::PUBLIC);
        resolver
    }

    pub fn register(&self, node: &ClassNode) {
        self.classes.insert(
            node.name.clone(),
            (node.super_name.clone(), node.interfaces.clone(), node.access),
        );
    }

    /// Register a class known only by shape, e.g. a host base type.
    pub fn register_stub(&self, name: &str, super_name: Option<&str>, access: AccessFlags) {
        self.classes.insert(
            name.to_string(),
            (super_name.map(str::to_string), Vec::new(), access),
        );
    }

    /// Register the host base types classification tests against, plus
    /// the runtime marker interfaces transformed classes pick up.
    pub fn register_host_types(&self) {
        use crate::consts::{
            CLASS_CONTAINER, CLASS_ENTITY, CLASS_TILE_ENTITY, IFACE_EXT_PROPS, SYNCED_OBJECT,
            SYNCED_PROPS,
        };
        self.register_stub(CLASS_ENTITY, Some(JAVA_LANG_OBJECT), AccessFlags::PUBLIC);
        self.register_stub(CLASS_TILE_ENTITY, Some(JAVA_LANG_OBJECT), AccessFlags::PUBLIC);
        self.register_stub(CLASS_CONTAINER, Some(JAVA_LANG_OBJECT), AccessFlags::PUBLIC);
        self.register_interface_stub(IFACE_EXT_PROPS);
        self.register_interface_stub(SYNCED_OBJECT);
        self.register_interface_stub(SYNCED_PROPS);
    }

    pub fn register_interface_stub(&self, name: &str) {
        self.classes.insert(
            name.to_string(),
            (
                Some(JAVA_LANG_OBJECT.to_string()),
                Vec::new(),
                AccessFlags::PUBLIC | AccessFlags::INTERFACE | AccessFlags::ABSTRACT,
            ),
        );
    }
}

impl ClassResolver for MapResolver {
    fn resolve(&self, name: &str) -> Result<ClassInfo> {
        let entry = self.classes.get(name).ok_or_else(|| Error::resolution(name))?;
        let (super_name, interfaces, access) = entry.value();
        Ok(ClassInfo::new(name, super_name.clone(), interfaces.clone(), *access))
    }
}

/// Process-wide read-through cache of [`ClassInfo`], keyed by internal
/// name. Concurrent lookups may race to resolve the same class; only one
/// result is retained.
pub struct ClassInfoCache {
    resolver: Arc<dyn ClassResolver>,
    cache: DashMap<String, Arc<ClassInfo>>,
}

impl ClassInfoCache {
    pub fn new(resolver: Arc<dyn ClassResolver>) -> ClassInfoCache {
        ClassInfoCache { resolver, cache: DashMap::new() }
    }

    pub fn get(&self, name: &str) -> Result<Arc<ClassInfo>> {
        if let Some(info) = self.cache.get(name) {
            return Ok(Arc::clone(&info));
        }
        let info = Arc::new(self.resolver.resolve(name)?);
        let entry = self.cache.entry(name.to_string()).or_insert(info);
        Ok(Arc::clone(&entry))
    }

    /// Cache the metadata of a class currently under transformation so
    /// hierarchy walks over it need no resolver round-trip.
    pub fn put_node(&self, node: &ClassNode) -> Arc<ClassInfo> {
        let info = Arc::new(ClassInfo::of_node(node));
        self.cache.insert(node.name.clone(), Arc::clone(&info));
        info
    }

    pub fn is_assignable(&self, supertype: &str, subtype: &ClassInfo) -> Result<bool> {
        let sup = self.get(supertype)?;
        sup.is_assignable_from(subtype, self)
    }
}
