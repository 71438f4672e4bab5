//! Table-backed variants: dictionaries, weak maps and environments.
//!
//! All three own their table storage outright; the storage is destroyed by
//! the object's finalizer and never shared between objects.

use alloc::collections::BTreeMap;

use crate::object::{HeapObject, ObjHeader, Tag};
use crate::value::{EqKey, ObjKey, Value};

/// `DICT` - an `eq?`-keyed map from values to values.
#[repr(C)]
pub struct ObjDict {
    pub(crate) header: ObjHeader,
    /// Owned table storage.
    pub table: BTreeMap<EqKey, Value>,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjDict {
    const TAG: Tag = Tag::Dict;
}

/// `WEAK` - an ephemeron map from objects to values.
///
/// An entry survives a collection only while its key is reachable without
/// going through the entry's value slot; the value then becomes reachable
/// through the map. Dead entries are purged at the start of the sweep.
#[repr(C)]
pub struct ObjWeak {
    pub(crate) header: ObjHeader,
    /// Owned table storage.
    pub table: BTreeMap<ObjKey, Value>,
    /// Transient link in the heap's weak-map chain during a collection.
    pub(crate) prev: *mut ObjWeak,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjWeak {
    const TAG: Tag = Tag::Weak;
}

/// `ENV` - identifier renames for one lexical scope, chained to the
/// enclosing scope through `up`.
#[repr(C)]
pub struct ObjEnv {
    pub(crate) header: ObjHeader,
    /// Identifier-to-identifier renames for this scope.
    pub table: BTreeMap<ObjKey, ObjKey>,
    /// Enclosing scope, or null for a top level.
    pub up: *mut ObjEnv,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjEnv {
    const TAG: Tag = Tag::Env;
}
