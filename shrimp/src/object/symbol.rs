//! Symbols and hygienic identifiers.

use core::ptr::NonNull;

use crate::object::table::ObjEnv;
use crate::object::{HeapObject, ObjHeader, ObjString, Tag};

/// `SYMBOL` - an interned name.
///
/// Symbols are registered in the state's oblist under the same rope that
/// backs their name string; a symbol that becomes unreachable is removed
/// from the oblist during the sweep, so a later intern of the same name
/// produces a fresh object.
#[repr(C)]
pub struct ObjSymbol {
    pub(crate) header: ObjHeader,
    /// The symbol's name string.
    pub name: *mut ObjString,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjSymbol {
    const TAG: Tag = Tag::Symbol;
}

/// `ID` - a hygienic identifier: either a renamed identifier (an inner
/// identifier plus the lexical environment it was introduced in) or a bare
/// name wrapping a string.
#[repr(C)]
pub struct ObjIdent {
    pub(crate) header: ObjHeader,
    /// An `ObjSymbol`, `ObjIdent` or `ObjString`.
    pub inner: NonNull<ObjHeader>,
    /// Introduction environment; null for bare names.
    pub env: *mut ObjEnv,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjIdent {
    const TAG: Tag = Tag::Ident;
}
