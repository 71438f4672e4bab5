//! Procedure-flavored variants: register frames, closures, condition
//! objects and dynamic-wind checkpoints.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::object::{HeapObject, ObjHeader, Tag};
use crate::state::State;
use crate::value::Value;

/// `CXT` - a lexical register frame at runtime, chained to the enclosing
/// frame through `up`.
#[repr(C)]
pub struct ObjContext {
    pub(crate) header: ObjHeader,
    /// Enclosing frame, or null.
    pub up: *mut ObjContext,
    /// Register storage, released by the finalizer.
    pub regs: Box<[Value]>,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjContext {
    const TAG: Tag = Tag::Context;
}

/// Signature of a native procedure.
pub type NativeFn = fn(&mut State) -> Value;

/// `FUNC` - a native closure with captured locals.
#[repr(C)]
pub struct ObjFunc {
    pub(crate) header: ObjHeader,
    /// The native entry point.
    pub func: NativeFn,
    /// Captured locals, released by the finalizer.
    pub locals: Box<[Value]>,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjFunc {
    const TAG: Tag = Tag::Func;
}

/// A compiled procedure body.
///
/// Ireps are ref-counted outside the collector. The literal pool of every
/// irep registered with the state is scanned as a root, so pool entries stay
/// live as long as the compiled code does.
pub struct Irep {
    /// Number of required arguments.
    pub argc: usize,
    /// Whether a rest argument is accepted.
    pub varg: bool,
    /// Bytecode.
    pub code: Vec<u8>,
    /// Literal pool; entries may reference heap objects.
    pub pool: Vec<Value>,
}

/// Shared handle to a compiled procedure body.
pub type IrepRef = Rc<Irep>;

/// `IREP` - a closure over a compiled procedure body. Finalizing the
/// closure drops its handle on the body.
#[repr(C)]
pub struct ObjClosure {
    pub(crate) header: ObjHeader,
    /// The compiled body.
    pub irep: IrepRef,
    /// Captured frame, or null.
    pub cxt: *mut ObjContext,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjClosure {
    const TAG: Tag = Tag::Closure;
}

/// `ERROR` - a condition object.
#[repr(C)]
pub struct ObjError {
    pub(crate) header: ObjHeader,
    /// Condition type.
    pub ty: Value,
    /// Message string.
    pub msg: Value,
    /// Irritants list.
    pub irrs: Value,
    /// Captured call stack.
    pub stack: Value,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjError {
    const TAG: Tag = Tag::Error;
}

/// `CP` - a dynamic-wind checkpoint: the enclosing checkpoint plus the
/// before and after procedures of the wind.
#[repr(C)]
pub struct ObjCheckpoint {
    pub(crate) header: ObjHeader,
    /// Enclosing checkpoint, or null.
    pub prev: *mut ObjCheckpoint,
    /// Procedure run when control enters the wind.
    pub wind_in: Value,
    /// Procedure run when control leaves the wind.
    pub wind_out: Value,
}

// SAFETY: repr(C), header first, tag unique.
unsafe impl HeapObject for ObjCheckpoint {
    const TAG: Tag = Tag::Checkpoint;
}
