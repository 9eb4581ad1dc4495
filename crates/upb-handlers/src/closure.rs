use std::any::TypeId;

/// A type-erased handle to whatever state a handler threads through a
/// parse: the value returned by a START-style handler and passed back
/// in to every handler called "inside" that frame (spec §3 "Handlers
/// node").
///
/// The pointer is opaque on purpose — sinks decide what it means.
/// `ty` lets [`Handlers::freeze`](crate::Handlers::freeze) check that a
/// field's declared input closure type actually matches what the
/// enclosing frame produces, the same checking the C implementation
/// does with `const void*` type tags, done here with [`TypeId`]
/// instead of an unsafe pointer compare.
#[derive(Clone, Copy, Debug)]
pub struct Closure {
    ptr: *mut (),
    ty: TypeId,
}

impl Closure {
    /// Wraps `value` (borrowed for the duration of the call it's
    /// threaded through) as an opaque closure tagged with `T`'s type.
    pub fn new<T: 'static>(value: &mut T) -> Self {
        Closure { ptr: (value as *mut T).cast(), ty: TypeId::of::<T>() }
    }

    pub fn closure_type(&self) -> ClosureType {
        self.ty
    }

    /// Recovers the original `&mut T`, or `None` if `T` doesn't match
    /// the type this closure was tagged with.
    ///
    /// # Safety
    /// The caller must ensure the pointee is still valid for `'a` and
    /// that no other live reference to it exists — the same aliasing
    /// contract as `&mut T` always carries, just not checked by the
    /// borrow checker across the handler-table boundary.
    pub unsafe fn downcast_mut<'a, T: 'static>(&self) -> Option<&'a mut T> {
        if self.ty != TypeId::of::<T>() {
            return None;
        }
        Some(unsafe { &mut *self.ptr.cast::<T>() })
    }
}

/// Identifies a closure's concrete type for build-time compatibility
/// checking (spec §4.3 "Closure typing").
pub type ClosureType = TypeId;
