use std::sync::Arc;

use crate::closure::{Closure, ClosureType};

/// Outcome reported to `ENDMSG` handlers: build/parse-time status, not
/// a full error type (the decoder's own `DecodeError` carries the
/// detail; this is just ok/not-ok plus a short reason for tracing).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    Ok,
    Error,
}

/// One of the function-pointer shapes a selector slot can hold (spec
/// §3 "Handlers node": "a flat array ... each entry is
/// `{function-pointer, attr}`"). Rust has no portable `void*`
/// function-pointer cast, so the C union-of-signatures is replaced
/// with a closed enum — the dispatcher matches on the selector's known
/// kind (from the bound `FieldDef`) and always unwraps the matching
/// variant.
#[derive(Clone, Copy)]
pub enum HandlerFn {
    StartMsg(fn(Closure) -> Option<Closure>),
    EndMsg(fn(Closure, DecodeStatus) -> bool),
    Int32(fn(Closure, i32) -> bool),
    Int64(fn(Closure, i64) -> bool),
    UInt32(fn(Closure, u32) -> bool),
    UInt64(fn(Closure, u64) -> bool),
    Bool(fn(Closure, bool) -> bool),
    Float(fn(Closure, f32) -> bool),
    Double(fn(Closure, f64) -> bool),
    StartStr(fn(Closure, usize) -> Option<Closure>),
    StringChunk(fn(Closure, &[u8]) -> usize),
    EndStr(fn(Closure) -> bool),
    StartSeq(fn(Closure) -> Option<Closure>),
    EndSeq(fn(Closure) -> bool),
    StartSubMsg(fn(Closure) -> Option<Closure>),
    EndSubMsg(fn(Closure) -> bool),
}

/// Per-selector metadata accompanying a [`HandlerFn`] (spec §3: "attr
/// contains user handler data, an always-ok flag, an expected input
/// closure type, and an expected sub-returned closure type").
#[derive(Clone, Default)]
pub struct HandlerAttr {
    /// If true, the decoder may skip checking this handler's return
    /// value (it always signals success).
    pub always_ok: bool,
    /// The closure type this handler expects to receive.
    pub input_closure_type: Option<ClosureType>,
    /// For START-style handlers: the closure type the returned
    /// [`Closure`] is tagged with.
    pub return_closure_type: Option<ClosureType>,
    /// Opaque user data threaded alongside the handler, retrievable by
    /// the handler body via downcast.
    pub user_data: Option<Arc<dyn std::any::Any + Send + Sync>>,
}

impl HandlerAttr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_ok(mut self, always_ok: bool) -> Self {
        self.always_ok = always_ok;
        self
    }

    pub fn input_closure_type(mut self, ty: ClosureType) -> Self {
        self.input_closure_type = Some(ty);
        self
    }

    pub fn return_closure_type(mut self, ty: ClosureType) -> Self {
        self.return_closure_type = Some(ty);
        self
    }

    pub fn user_data(mut self, data: Arc<dyn std::any::Any + Send + Sync>) -> Self {
        self.user_data = Some(data);
        self
    }
}

#[derive(Clone, Default)]
pub(crate) struct HandlerEntry {
    pub func: Option<HandlerFn>,
    pub attr: HandlerAttr,
}
