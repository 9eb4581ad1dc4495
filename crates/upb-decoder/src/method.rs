//! Compiled decoder methods and the group that owns their bytecode
//! (spec §3 "Decoder method/group").

use std::collections::HashMap;
use std::sync::Arc;

use upb_handlers::Handlers;

use crate::instr::{Instr, Pc};
use crate::wire::WireType;

/// Packed per-field dispatch entry: where to jump, and which wire
/// type(s) are expected there (spec §4.4 "Dispatch table").
///
/// A repeated primitive field can appear in either packed or
/// non-packed form; `secondary` carries the alternate entry point the
/// spec keys at `field_number + 2^29` in the source's single flat
/// table. Modeled here as an explicit optional field instead, since a
/// `HashMap` key doesn't need the bit-packing trick a flat array would.
#[derive(Debug, Clone, Copy)]
pub struct DispatchEntry {
    pub primary_wt: WireType,
    pub primary_target: Pc,
    pub secondary: Option<(WireType, Pc)>,
}

/// One message type's compiled entry point (spec §3 "DecoderMethod").
pub struct DecoderMethod {
    pub code_base: Pc,
    pub dispatch_table: HashMap<u32, DispatchEntry>,
    pub endmsg_pc: Pc,
    pub handlers: Arc<Handlers>,
}

/// A group of mutually-reachable compiled methods sharing one
/// monotonically-grown bytecode buffer (spec §3 "Decoder
/// method/group").
pub struct Group {
    pub code: Vec<Instr>,
    methods: HashMap<*const Handlers, DecoderMethod>,
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}

impl Group {
    pub fn new() -> Self {
        Group { code: Vec::new(), methods: HashMap::new() }
    }

    pub fn method_for(&self, h: &Arc<Handlers>) -> Option<&DecoderMethod> {
        self.methods.get(&Arc::as_ptr(h))
    }

    /// The handlers bound to the method whose entry point is `code_base`
    /// (spec §4.4: a `CALL` target identifies a method by PC, so the VM
    /// needs the reverse lookup back to that method's handlers/sink).
    pub fn handlers_for_code_base(&self, code_base: Pc) -> Option<Arc<Handlers>> {
        self.methods.values().find(|m| m.code_base == code_base).map(|m| m.handlers.clone())
    }

    pub(crate) fn insert_method(&mut self, h: Arc<Handlers>, m: DecoderMethod) {
        self.methods.insert(Arc::as_ptr(&h), m);
    }

    pub(crate) fn contains(&self, h: &Arc<Handlers>) -> bool {
        self.methods.contains_key(&Arc::as_ptr(h))
    }

    pub fn instr(&self, pc: Pc) -> Instr {
        self.code[pc]
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}
