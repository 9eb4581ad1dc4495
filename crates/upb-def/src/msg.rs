use upb_rc::NodeId;

use crate::field::FieldDef;
use crate::oneof::OneofDef;
use crate::pool::DefPool;

/// Handle to a message definition living in a [`DefPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MsgDef(pub(crate) NodeId);

/// Spec §4.2's `UPB_STATIC_SELECTOR_COUNT`: STARTMSG and ENDMSG.
pub const STATIC_SELECTOR_COUNT: u32 = 2;

impl MsgDef {
    pub fn full_name<'a>(&self, pool: &'a DefPool) -> &'a str {
        &pool.def(self.0).as_msg().full_name
    }

    pub fn is_map_entry(&self, pool: &DefPool) -> bool {
        pool.def(self.0).as_msg().map_entry
    }

    pub fn field_count(&self, pool: &DefPool) -> usize {
        pool.def(self.0).as_msg().fields_by_number.len()
    }

    pub fn field_by_number(&self, pool: &DefPool, number: u32) -> Option<FieldDef> {
        pool.def(self.0).as_msg().fields_by_number.get(&number).copied().map(FieldDef)
    }

    pub fn field_by_name(&self, pool: &DefPool, name: &str) -> Option<FieldDef> {
        pool.def(self.0).as_msg().fields_by_name.get(name).copied().map(FieldDef)
    }

    pub fn oneof_by_name(&self, pool: &DefPool, name: &str) -> Option<OneofDef> {
        pool.def(self.0).as_msg().oneofs_by_name.get(name).copied().map(OneofDef)
    }

    /// Fields in ascending field-number order (not selector order).
    pub fn fields(&self, pool: &DefPool) -> Vec<FieldDef> {
        pool.def(self.0).as_msg().fields_by_number.values().copied().map(FieldDef).collect()
    }

    /// Total selector count for this message, assigned at freeze
    /// (spec §3 / §4.2).
    pub fn selector_count(&self, pool: &DefPool) -> u32 {
        pool.def(self.0).as_msg().selector_count
    }

    /// Number of submessage-typed fields (lazy or not), assigned at
    /// freeze. Equal to the subhandlers array length (spec §4.3).
    pub fn submsg_field_count(&self, pool: &DefPool) -> u32 {
        pool.def(self.0).as_msg().submsg_field_count
    }
}
