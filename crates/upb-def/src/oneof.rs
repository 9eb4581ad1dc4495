use upb_rc::NodeId;

use crate::field::FieldDef;
use crate::msg::MsgDef;
use crate::pool::DefPool;

/// Handle to a oneof definition living in a [`DefPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OneofDef(pub(crate) NodeId);

impl OneofDef {
    pub fn name<'a>(&self, pool: &'a DefPool) -> &'a str {
        &pool.def(self.0).as_oneof().name
    }

    pub fn containing_message(&self, pool: &DefPool) -> MsgDef {
        MsgDef(pool.def(self.0).as_oneof().containing_msg)
    }

    pub fn field_count(&self, pool: &DefPool) -> usize {
        pool.def(self.0).as_oneof().fields_by_number.len()
    }

    pub fn field_by_number(&self, pool: &DefPool, number: u32) -> Option<FieldDef> {
        pool.def(self.0).as_oneof().fields_by_number.get(&number).copied().map(FieldDef)
    }

    pub fn field_by_name(&self, pool: &DefPool, name: &str) -> Option<FieldDef> {
        pool.def(self.0).as_oneof().fields_by_name.get(name).copied().map(FieldDef)
    }
}
