use upb_rc::NodeId;

use crate::pool::DefPool;

/// Handle to an enum definition living in a [`DefPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumDef(pub(crate) NodeId);

impl EnumDef {
    pub fn full_name<'a>(&self, pool: &'a DefPool) -> &'a str {
        &pool.def(self.0).as_enum().full_name
    }

    pub fn value_count(&self, pool: &DefPool) -> usize {
        pool.def(self.0).as_enum().number_to_name.len()
    }

    /// Name table is authoritative; numbers may alias (spec §3).
    pub fn number_for_name(&self, pool: &DefPool, name: &str) -> Option<i32> {
        pool.def(self.0).as_enum().name_to_number.get(name).copied()
    }

    /// First-registered name for a number, or `None` if unused.
    pub fn name_for_number(&self, pool: &DefPool, number: i32) -> Option<String> {
        pool.def(self.0).as_enum().number_to_name.get(&number).cloned()
    }

    pub fn default_number(&self, pool: &DefPool) -> i32 {
        pool.def(self.0).as_enum().default_number
    }

    pub fn contains_number(&self, pool: &DefPool, number: i32) -> bool {
        pool.def(self.0).as_enum().number_to_name.contains_key(&number)
    }
}
