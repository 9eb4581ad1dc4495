use std::collections::{HashMap, HashSet, VecDeque};

use tracing::{debug, trace};
use upb_rc::{Arena, NodeId};

use crate::def::{Def, EnumData, FieldData, MsgData, OneofData, SubdefRef};
use crate::enum_def::EnumDef;
use crate::error::DefError;
use crate::field::{FieldBuilder, FieldDef};
use crate::msg::MsgDef;
use crate::oneof::OneofDef;
use crate::selector;
use crate::types::{FieldType, Label};

const OWNER: &str = "upb-def::symtab";

/// A type-erased handle into a [`DefPool`], used for freeze roots and
/// symbol-table lookups (spec §6 "Symbol table ... iterable by
/// deftype").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefId {
    Msg(NodeId),
    Field(NodeId),
    Enum(NodeId),
    Oneof(NodeId),
}

impl DefId {
    fn node(self) -> NodeId {
        match self {
            DefId::Msg(n) | DefId::Field(n) | DefId::Enum(n) | DefId::Oneof(n) => n,
        }
    }
}

impl From<MsgDef> for DefId {
    fn from(m: MsgDef) -> Self {
        DefId::Msg(m.0)
    }
}
impl From<FieldDef> for DefId {
    fn from(f: FieldDef) -> Self {
        DefId::Field(f.0)
    }
}
impl From<EnumDef> for DefId {
    fn from(e: EnumDef) -> Self {
        DefId::Enum(e.0)
    }
}
impl From<OneofDef> for DefId {
    fn from(o: OneofDef) -> Self {
        DefId::Oneof(o.0)
    }
}

/// A queued request to replace the def currently registered under
/// `full_name` (which must already be frozen) with a freshly-built
/// mutable def, in the next `freeze` call (spec §4.2 "Duplication rule
/// for symbol-table edits").
struct Replacement {
    full_name: String,
    new_node: NodeId,
}

/// The mutable-to-frozen definition graph: messages, fields, enums and
/// oneofs, plus the fully-qualified-name symbol table over them
/// (spec §3 "Definition graph", §6 "Symbol table").
pub struct DefPool {
    arena: Arena<Def>,
    by_name: HashMap<String, NodeId>,
    pending: Vec<NodeId>,
    replacements: Vec<Replacement>,
}

impl Default for DefPool {
    fn default() -> Self {
        Self::new()
    }
}

impl DefPool {
    pub fn new() -> Self {
        DefPool {
            arena: Arena::new(),
            by_name: HashMap::new(),
            pending: Vec::new(),
            replacements: Vec::new(),
        }
    }

    pub(crate) fn def(&self, id: NodeId) -> &Def {
        self.arena.payload(id)
    }

    pub(crate) fn def_mut(&mut self, id: NodeId) -> &mut Def {
        self.arena.payload_mut(id)
    }

    fn is_valid_full_name(name: &str) -> bool {
        if !name.starts_with('.') {
            return false;
        }
        name[1..].split('.').all(|part| is_identifier(part)) && name.len() > 1
    }

    fn is_valid_field_name(name: &str) -> bool {
        is_identifier(name)
    }

    /// Looks up a frozen or pending def by fully-qualified name.
    pub fn lookup(&self, full_name: &str) -> Option<DefId> {
        let id = *self.by_name.get(full_name)?;
        Some(match self.arena.payload(id) {
            Def::Msg(_) => DefId::Msg(id),
            Def::Field(_) => DefId::Field(id),
            Def::Enum(_) => DefId::Enum(id),
            Def::Oneof(_) => DefId::Oneof(id),
        })
    }

    /// Iterates every frozen message def currently registered (spec
    /// §6: "iterable by deftype").
    pub fn iter_messages(&self) -> impl Iterator<Item = MsgDef> + '_ {
        self.by_name.values().filter_map(move |&id| match self.arena.payload(id) {
            Def::Msg(_) if self.arena.is_frozen(id) => Some(MsgDef(id)),
            _ => None,
        })
    }

    /// Iterates every frozen enum def currently registered.
    pub fn iter_enums(&self) -> impl Iterator<Item = EnumDef> + '_ {
        self.by_name.values().filter_map(move |&id| match self.arena.payload(id) {
            Def::Enum(_) if self.arena.is_frozen(id) => Some(EnumDef(id)),
            _ => None,
        })
    }

    // ---- Mutable construction API -----------------------------------

    pub fn new_msg(&mut self, full_name: impl Into<String>) -> Result<MsgDef, DefError> {
        let full_name = full_name.into();
        if !Self::is_valid_full_name(&full_name) {
            return Err(DefError::InvalidTypeName(full_name));
        }
        if self.by_name.contains_key(&full_name) {
            return Err(DefError::DuplicateTypeName(full_name));
        }
        let id = self.arena.init(Def::Msg(MsgData::new(full_name.clone())), OWNER)?;
        self.by_name.insert(full_name, id);
        self.pending.push(id);
        Ok(MsgDef(id))
    }

    pub fn new_enum(&mut self, full_name: impl Into<String>) -> Result<EnumDef, DefError> {
        let full_name = full_name.into();
        if !Self::is_valid_full_name(&full_name) {
            return Err(DefError::InvalidTypeName(full_name));
        }
        if self.by_name.contains_key(&full_name) {
            return Err(DefError::DuplicateTypeName(full_name));
        }
        let id = self.arena.init(Def::Enum(EnumData::new(full_name.clone())), OWNER)?;
        self.by_name.insert(full_name, id);
        self.pending.push(id);
        Ok(EnumDef(id))
    }

    /// Queues a replacement of the existing (frozen) def named
    /// `full_name` with a fresh mutable message, to be reconciled via
    /// dup-on-demand at the next `freeze` call.
    pub fn replace_msg(&mut self, full_name: impl Into<String>) -> Result<MsgDef, DefError> {
        let full_name = full_name.into();
        if !Self::is_valid_full_name(&full_name) {
            return Err(DefError::InvalidTypeName(full_name));
        }
        self.by_name
            .get(&full_name)
            .copied()
            .filter(|&id| self.arena.is_frozen(id))
            .ok_or_else(|| DefError::DuplicateTypeName(full_name.clone()))?;
        let id = self.arena.init(Def::Msg(MsgData::new(full_name.clone())), OWNER)?;
        self.pending.push(id);
        self.replacements.push(Replacement { full_name, new_node: id });
        Ok(MsgDef(id))
    }

    pub fn enum_add_value(&mut self, e: EnumDef, name: &str, number: i32) -> Result<(), DefError> {
        if !is_identifier(name) {
            return Err(DefError::InvalidFieldName(name.to_string()));
        }
        let data = self.def_mut(e.0).as_enum_mut();
        if data.number_to_name.is_empty() {
            data.default_number = number;
        }
        data.name_to_number.insert(name.to_string(), number);
        data.number_to_name.entry(number).or_insert_with(|| name.to_string());
        Ok(())
    }

    pub fn new_oneof(&mut self, msg: MsgDef, name: impl Into<String>) -> Result<OneofDef, DefError> {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(DefError::InvalidFieldName(name));
        }
        if self.def(msg.0).as_msg().oneofs_by_name.contains_key(&name) {
            let msg_name = self.def(msg.0).as_msg().full_name.clone();
            return Err(DefError::DuplicateFieldName { msg: msg_name, name });
        }
        let id = self.arena.init(Def::Oneof(OneofData::new(name.clone(), msg.0)), OWNER)?;
        self.arena.ref2(msg.0, id)?; // oneof -> containing msg
        self.def_mut(msg.0).as_msg_mut().oneofs_by_name.insert(name, id);
        self.pending.push(id);
        Ok(OneofDef(id))
    }

    /// Creates a field on `msg` (spec §6: "creating mutable ... field
    /// defs; calling setters").
    pub fn new_field(&mut self, msg: MsgDef, b: FieldBuilder) -> Result<FieldDef, DefError> {
        if !Self::is_valid_field_name(&b.name) {
            return Err(DefError::InvalidFieldName(b.name));
        }
        if b.number == 0 {
            return Err(DefError::ReservedFieldNumberZero);
        }
        if b.number > (1 << 29) - 1 {
            return Err(DefError::InvalidFieldNumber(b.number));
        }
        if b.lazy && b.ty != FieldType::Message {
            return Err(DefError::LazyRequiresSubmessage(b.name));
        }
        {
            let msg_data = self.def(msg.0).as_msg();
            if msg_data.fields_by_number.contains_key(&b.number) {
                return Err(DefError::DuplicateFieldNumber {
                    msg: msg_data.full_name.clone(),
                    number: b.number,
                });
            }
            if msg_data.fields_by_name.contains_key(&b.name) {
                return Err(DefError::DuplicateFieldName {
                    msg: msg_data.full_name.clone(),
                    name: b.name,
                });
            }
        }

        let field_data = FieldData {
            name: b.name.clone(),
            number: b.number,
            label: b.label,
            ty: b.ty,
            encoding: b.encoding,
            lazy: b.lazy,
            packed: b.packed,
            extension: b.extension,
            tag_delimited: b.tag_delimited,
            default: b.default,
            subdef: SubdefRef::None,
            containing_msg: msg.0,
            containing_oneof: None,
            index_in_msg: 0,
            selector_base: 0,
            end_submsg_selector: 0,
        };
        let id = self.arena.init(Def::Field(field_data), OWNER)?;
        self.arena.ref2(msg.0, id)?; // field -> containing msg

        let msg_data = self.def_mut(msg.0).as_msg_mut();
        msg_data.fields_by_number.insert(b.number, id);
        msg_data.fields_by_name.insert(b.name, id);
        self.pending.push(id);
        Ok(FieldDef(id))
    }

    pub fn field_join_oneof(&mut self, field: FieldDef, oneof: OneofDef) -> Result<(), DefError> {
        self.arena.ref2(oneof.0, field.0)?;
        let number = self.def(field.0).as_field().number;
        let name = self.def(field.0).as_field().name.clone();
        self.def_mut(field.0).as_field_mut().containing_oneof = Some(oneof.0);
        let od = self.def_mut(oneof.0).as_oneof_mut();
        od.fields_by_number.insert(number, field.0);
        od.fields_by_name.insert(name, field.0);
        Ok(())
    }

    /// Directly wires a resolved message subdef (bypassing symbolic
    /// resolution), for callers that already hold the target handle.
    pub fn field_set_message_subdef(&mut self, field: FieldDef, target: MsgDef) -> Result<(), DefError> {
        if self.def(field.0).as_field().ty != FieldType::Message {
            return Err(DefError::SubdefTypeMismatch {
                field: self.def(field.0).as_field().name.clone(),
                expected: "message",
                actual: "non-message",
            });
        }
        self.arena.ref2(target.0, field.0)?;
        self.def_mut(field.0).as_field_mut().subdef = SubdefRef::Resolved(target.0);
        Ok(())
    }

    pub fn field_set_enum_subdef(&mut self, field: FieldDef, target: EnumDef) -> Result<(), DefError> {
        if self.def(field.0).as_field().ty != FieldType::Enum {
            return Err(DefError::SubdefTypeMismatch {
                field: self.def(field.0).as_field().name.clone(),
                expected: "enum",
                actual: "non-enum",
            });
        }
        self.arena.ref2(target.0, field.0)?;
        self.def_mut(field.0).as_field_mut().subdef = SubdefRef::Resolved(target.0);
        Ok(())
    }

    /// Sets a pending symbolic subdef name (spec §3: "(b) a symbolic
    /// `.pkg.Name` reference pending resolution"), resolved during the
    /// next `freeze`.
    pub fn field_set_subdef_symbolic(&mut self, field: FieldDef, name: impl Into<String>) {
        self.def_mut(field.0).as_field_mut().subdef = SubdefRef::Symbolic(name.into());
    }

    pub fn set_map_entry(&mut self, msg: MsgDef, map_entry: bool) {
        self.def_mut(msg.0).as_msg_mut().map_entry = map_entry;
    }

    // ---- Freeze ------------------------------------------------------

    /// Validates, resolves names, assigns selectors and freezes the
    /// transitive closure of every def added (or queued for
    /// replacement) since the last successful `freeze` call.
    ///
    /// On any error the pool is left exactly as it was before this
    /// call (spec §8 property 1): no names, fields or group state
    /// observably change.
    pub fn freeze(&mut self, roots: &[DefId], max_depth: usize) -> Result<(), DefError> {
        if self.pending.is_empty() && self.replacements.is_empty() {
            return Ok(());
        }

        let dup_map = self.prepare_replacements()?;

        let validate_result = self.validate_and_resolve();
        if let Err(e) = validate_result {
            self.rollback_pending(&dup_map);
            return Err(e);
        }

        let mut all_roots: Vec<NodeId> = roots.iter().map(|d| d.node()).collect();
        all_roots.extend(self.pending.iter().copied());
        all_roots.extend(dup_map.values().copied());
        all_roots.sort();
        all_roots.dedup();

        for &msg in &self.pending_msgs() {
            selector::assign_selectors(self, msg);
        }

        match self.arena.freeze(&all_roots, max_depth) {
            Ok(stats) => {
                debug!(?stats, "upb-def::freeze committed");
            }
            Err(e) => {
                // Phase 1 of rc::freeze performs no mutation, so a
                // failure here leaves the arena untouched; only our
                // own bookkeeping (pending/replacements) needs undoing.
                self.rollback_pending(&dup_map);
                return Err(DefError::Rc(e));
            }
        }

        self.commit_replacements(dup_map);
        self.pending.clear();
        Ok(())
    }

    fn pending_msgs(&self) -> Vec<NodeId> {
        self.pending
            .iter()
            .copied()
            .filter(|&id| matches!(self.arena.payload(id), Def::Msg(_)))
            .collect()
    }

    fn rollback_pending(&mut self, dup_map: &HashMap<NodeId, NodeId>) {
        // Newly-created nodes (fresh inits, not yet frozen) have no
        // external holders beyond our own bookkeeping; dropping the
        // pool's references to them is enough since nothing else has
        // `ref`'d them yet. Remove their provisional by_name entries.
        self.by_name.retain(|_, id| !self.pending.contains(id) && !dup_map.values().any(|d| d == id));
        self.pending.clear();
        self.replacements.clear();
    }

    /// Structural validation (spec §4.2) plus symbolic name resolution,
    /// run over every pending field/msg/enum before any freeze commit.
    fn validate_and_resolve(&mut self) -> Result<(), DefError> {
        let pending = self.pending.clone();

        for &id in &pending {
            if let Def::Enum(e) = self.arena.payload(id) {
                if e.number_to_name.is_empty() {
                    return Err(DefError::EmptyEnum(e.full_name.clone()));
                }
            }
        }

        for &id in &pending {
            let is_field = matches!(self.arena.payload(id), Def::Field(_));
            if !is_field {
                continue;
            }
            self.validate_and_resolve_field(id)?;
        }

        for &id in &pending {
            if let Def::Msg(m) = self.arena.payload(id) {
                if m.map_entry {
                    let numbers: HashSet<u32> = m.fields_by_number.keys().copied().collect();
                    if numbers != HashSet::from([1u32, 2u32]) {
                        return Err(DefError::MalformedMapEntry(m.full_name.clone()));
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_and_resolve_field(&mut self, id: NodeId) -> Result<(), DefError> {
        let (name, number, ty, lazy, subdef) = {
            let f = self.arena.payload(id).as_field();
            (f.name.clone(), f.number, f.ty, f.lazy, f.subdef.clone())
        };

        if !Self::is_valid_field_name(&name) {
            return Err(DefError::InvalidFieldName(name));
        }
        if number == 0 {
            return Err(DefError::ReservedFieldNumberZero);
        }
        if number > (1 << 29) - 1 {
            return Err(DefError::InvalidFieldNumber(number));
        }
        if lazy && ty != FieldType::Message {
            return Err(DefError::LazyRequiresSubmessage(name));
        }

        let resolved = match subdef {
            SubdefRef::None => {
                if ty.is_message() || ty.is_enum() {
                    return Err(DefError::UnresolvedSubdef(name));
                }
                None
            }
            SubdefRef::Resolved(target) => Some(target),
            SubdefRef::Symbolic(symbolic) => {
                if !symbolic.starts_with('.') {
                    return Err(DefError::RelativeNameUnsupported(symbolic));
                }
                let target = *self
                    .by_name
                    .get(&symbolic)
                    .ok_or_else(|| DefError::SymbolNotFound(symbolic.clone()))?;
                let kind_ok = match self.arena.payload(target) {
                    Def::Msg(_) => ty.is_message(),
                    Def::Enum(_) => ty.is_enum(),
                    _ => false,
                };
                if !kind_ok {
                    return Err(DefError::SubdefTypeMismatch {
                        field: name,
                        expected: if ty.is_message() { "message" } else { "enum" },
                        actual: self.arena.payload(target).kind_name(),
                    });
                }
                self.arena.ref2(target, id)?;
                Some(target)
            }
        };

        if let Some(target) = resolved {
            self.arena.payload_mut(id).as_field_mut().subdef = SubdefRef::Resolved(target);

            if let Def::Msg(m) = self.arena.payload(target) {
                if m.map_entry && !matches!(self.arena.payload(id).as_field().label, Label::Repeated) {
                    return Err(DefError::MapEntryFieldNotRepeated(name));
                }
            }
        }

        Ok(())
    }

    /// Dup-on-demand (spec §4.2): for every queued replacement, finds
    /// every existing frozen def that can transitively reach the def
    /// being replaced, duplicates that whole reachable subgraph as
    /// fresh mutable nodes wired to the new replacement, and arranges
    /// for the symbol table to point at the duplicates once this
    /// freeze commits.
    fn prepare_replacements(&mut self) -> Result<HashMap<NodeId, NodeId>, DefError> {
        if self.replacements.is_empty() {
            return Ok(HashMap::new());
        }

        let mut old_to_new: HashMap<NodeId, NodeId> = HashMap::new();
        for r in &self.replacements {
            let old = *self
                .by_name
                .get(&r.full_name)
                .ok_or_else(|| DefError::SymbolNotFound(r.full_name.clone()))?;
            old_to_new.insert(old, r.new_node);
        }

        let targets: Vec<NodeId> = old_to_new.keys().copied().collect();
        let reachers = self.find_duplication_set(&targets);

        let mut dup_map: HashMap<NodeId, NodeId> = HashMap::new();
        for &old in &reachers {
            let data = self.arena.payload(old).clone();
            let new_id = self.arena.init(data, OWNER)?;
            dup_map.insert(old, new_id);
            self.pending.push(new_id);
        }

        // Second pass: rewrite internal references and re-establish
        // ref2 edges using the duplicate graph where applicable.
        for (&old, &new) in &dup_map {
            let out_edges: Vec<NodeId> = self.arena.out_edges(old).to_vec();
            remap_def_refs(self.arena.payload_mut(new), &dup_map, &old_to_new);
            for target in out_edges {
                let remapped = dup_map
                    .get(&target)
                    .or_else(|| old_to_new.get(&target))
                    .copied()
                    .unwrap_or(target);
                self.arena.ref2(remapped, new)?;
            }
        }

        // Fold the dup map into the replacement map so validation /
        // selector assignment / freeze roots see both new top-level
        // replacements and their duplicated dependents uniformly.
        for (&old, &new) in &dup_map {
            old_to_new.entry(old).or_insert(new);
        }
        trace!(dup_count = dup_map.len(), "upb-def::dup-on-demand");
        Ok(old_to_new)
    }

    /// The full set of existing frozen defs that need duplicating
    /// because replacing `targets` would otherwise leave them holding
    /// stale `NodeId`s — either directly (a field/oneof whose `ref2`
    /// points at a target) or structurally (a message whose field
    /// table names a field that itself got duplicated).
    ///
    /// This walks two distinct edge kinds to a fixed point: reverse
    /// `ref2` edges (who points at this node) and the `containing_msg`/
    /// `containing_oneof` back-reference (a duplicated field or oneof
    /// drags its container along, since the container's lookup tables
    /// embed the old `NodeId` as plain data, not a `ref2` edge).
    fn find_duplication_set(&self, targets: &[NodeId]) -> HashSet<NodeId> {
        let mut reverse: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for node in self.arena.node_ids() {
            if !self.arena.is_frozen(node) {
                continue;
            }
            for &to in self.arena.out_edges(node) {
                reverse.entry(to).or_default().push(node);
            }
        }

        let mut result: HashSet<NodeId> = HashSet::new();
        let mut queue: VecDeque<NodeId> = targets.iter().copied().collect();
        while let Some(node) = queue.pop_front() {
            if let Some(parents) = reverse.get(&node) {
                for &parent in parents {
                    if result.insert(parent) {
                        queue.push_back(parent);
                    }
                }
            }
            if !self.arena.is_frozen(node) {
                continue;
            }
            let container = match self.arena.payload(node) {
                Def::Field(f) => Some(f.containing_msg),
                Def::Oneof(o) => Some(o.containing_msg),
                _ => None,
            };
            if let Some(c) = container {
                if result.insert(c) {
                    queue.push_back(c);
                }
            }
        }
        result
    }

    fn commit_replacements(&mut self, dup_map: HashMap<NodeId, NodeId>) {
        // Every old node this freeze subsumed (explicit replacements
        // and their duplicated reachers alike) gets its symbol-table
        // slot repointed at the new node in one pass.
        for slot in self.by_name.values_mut() {
            if let Some(&new) = dup_map.get(slot) {
                *slot = new;
            }
        }
        self.replacements.clear();
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn remap_def_refs(def: &mut Def, dup_map: &HashMap<NodeId, NodeId>, old_to_new: &HashMap<NodeId, NodeId>) {
    let remap = |id: &mut NodeId| {
        if let Some(&n) = dup_map.get(id).or_else(|| old_to_new.get(id)) {
            *id = n;
        }
    };
    match def {
        Def::Msg(m) => {
            for v in m.fields_by_number.values_mut() {
                remap(v);
            }
            for v in m.fields_by_name.values_mut() {
                remap(v);
            }
            for v in m.oneofs_by_name.values_mut() {
                remap(v);
            }
        }
        Def::Field(f) => {
            remap(&mut f.containing_msg);
            if let Some(o) = &mut f.containing_oneof {
                remap(o);
            }
            if let SubdefRef::Resolved(target) = &mut f.subdef {
                remap(target);
            }
        }
        Def::Enum(_) => {}
        Def::Oneof(o) => {
            remap(&mut o.containing_msg);
            for v in o.fields_by_number.values_mut() {
                remap(v);
            }
            for v in o.fields_by_name.values_mut() {
                remap(v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldBuilder;
    use crate::types::FieldType;

    #[test]
    fn freeze_resolves_symbolic_subdef_and_registers_names() {
        let mut pool = DefPool::new();
        let inner = pool.new_msg(".p.Inner").unwrap();
        let outer = pool.new_msg(".p.Outer").unwrap();
        let f = pool
            .new_field(outer, FieldBuilder::new("sub", 1, Label::Optional, FieldType::Message))
            .unwrap();
        pool.field_set_subdef_symbolic(f, ".p.Inner");

        pool.freeze(&[outer.into(), inner.into()], 64).unwrap();

        assert!(matches!(pool.lookup(".p.Inner"), Some(DefId::Msg(_))));
        assert_eq!(f.message_subdef(&pool).0, inner.0);
    }

    #[test]
    fn freeze_rolls_back_pending_names_on_validation_failure() {
        let mut pool = DefPool::new();
        let outer = pool.new_msg(".p.Outer").unwrap();
        let f = pool
            .new_field(outer, FieldBuilder::new("sub", 1, Label::Optional, FieldType::Message))
            .unwrap();
        pool.field_set_subdef_symbolic(f, ".p.Missing");

        let err = pool.freeze(&[outer.into()], 64).unwrap_err();
        assert!(matches!(err, DefError::SymbolNotFound(_)));
        assert!(pool.lookup(".p.Outer").is_none());
    }

    #[test]
    fn map_entry_field_must_be_repeated() {
        let mut pool = DefPool::new();
        let entry = pool.new_msg(".p.StrEntry").unwrap();
        pool.new_field(entry, FieldBuilder::new("key", 1, Label::Optional, FieldType::String)).unwrap();
        pool.new_field(entry, FieldBuilder::new("value", 2, Label::Optional, FieldType::String)).unwrap();
        pool.set_map_entry(entry, true);

        let holder = pool.new_msg(".p.Holder").unwrap();
        let f = pool
            .new_field(holder, FieldBuilder::new("m", 1, Label::Optional, FieldType::Message))
            .unwrap();
        pool.field_set_message_subdef(f, entry).unwrap();

        let err = pool.freeze(&[holder.into(), entry.into()], 64).unwrap_err();
        assert!(matches!(err, DefError::MapEntryFieldNotRepeated(_)));
    }

    #[test]
    fn replace_msg_duplicates_frozen_reachers_and_repoints_symbol_table() {
        let mut pool = DefPool::new();
        let target = pool.new_msg(".p.Target").unwrap();
        let holder = pool.new_msg(".p.Holder").unwrap();
        let f = pool
            .new_field(holder, FieldBuilder::new("t", 1, Label::Optional, FieldType::Message))
            .unwrap();
        pool.field_set_message_subdef(f, target).unwrap();
        pool.freeze(&[holder.into(), target.into()], 64).unwrap();

        let new_target = pool.replace_msg(".p.Target").unwrap();
        pool.freeze(&[new_target.into()], 64).unwrap();

        let new_holder = match pool.lookup(".p.Holder") {
            Some(DefId::Msg(id)) => MsgDef(id),
            _ => panic!("holder vanished from symbol table"),
        };
        assert_ne!(new_holder.0, holder.0);
        let dup_field = new_holder.field_by_number(&pool, 1).expect("duplicated field");
        assert_eq!(dup_field.message_subdef(&pool).0, new_target.0);
    }

    #[test]
    fn iter_messages_and_enums_only_see_frozen_defs() {
        let mut pool = DefPool::new();
        let frozen = pool.new_msg(".p.Frozen").unwrap();
        pool.new_field(frozen, FieldBuilder::new("v", 1, Label::Optional, FieldType::Int32)).unwrap();
        let pending = pool.new_msg(".p.Pending").unwrap();
        pool.new_field(pending, FieldBuilder::new("v", 1, Label::Optional, FieldType::Int32)).unwrap();

        pool.freeze(&[frozen.into()], 64).unwrap();

        let names: Vec<&str> = pool.iter_messages().map(|m| m.full_name(&pool)).collect();
        assert_eq!(names, vec![".p.Frozen"]);
        assert_eq!(pool.iter_enums().count(), 0);
    }
}
