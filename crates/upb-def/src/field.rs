use upb_rc::NodeId;

use crate::def::SubdefRef;
use crate::pool::DefPool;
use crate::types::{DefaultValue, FieldType, IntEncoding, Label};
use crate::{EnumDef, MsgDef, OneofDef};

/// Handle to a field definition living in a [`DefPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDef(pub(crate) NodeId);

/// Parameters for [`DefPool::new_field`]. A plain builder struct (not
/// a fluent builder) since every field is set up front and the result
/// is handed to the pool in one call, matching the descriptor
/// reader's "create, set fields, insert" flow (spec §6).
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    pub name: String,
    pub number: u32,
    pub label: Label,
    pub ty: FieldType,
    pub encoding: IntEncoding,
    pub lazy: bool,
    pub packed: bool,
    pub extension: bool,
    pub tag_delimited: bool,
    pub default: DefaultValue,
}

impl FieldBuilder {
    pub fn new(name: impl Into<String>, number: u32, label: Label, ty: FieldType) -> Self {
        FieldBuilder {
            name: name.into(),
            number,
            label,
            ty,
            encoding: IntEncoding::Variable,
            lazy: false,
            packed: false,
            extension: false,
            tag_delimited: false,
            default: DefaultValue::None,
        }
    }

    pub fn encoding(mut self, encoding: IntEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn packed(mut self, packed: bool) -> Self {
        self.packed = packed;
        self
    }

    pub fn tag_delimited(mut self, tag_delimited: bool) -> Self {
        self.tag_delimited = tag_delimited;
        self
    }

    pub fn default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }
}

/// The shape a field's handler selectors take, driving both the
/// selector-count formula (spec §4.2) and the decoder code shape
/// (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    StringLike,
    SubMessage,
    LazySubMessage,
}

impl FieldKind {
    pub fn of(ty: FieldType, lazy: bool) -> FieldKind {
        if ty.is_message() {
            if lazy { FieldKind::LazySubMessage } else { FieldKind::SubMessage }
        } else if ty.is_string_like() {
            FieldKind::StringLike
        } else {
            FieldKind::Scalar
        }
    }

    /// True for both non-lazy and lazy submessage fields: both reserve
    /// a STARTSUBMSG slot in the low, dense-index-addressed selector
    /// range (spec §4.2).
    pub fn is_submessage_like(self) -> bool {
        matches!(self, FieldKind::SubMessage | FieldKind::LazySubMessage)
    }

    /// Additional cursor-allocated selectors this field kind needs
    /// beyond its reserved STARTSUBMSG slot (if any), before the
    /// `repeated` STARTSEQ/ENDSEQ wrapper is added.
    ///
    /// Deviation from the literal spec text, recorded in DESIGN.md:
    /// the source's "+0 for non-lazy submessage" collapses ENDSUBMSG
    /// into the same numeric slot as STARTSUBMSG, which spec §9
    /// explicitly permits an implementation to split into two
    /// independent values. Here ENDSUBMSG gets its own cursor slot (a
    /// net "+1"), keeping every (field, handler-kind) pair mapped to a
    /// distinct selector without reusing index space.
    pub fn base_selector_count(self) -> u32 {
        match self {
            FieldKind::Scalar => 1,            // the value selector
            FieldKind::StringLike => 3,        // STARTSTR, STRING, ENDSTR
            FieldKind::SubMessage => 1,         // ENDSUBMSG
            FieldKind::LazySubMessage => 3,     // delivered as a string
        }
    }
}

impl FieldDef {
    pub fn name<'a>(&self, pool: &'a DefPool) -> &'a str {
        &pool.def(self.0).as_field().name
    }

    pub fn number(&self, pool: &DefPool) -> u32 {
        pool.def(self.0).as_field().number
    }

    pub fn label(&self, pool: &DefPool) -> Label {
        pool.def(self.0).as_field().label
    }

    pub fn is_repeated(&self, pool: &DefPool) -> bool {
        self.label(pool) == Label::Repeated
    }

    pub fn field_type(&self, pool: &DefPool) -> FieldType {
        pool.def(self.0).as_field().ty
    }

    pub fn encoding(&self, pool: &DefPool) -> IntEncoding {
        pool.def(self.0).as_field().encoding
    }

    pub fn is_lazy(&self, pool: &DefPool) -> bool {
        pool.def(self.0).as_field().lazy
    }

    pub fn is_packed(&self, pool: &DefPool) -> bool {
        pool.def(self.0).as_field().packed
    }

    pub fn is_extension(&self, pool: &DefPool) -> bool {
        pool.def(self.0).as_field().extension
    }

    pub fn is_tag_delimited(&self, pool: &DefPool) -> bool {
        pool.def(self.0).as_field().tag_delimited
    }

    pub fn default(&self, pool: &DefPool) -> DefaultValue {
        pool.def(self.0).as_field().default.clone()
    }

    pub fn containing_oneof(&self, pool: &DefPool) -> Option<OneofDef> {
        pool.def(self.0).as_field().containing_oneof.map(OneofDef)
    }

    pub fn containing_message(&self, pool: &DefPool) -> MsgDef {
        MsgDef(pool.def(self.0).as_field().containing_msg)
    }

    pub fn kind(&self, pool: &DefPool) -> FieldKind {
        let f = pool.def(self.0).as_field();
        FieldKind::of(f.ty, f.lazy)
    }

    /// The message subdef, once resolved and frozen. Panics if this
    /// field is not a message field or resolution has not happened.
    pub fn message_subdef(&self, pool: &DefPool) -> MsgDef {
        match &pool.def(self.0).as_field().subdef {
            SubdefRef::Resolved(id) => MsgDef(*id),
            _ => panic!("message subdef not resolved; freeze the pool first"),
        }
    }

    /// The enum subdef, once resolved and frozen.
    pub fn enum_subdef(&self, pool: &DefPool) -> EnumDef {
        match &pool.def(self.0).as_field().subdef {
            SubdefRef::Resolved(id) => EnumDef(*id),
            _ => panic!("enum subdef not resolved; freeze the pool first"),
        }
    }

    /// Dense index within the containing message, assigned at freeze.
    pub fn index_in_message(&self, pool: &DefPool) -> u32 {
        pool.def(self.0).as_field().index_in_msg
    }

    /// Base selector for this field, assigned at freeze (spec §4.2).
    pub fn selector_base(&self, pool: &DefPool) -> u32 {
        pool.def(self.0).as_field().selector_base
    }

    pub fn end_submsg_selector(&self, pool: &DefPool) -> u32 {
        pool.def(self.0).as_field().end_submsg_selector
    }
}
