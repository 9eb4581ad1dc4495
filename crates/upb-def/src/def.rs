use std::collections::{BTreeMap, HashMap};

use crate::types::{DefaultValue, FieldType, IntEncoding, Label};
use upb_rc::NodeId;

/// Either a resolved pointer to a subdef or a symbolic `.pkg.Name`
/// pending resolution (spec §3 FieldDef: "(a) a direct pointer to its
/// subdef ... or (b) a symbolic name reference pending resolution").
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SubdefRef {
    None,
    Symbolic(String),
    Resolved(NodeId),
}

#[derive(Debug, Clone)]
pub(crate) struct MsgData {
    pub full_name: String,
    pub fields_by_number: BTreeMap<u32, NodeId>,
    pub fields_by_name: HashMap<String, NodeId>,
    pub oneofs_by_name: HashMap<String, NodeId>,
    pub map_entry: bool,
    /// Set once frozen (spec §3 MsgDef).
    pub selector_count: u32,
    pub submsg_field_count: u32,
}

impl MsgData {
    pub fn new(full_name: String) -> Self {
        MsgData {
            full_name,
            fields_by_number: BTreeMap::new(),
            fields_by_name: HashMap::new(),
            oneofs_by_name: HashMap::new(),
            map_entry: false,
            selector_count: 0,
            submsg_field_count: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FieldData {
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
    pub subdef: SubdefRef,
    pub containing_msg: NodeId,
    pub containing_oneof: Option<NodeId>,
    /// Set once frozen (spec §3: "dense index" and "selector base").
    pub index_in_msg: u32,
    pub selector_base: u32,
    pub end_submsg_selector: u32,
}

#[derive(Debug, Clone)]
pub(crate) struct EnumData {
    pub full_name: String,
    pub name_to_number: HashMap<String, i32>,
    /// First-registered name per number; numbers may alias (spec §3).
    pub number_to_name: BTreeMap<i32, String>,
    pub default_number: i32,
}

impl EnumData {
    pub fn new(full_name: String) -> Self {
        EnumData {
            full_name,
            name_to_number: HashMap::new(),
            number_to_name: BTreeMap::new(),
            default_number: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OneofData {
    pub name: String,
    pub containing_msg: NodeId,
    pub fields_by_number: BTreeMap<u32, NodeId>,
    pub fields_by_name: HashMap<String, NodeId>,
}

impl OneofData {
    pub fn new(name: String, containing_msg: NodeId) -> Self {
        OneofData {
            name,
            containing_msg,
            fields_by_number: BTreeMap::new(),
            fields_by_name: HashMap::new(),
        }
    }
}

/// The payload stored in the shared [`upb_rc::Arena`]. One arena holds
/// every def kind so that cycles crossing kinds (message -> field ->
/// message submessage type) share refcount groups, per spec §3.
#[derive(Debug, Clone)]
pub(crate) enum Def {
    Msg(MsgData),
    Field(FieldData),
    Enum(EnumData),
    Oneof(OneofData),
}

impl Def {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Def::Msg(_) => "message",
            Def::Field(_) => "field",
            Def::Enum(_) => "enum",
            Def::Oneof(_) => "oneof",
        }
    }

    pub fn as_msg(&self) -> &MsgData {
        match self {
            Def::Msg(m) => m,
            _ => panic!("expected a MsgDef node"),
        }
    }

    pub fn as_msg_mut(&mut self) -> &mut MsgData {
        match self {
            Def::Msg(m) => m,
            _ => panic!("expected a MsgDef node"),
        }
    }

    pub fn as_field(&self) -> &FieldData {
        match self {
            Def::Field(f) => f,
            _ => panic!("expected a FieldDef node"),
        }
    }

    pub fn as_field_mut(&mut self) -> &mut FieldData {
        match self {
            Def::Field(f) => f,
            _ => panic!("expected a FieldDef node"),
        }
    }

    pub fn as_enum(&self) -> &EnumData {
        match self {
            Def::Enum(e) => e,
            _ => panic!("expected an EnumDef node"),
        }
    }

    pub fn as_enum_mut(&mut self) -> &mut EnumData {
        match self {
            Def::Enum(e) => e,
            _ => panic!("expected an EnumDef node"),
        }
    }

    pub fn as_oneof(&self) -> &OneofData {
        match self {
            Def::Oneof(o) => o,
            _ => panic!("expected a OneofDef node"),
        }
    }

    pub fn as_oneof_mut(&mut self) -> &mut OneofData {
        match self {
            Def::Oneof(o) => o,
            _ => panic!("expected a OneofDef node"),
        }
    }

    pub fn full_name(&self) -> &str {
        match self {
            Def::Msg(m) => &m.full_name,
            Def::Field(f) => &f.name,
            Def::Enum(e) => &e.full_name,
            Def::Oneof(o) => &o.name,
        }
    }
}
