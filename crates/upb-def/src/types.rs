//! Scalar type vocabulary shared by fields, defaults and the wire codec.

/// A field's logical type (spec §3: "one of double, float, int32/64,
/// uint32/64, bool, string, bytes, message, enum").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Double,
    Float,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Bool,
    String,
    Bytes,
    Message,
    Enum,
}

impl FieldType {
    /// True for `Message`: the only type carrying a `MsgDef` subdef.
    pub fn is_message(self) -> bool {
        matches!(self, FieldType::Message)
    }

    /// True for `Enum`: the only type carrying an `EnumDef` subdef.
    pub fn is_enum(self) -> bool {
        matches!(self, FieldType::Enum)
    }

    /// True for the two length-delimited-by-default byte-string types.
    pub fn is_string_like(self) -> bool {
        matches!(self, FieldType::String | FieldType::Bytes)
    }
}

/// Wire cardinality label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

/// Descriptor-level integer encoding hint (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntEncoding {
    Variable,
    Fixed,
    Zigzag,
}

/// A field or enum default value (spec §3: "numerically typed, or a
/// string, or an enum symbol+number").
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    None,
    Double(f64),
    Float(f32),
    Int64(i64),
    UInt64(u64),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    /// An enum default, lifted from symbolic (`name`) to numeric form
    /// during freeze (spec §4.2).
    Enum { name: String, number: Option<i32> },
}
