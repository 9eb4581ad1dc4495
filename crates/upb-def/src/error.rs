use thiserror::Error;

/// Failures surfaced while building or freezing the definition graph
/// (spec §7: ValidationFailure plus the DepthExceeded/AllocFailure the
/// refcount core can report).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DefError {
    #[error("refcount core: {0}")]
    Rc(#[from] upb_rc::RcError),

    #[error("field name {0:?} is empty or not identifier-shaped")]
    InvalidFieldName(String),
    #[error("field number {0} is out of range [1, 2^29-1]")]
    InvalidFieldNumber(u32),
    #[error("field number 0 is reserved for sentinels")]
    ReservedFieldNumberZero,
    #[error("duplicate field number {number} in message {msg:?}")]
    DuplicateFieldNumber { msg: String, number: u32 },
    #[error("duplicate field name {name:?} in message {msg:?}")]
    DuplicateFieldName { msg: String, name: String },
    #[error("duplicate message or enum name {0:?}")]
    DuplicateTypeName(String),

    #[error("field {0:?} is lazy but is not a non-repeated, length-delimited message field")]
    LazyRequiresSubmessage(String),
    #[error("field {0:?} references an unresolved or absent subdef")]
    UnresolvedSubdef(String),
    #[error("field {field:?} subdef type mismatch: expected {expected}, got {actual}")]
    SubdefTypeMismatch { field: String, expected: &'static str, actual: &'static str },
    #[error("symbolic subdef name {0:?} is relative; only absolute `.pkg.Name` references are supported")]
    RelativeNameUnsupported(String),
    #[error("symbol {0:?} not found while resolving a subdef reference")]
    SymbolNotFound(String),

    #[error("enum {0:?} has no values; enums must define at least one member")]
    EmptyEnum(String),
    #[error("enum {enum_name:?} has no value named {value_name:?}")]
    EnumValueNotFound { enum_name: String, value_name: String },

    #[error("message {0:?} is a map entry and must have exactly fields `key = 1` and `value = 2`")]
    MalformedMapEntry(String),
    #[error("field {0:?} references a map-entry submessage but is not `repeated`")]
    MapEntryFieldNotRepeated(String),

    #[error("message or enum name {0:?} is not a valid fully-qualified `.pkg.Name`")]
    InvalidTypeName(String),
}
