//! Facade crate: re-exports the public surface of the refcount arena,
//! definition graph, handlers table and decoder so a caller depends on
//! one crate instead of four.

pub use upb_decoder::{
    compile, make_tag, narrow_varint_to_32, read_fixed32, read_fixed64, read_varint, split_tag, zigzag_decode_32,
    zigzag_decode_64, zigzag_encode_32, zigzag_encode_64, DecodeError, DecodeResult, Decoder, DecoderMethod,
    DispatchEntry, Group, Instr, ParseArena, Pc, PrimitiveOp, Status, VarintRead, WireType, DEFAULT_MAX_DEPTH,
    MAX_VARINT_BYTES, RESIDUAL_CAP, STATUS_MESSAGE_CAP,
};

pub use upb_def::{
    DefError, DefId, DefPool, DefaultValue, EnumDef, FieldBuilder, FieldDef, FieldKind, FieldType, IntEncoding,
    Label, MsgDef, OneofDef, STATIC_SELECTOR_COUNT,
};

pub use upb_handlers::{
    Closure, ClosureType, DecodeStatus, HandlerAttr, HandlerFn, Handlers, HandlersError, SEL_ENDMSG, SEL_STARTMSG,
};

pub use upb_rc::{Arena, FreezeStats, GroupId, NodeId, Owner, RcError};
