//! The decoder's opcode set (spec §4.4).
//!
//! The source packs each instruction into a 32-bit word (8-bit opcode,
//! plus a selector or a signed branch offset in the remaining bits)
//! because it doubles as a JIT's intermediate representation (spec §9
//! "Bytecode vs direct calls"). This port has no JIT, so instructions
//! are a plain Rust enum instead of packed bitfields — same opcode
//! vocabulary minus two purely-performance facilities the design notes
//! (spec §9) explicitly say an implementation may drop without
//! affecting the testable properties of §8:
//!
//! - `TAG1`/`TAG2`/`TAGN` (inline tag comparison ahead of `DISPATCH`)
//!   are folded into `DISPATCH` itself: the VM always decodes the tag
//!   at runtime and consults the method's dispatch table, at a
//!   constant-factor cost relative to the source's inline fast path.
//! - `ENDSEQ` has no compiled jump target of its own: a repeated
//!   field's elements can appear anywhere in the message (not
//!   necessarily contiguously), so the compiler cannot know in advance
//!   where the *last* element will be. `STARTSEQ` stays a real
//!   instruction, fired idempotently at a field's entry point; closing
//!   is driven by frame state at `ENDMSG` time instead (see `vm.rs`).

use crate::wire::WireType;
use upb_def::{FieldType, IntEncoding};

/// One of the thirteen wire-to-logical scalar parse operations (spec
/// §4.4 "Type-parsing ops").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveOp {
    Double,
    Float,
    Int64,
    UInt64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    UInt32,
    SFixed32,
    SFixed64,
    SInt32,
    SInt64,
}

impl PrimitiveOp {
    pub fn of(ty: FieldType, encoding: IntEncoding) -> PrimitiveOp {
        match (ty, encoding) {
            (FieldType::Double, _) => PrimitiveOp::Double,
            (FieldType::Float, _) => PrimitiveOp::Float,
            (FieldType::Bool, _) => PrimitiveOp::Bool,
            (FieldType::Enum, _) => PrimitiveOp::Int32,
            (FieldType::Int64, IntEncoding::Fixed) => PrimitiveOp::SFixed64,
            (FieldType::Int64, IntEncoding::Zigzag) => PrimitiveOp::SInt64,
            (FieldType::Int64, IntEncoding::Variable) => PrimitiveOp::Int64,
            (FieldType::UInt64, IntEncoding::Fixed) => PrimitiveOp::Fixed64,
            (FieldType::UInt64, _) => PrimitiveOp::UInt64,
            (FieldType::Int32, IntEncoding::Fixed) => PrimitiveOp::SFixed32,
            (FieldType::Int32, IntEncoding::Zigzag) => PrimitiveOp::SInt32,
            (FieldType::Int32, IntEncoding::Variable) => PrimitiveOp::Int32,
            (FieldType::UInt32, IntEncoding::Fixed) => PrimitiveOp::Fixed32,
            (FieldType::UInt32, _) => PrimitiveOp::UInt32,
            (FieldType::String, _) | (FieldType::Bytes, _) | (FieldType::Message, _) => {
                unreachable!("string/bytes/message fields do not use PrimitiveOp")
            }
        }
    }

    /// The wire type this op reads for its primary (unpacked) form.
    pub fn wire_type(self) -> WireType {
        match self {
            PrimitiveOp::Double | PrimitiveOp::Fixed64 | PrimitiveOp::SFixed64 => WireType::Fixed64,
            PrimitiveOp::Float | PrimitiveOp::Fixed32 | PrimitiveOp::SFixed32 => WireType::Fixed32,
            PrimitiveOp::Int64
            | PrimitiveOp::UInt64
            | PrimitiveOp::Int32
            | PrimitiveOp::Bool
            | PrimitiveOp::UInt32
            | PrimitiveOp::SInt32
            | PrimitiveOp::SInt64 => WireType::Varint,
        }
    }

    /// Fixed-size on-wire width for fixed32/fixed64 ops, `None` for
    /// varint-encoded ops (width is data-dependent).
    pub fn fixed_width(self) -> Option<usize> {
        match self.wire_type() {
            WireType::Fixed32 => Some(4),
            WireType::Fixed64 => Some(8),
            _ => None,
        }
    }
}

/// A jump target: an index into a [`crate::method::Group`]'s flat
/// instruction vector, resolved by the time compilation finishes
/// (spec §4.4 "Compiler (two-pass)").
pub type Pc = usize;

#[derive(Debug, Clone, Copy)]
pub enum Instr {
    ParsePrimitive(PrimitiveOp, u32),
    StartMsg,
    EndMsg,
    StartSubMsg(u32),
    EndSubMsg(u32),
    /// Fired at a repeated field's entry point; idempotent per message
    /// (the VM only invokes the user handler the first time). Carries
    /// both the STARTSEQ selector and its paired ENDSEQ selector, since
    /// the VM needs the latter later regardless of which instruction
    /// triggers closing (spec §4.4 "Framing ops").
    StartSeq(u32, u32),
    StartStr(u32),
    StringChunk(u32),
    EndStr(u32),
    /// `groupnum == 0` means "length-delimited", matching spec §4.4's
    /// "`PUSHTAGDELIM groupnum` (or 0)".
    PushTagDelim(u32),
    PushLenDelim,
    Pop,
    SetDelim,
    SetBigGroupNum(u32),
    Call(Pc),
    Ret,
    Branch(Pc),
    /// Jumps to `target` (conventionally the method's `ENDMSG` label)
    /// once the current frame's delimited end has been reached.
    CheckDelim(Pc),
    Dispatch,
    Halt,
}
