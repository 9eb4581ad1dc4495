//! Two-pass bytecode compiler and resumable VM for the protobuf wire
//! format (Component D): turns a frozen [`upb_handlers::Handlers`] tree
//! into a [`method::Group`] of [`method::DecoderMethod`]s, then
//! interprets that bytecode against a byte stream one call at a time.

mod arena;
mod compiler;
mod error;
mod instr;
mod method;
mod vm;
mod wire;

pub use arena::ParseArena;
pub use compiler::compile;
pub use error::{DecodeError, DecodeResult, Status, STATUS_MESSAGE_CAP};
pub use instr::{Instr, Pc, PrimitiveOp};
pub use method::{DecoderMethod, DispatchEntry, Group};
pub use vm::{Decoder, DEFAULT_MAX_DEPTH, RESIDUAL_CAP};
pub use wire::{
    make_tag, narrow_varint_to_32, read_fixed32, read_fixed64, read_varint, split_tag, zigzag_decode_32,
    zigzag_decode_64, zigzag_encode_32, zigzag_encode_64, VarintRead, WireType, MAX_VARINT_BYTES,
};
