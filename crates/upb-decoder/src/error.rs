use thiserror::Error;

/// A truncated, fixed-capacity status message (spec §7: "a fixed
/// 128-byte message (truncated with trailing `…`)").
pub const STATUS_MESSAGE_CAP: usize = 128;

/// Build/parse-time diagnostic payload, modeled as a safe value type
/// rather than the source's raw fixed-size `char[128]` buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    message: String,
    space: &'static str,
    code: i32,
}

impl Status {
    pub fn new(space: &'static str, code: i32, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > STATUS_MESSAGE_CAP {
            message.truncate(STATUS_MESSAGE_CAP.saturating_sub(1));
            message.push('…');
        }
        Status { message, space, code }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn space(&self) -> &'static str {
        self.space
    }

    pub fn code(&self) -> i32 {
        self.code
    }
}

/// Failures surfaced while compiling or running the decoder (spec §7:
/// WireFormatError, DepthExceeded, plus handler-raised cancellation).
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("definition graph: {0}")]
    Def(#[from] upb_def::DefError),
    #[error("handlers: {0}")]
    Handlers(#[from] upb_handlers::HandlersError),

    #[error("invalid wire type {0}")]
    InvalidWireType(u8),
    #[error("field number 0 is not valid on the wire")]
    FieldNumberZero,
    #[error("varint exceeds the 10-byte wire-format limit")]
    VarintTooLong,
    #[error("32-bit varint field overflows uint32 range")]
    VarintOverflow32,
    #[error("submessage length extends past its enclosing message's end")]
    SubmessageOverrun,
    #[error("unmatched END_GROUP tag for field {0}")]
    UnmatchedEndGroup(u32),
    #[error("nesting depth exceeded the configured maximum of {0}")]
    DepthExceeded(usize),
    #[error("end() called with non-empty residual, a pending skip, or an open delimited region")]
    UnexpectedEof,
    #[error("handler for selector {selector} returned failure: {status:?}")]
    HandlerFailed { selector: u32, status: Option<Status> },
    #[error("handler requested abort (UPB_BREAK)")]
    HandlerBreak,
}

pub type DecodeResult<T> = Result<T, DecodeError>;
