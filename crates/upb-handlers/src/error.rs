use thiserror::Error;

/// Failures building or freezing a [`crate::Handlers`] set (spec §4.3).
#[derive(Debug, Error)]
pub enum HandlersError {
    #[error("field {0:?} is not a submessage field; set_subhandlers requires one")]
    NotASubmessageField(String),
    #[error("subhandlers for field {0:?} reference a different message def than the field's subdef")]
    SubhandlersMessageMismatch(String),
    #[error("subhandlers for field {0:?} were already set")]
    SubhandlersAlreadySet(String),
    #[error("handler for selector {selector} on field {field:?} expects closure type incompatible with its enclosing frame")]
    ClosureTypeMismatch { field: String, selector: u32 },
}
