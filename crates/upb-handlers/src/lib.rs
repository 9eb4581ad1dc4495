mod closure;
mod error;
mod handler_fn;
mod handlers;

pub use closure::{Closure, ClosureType};
pub use error::HandlersError;
pub use handler_fn::{DecodeStatus, HandlerAttr, HandlerFn};
pub use handlers::{Handlers, SEL_ENDMSG, SEL_STARTMSG};
