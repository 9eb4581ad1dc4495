//! Definition graph: messages, fields, enums and oneofs (Component B).
//!
//! A [`DefPool`] owns a single shared [`upb_rc::Arena`] of [`def::Def`]
//! nodes so cross-kind edges (message -> field -> submessage) share
//! refcount groups the way plain message-to-message cycles do. Defs are
//! built mutably (`new_msg`, `new_field`, ...), then transitioned to an
//! immutable, shareable form by [`DefPool::freeze`], which also runs
//! structural validation, symbolic subdef resolution and selector
//! assignment (spec §3, §4.2).

mod def;
mod enum_def;
mod error;
mod field;
mod msg;
mod oneof;
mod pool;
mod selector;
mod types;

pub use enum_def::EnumDef;
pub use error::DefError;
pub use field::{FieldBuilder, FieldDef, FieldKind};
pub use msg::{MsgDef, STATIC_SELECTOR_COUNT};
pub use oneof::OneofDef;
pub use pool::{DefId, DefPool};
pub use types::{DefaultValue, FieldType, IntEncoding, Label};
