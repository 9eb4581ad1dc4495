//! Hand-built schema/handlers pairs for the scenarios in spec §8.
//! Each function freezes a tiny `DefPool`, wires handlers from
//! [`crate::trace`] and compiles the result, mirroring the
//! `build_scalar_message` helper `upb-decoder`'s own unit tests use
//! internally but exposed here for scenario and property tests that
//! live outside that crate.

use std::sync::Arc;

use upb::{compile, DefPool, FieldBuilder, FieldType, Group, HandlerAttr, HandlerFn, Handlers, Label};

use crate::trace;

/// One `int32 a = 1;` field (spec §8 S1).
pub fn scalar_int32() -> (Arc<Group>, Arc<Handlers>) {
    let mut pool = DefPool::new();
    let msg = pool.new_msg(".harness.Scalar").unwrap();
    pool.new_field(msg, FieldBuilder::new("a", 1, Label::Optional, FieldType::Int32)).unwrap();
    pool.freeze(&[msg.into()], 64).unwrap();

    let field = msg.field_by_number(&pool, 1).unwrap();
    let mut h = Handlers::new(msg, &pool);
    h.set_start_msg(trace::start_msg, HandlerAttr::new());
    h.set_end_msg(trace::end_msg, HandlerAttr::new());
    h.set_value_handler(field, &pool, HandlerFn::Int32(trace::record_a), HandlerAttr::new());
    let handlers = h.freeze(&pool).unwrap();

    (Arc::new(compile(&pool, &handlers)), handlers)
}

/// One `string s = 2;` field (spec §8 S2).
pub fn string_field() -> (Arc<Group>, Arc<Handlers>) {
    let mut pool = DefPool::new();
    let msg = pool.new_msg(".harness.Stringy").unwrap();
    pool.new_field(msg, FieldBuilder::new("s", 2, Label::Optional, FieldType::String)).unwrap();
    pool.freeze(&[msg.into()], 64).unwrap();

    let field = msg.field_by_number(&pool, 2).unwrap();
    let mut h = Handlers::new(msg, &pool);
    h.set_start_msg(trace::start_msg, HandlerAttr::new());
    h.set_end_msg(trace::end_msg, HandlerAttr::new());
    h.set_start_str(field, &pool, trace::start_str_s, HandlerAttr::new());
    h.set_string_chunk(field, &pool, trace::string_chunk_s, HandlerAttr::new());
    h.set_end_str(field, &pool, trace::end_str_s, HandlerAttr::new());
    let handlers = h.freeze(&pool).unwrap();

    (Arc::new(compile(&pool, &handlers)), handlers)
}

/// `Inner { int32 x = 1; } Inner m = 3;` (spec §8 S3).
pub fn nested_submessage() -> (Arc<Group>, Arc<Handlers>) {
    let mut pool = DefPool::new();
    let inner = pool.new_msg(".harness.Inner").unwrap();
    pool.new_field(inner, FieldBuilder::new("x", 1, Label::Optional, FieldType::Int32)).unwrap();
    let outer = pool.new_msg(".harness.Outer").unwrap();
    let m = pool.new_field(outer, FieldBuilder::new("m", 3, Label::Optional, FieldType::Message)).unwrap();
    pool.field_set_message_subdef(m, inner).unwrap();
    pool.freeze(&[outer.into(), inner.into()], 64).unwrap();

    let x = inner.field_by_number(&pool, 1).unwrap();
    let mut inner_h = Handlers::new(inner, &pool);
    inner_h.set_start_msg(trace::start_msg, HandlerAttr::new());
    inner_h.set_end_msg(trace::end_msg, HandlerAttr::new());
    inner_h.set_value_handler(x, &pool, HandlerFn::Int32(trace::record_x), HandlerAttr::new());
    let inner_handlers = inner_h.freeze(&pool).unwrap();

    let mut outer_h = Handlers::new(outer, &pool);
    outer_h.set_start_msg(trace::start_msg, HandlerAttr::new());
    outer_h.set_end_msg(trace::end_msg, HandlerAttr::new());
    outer_h.set_start_submsg(m, &pool, trace::start_submsg_m, HandlerAttr::new()).unwrap();
    outer_h.set_end_submsg(m, &pool, trace::end_submsg_m, HandlerAttr::new()).unwrap();
    outer_h.set_subhandlers(m, &pool, inner_handlers).unwrap();
    let outer_handlers = outer_h.freeze(&pool).unwrap();

    (Arc::new(compile(&pool, &outer_handlers)), outer_handlers)
}

/// `repeated int32 r = 4;`, exercised by both the packed (S4) and
/// non-packed (S5) wire forms against the same compiled dispatch
/// table.
pub fn repeated_int32() -> (Arc<Group>, Arc<Handlers>) {
    let mut pool = DefPool::new();
    let msg = pool.new_msg(".harness.Repeated").unwrap();
    pool.new_field(msg, FieldBuilder::new("r", 4, Label::Repeated, FieldType::Int32).packed(true)).unwrap();
    pool.freeze(&[msg.into()], 64).unwrap();

    let field = msg.field_by_number(&pool, 4).unwrap();
    let mut h = Handlers::new(msg, &pool);
    h.set_start_msg(trace::start_msg, HandlerAttr::new());
    h.set_end_msg(trace::end_msg, HandlerAttr::new());
    h.set_value_handler(field, &pool, HandlerFn::Int32(trace::record_r), HandlerAttr::new());
    h.set_start_seq(field, &pool, trace::start_seq_r, HandlerAttr::new()).unwrap();
    h.set_end_seq(field, &pool, trace::end_seq_r, HandlerAttr::new()).unwrap();
    let handlers = h.freeze(&pool).unwrap();

    (Arc::new(compile(&pool, &handlers)), handlers)
}
