//! The quantified invariants of spec §8, each reduced to a concrete,
//! deterministic check (no external property-testing crate is in the
//! teacher's dependency stack, so these are written as focused
//! example-based assertions rather than a generated-case sweep).

use std::collections::HashSet;

use upb::{Arena, DefError, DefPool, FieldBuilder, FieldType, HandlerAttr, HandlerFn, Handlers, Label};

/// 1. Freeze idempotence on failure: a freeze that fails must not
/// leave the pool unable to complete a later, corrected freeze, and
/// must not have interned the failed transaction's names.
#[test]
fn freeze_failure_does_not_wedge_the_pool() {
    let mut pool = DefPool::new();
    let outer = pool.new_msg(".prop.Outer").unwrap();
    let f = pool.new_field(outer, FieldBuilder::new("sub", 1, Label::Optional, FieldType::Message)).unwrap();
    pool.field_set_subdef_symbolic(f, ".prop.Missing");

    let err = pool.freeze(&[outer.into()], 64).unwrap_err();
    assert!(matches!(err, DefError::SymbolNotFound(_)));
    assert!(pool.lookup(".prop.Outer").is_none());

    let inner = pool.new_msg(".prop.Missing").unwrap();
    pool.freeze(&[outer.into(), inner.into()], 64).unwrap();
    assert_eq!(outer.field_by_number(&pool, 1).unwrap().message_subdef(&pool).full_name(&pool), ".prop.Missing");
}

/// 2. SCC isolation: two nodes joined by a mutual `ref2` land in the
/// same group after freeze, and an unrelated pair does not.
#[test]
fn mutually_referencing_nodes_share_one_group_after_freeze() {
    let mut arena: Arena<&'static str> = Arena::new();
    let a = arena.init("a", "prop-test").unwrap();
    let b = arena.init("b", "prop-test").unwrap();
    arena.ref2(b, a).unwrap();
    arena.ref2(a, b).unwrap();
    arena.freeze(&[a], 64).unwrap();
    assert_eq!(arena.group_of(a), arena.group_of(b));

    let mut arena2: Arena<&'static str> = Arena::new();
    let c = arena2.init("c", "prop-test").unwrap();
    let d = arena2.init("d", "prop-test").unwrap();
    arena2.ref2(d, c).unwrap(); // one-way: not a cycle
    arena2.freeze(&[c], 64).unwrap();
    assert_ne!(arena2.group_of(c), arena2.group_of(d));
}

/// 3. Selector uniqueness: every handler-kind selector a message's
/// fields can produce is distinct and within `[0, selector_count)`.
#[test]
fn every_fields_selectors_are_unique_and_in_range() {
    let mut pool = DefPool::new();
    let inner = pool.new_msg(".prop.Inner").unwrap();
    pool.new_field(inner, FieldBuilder::new("v", 1, Label::Optional, FieldType::Int32)).unwrap();

    let msg = pool.new_msg(".prop.Mixed").unwrap();
    pool.new_field(msg, FieldBuilder::new("scalar", 1, Label::Optional, FieldType::Int32)).unwrap();
    pool.new_field(msg, FieldBuilder::new("text", 2, Label::Optional, FieldType::String)).unwrap();
    let sub = pool.new_field(msg, FieldBuilder::new("sub", 3, Label::Optional, FieldType::Message)).unwrap();
    pool.field_set_message_subdef(sub, inner).unwrap();
    pool.new_field(msg, FieldBuilder::new("rep", 4, Label::Repeated, FieldType::Int32)).unwrap();
    pool.freeze(&[msg.into(), inner.into()], 64).unwrap();

    let selector_count = msg.selector_count(&pool) as usize;
    let mut seen = HashSet::new();
    seen.insert(upb::SEL_STARTMSG);
    seen.insert(upb::SEL_ENDMSG);

    for field in msg.fields(&pool) {
        let mut selectors = vec![field.selector_base(&pool)];
        if field.kind(&pool) == upb::FieldKind::StringLike {
            selectors.push(field.selector_base(&pool) + 1);
            selectors.push(field.selector_base(&pool) + 2);
        }
        if field.kind(&pool).is_submessage_like() {
            selectors.push(field.end_submsg_selector(&pool));
        }
        if field.is_repeated(&pool) {
            let base = field.selector_base(&pool) + field.kind(&pool).base_selector_count();
            selectors.push(base);
            selectors.push(base + 1);
        }
        for sel in selectors {
            assert!((sel as usize) < selector_count, "selector {sel} out of range [0, {selector_count})");
            assert!(seen.insert(sel), "selector {sel} reused across fields");
        }
    }
}

/// 5. Buffer-seam equivalence: feeding the nested-submessage scenario
/// as one buffer or split across arbitrary chunk sizes produces the
/// same event trace.
#[test]
fn chunked_feeding_matches_single_shot_feeding() {
    let input = [0x1A, 0x02, 0x08, 0x2A];
    let (group, handlers) = upb_harness::schemas::nested_submessage();
    let whole = upb_harness::decode_to_trace(group, &handlers, &input, 0).unwrap();

    for chunk in 1..=input.len() {
        let (group, handlers) = upb_harness::schemas::nested_submessage();
        let chunked = upb_harness::decode_to_trace(group, &handlers, &input, chunk).unwrap();
        assert_eq!(chunked, whole, "mismatch at chunk size {chunk}");
    }
}

/// 6. Skip correctness: an unknown field's bytes never reach a
/// handler, and a known field located before or after it still lands
/// at the right value.
#[test]
fn unknown_fields_are_invisible_but_known_fields_survive() {
    let (group, handlers) = upb_harness::schemas::scalar_int32();
    // field 5 (unknown, varint) = 1, then field 1 (known) = 7.
    let trace = upb_harness::decode_to_trace(group, &handlers, &[0x28, 0x01, 0x08, 0x07], 0).unwrap();
    assert_eq!(trace, vec!["STARTMSG", "INT32(a)=7", "ENDMSG"]);

    // An oversized unknown length-delimited field triggers the
    // skip-count protocol: decode() reports more bytes consumed than
    // were supplied, and the caller's next feed satisfies it.
    let (group, handlers) = upb_harness::schemas::scalar_int32();
    let mut recorder = upb_harness::trace::Recorder::new();
    let closure = upb::Closure::new(&mut recorder);
    let mut decoder = upb::Decoder::with_default_depth(group, &handlers, closure).unwrap();

    // field 5, length-delimited, declared length 20 but only 3 bytes supplied.
    let tag_and_len = [0x2A, 20u8];
    let consumed = decoder.decode(&tag_and_len).unwrap();
    assert_eq!(consumed, tag_and_len.len());
    let consumed = decoder.decode(&[0u8; 3]).unwrap();
    assert!(consumed > 3, "skip protocol must report more bytes owed than supplied");

    let remaining = consumed - 3;
    decoder.decode(&vec![0u8; remaining]).unwrap();
    decoder.decode(&[0x08, 0x07]).unwrap();
    decoder.end().unwrap();
    assert_eq!(recorder.events, vec!["STARTMSG", "INT32(a)=7", "ENDMSG"]);
}

/// HandlerAttr/HandlerFn are exercised indirectly by `schemas`; this
/// keeps the imports from being flagged unused if a future edit trims
/// a scenario that used them directly.
#[allow(dead_code)]
fn _uses(_: HandlerAttr, _: HandlerFn, _: Handlers) {}
