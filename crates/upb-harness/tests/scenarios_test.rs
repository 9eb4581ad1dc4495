//! The concrete end-to-end scenarios from spec §8: literal wire bytes
//! against a tiny schema, checked against the abbreviated event trace.

#[test]
fn s1_single_scalar_field() {
    let (group, handlers) = upb_harness::schemas::scalar_int32();
    let trace = upb_harness::decode_to_trace(group, &handlers, &[0x08, 0x96, 0x01], 0).unwrap();
    assert_eq!(trace, vec!["STARTMSG", "INT32(a)=150", "ENDMSG"]);
}

#[test]
fn s2_length_delimited_string() {
    let (group, handlers) = upb_harness::schemas::string_field();
    let input = [0x12, 0x03, b'a', b'b', b'c'];
    let trace = upb_harness::decode_to_trace(group, &handlers, &input, 0).unwrap();
    assert_eq!(trace, vec!["STARTMSG", "STARTSTR(s)", "STRING(s,\"abc\")", "ENDSTR(s)", "ENDMSG"]);
}

#[test]
fn s3_nested_submessage() {
    let (group, handlers) = upb_harness::schemas::nested_submessage();
    let input = [0x1A, 0x02, 0x08, 0x2A];
    let trace = upb_harness::decode_to_trace(group, &handlers, &input, 0).unwrap();
    assert_eq!(
        trace,
        vec!["STARTMSG", "STARTSUBMSG(m)", "STARTMSG", "INT32(x)=42", "ENDMSG", "ENDSUBMSG(m)", "ENDMSG"]
    );
}

/// Spec §8 S4/S5: packed and non-packed wire forms of the same
/// repeated field decode to the same trace, since the dispatch table
/// routes both forms to the value loop.
#[test]
fn s4_packed_repeated_and_s5_non_packed_agree() {
    let packed = [0x22, 0x03, 0x01, 0x02, 0x03];
    let non_packed = [0x20, 0x01, 0x20, 0x02, 0x20, 0x03];

    let (group, handlers) = upb_harness::schemas::repeated_int32();
    let packed_trace = upb_harness::decode_to_trace(group, &handlers, &packed, 0).unwrap();

    let (group, handlers) = upb_harness::schemas::repeated_int32();
    let non_packed_trace = upb_harness::decode_to_trace(group, &handlers, &non_packed, 0).unwrap();

    let expected =
        vec!["STARTMSG", "STARTSEQ(r)", "INT32=1", "INT32=2", "INT32=3", "ENDSEQ(r)", "ENDMSG"];
    assert_eq!(packed_trace, expected);
    assert_eq!(non_packed_trace, expected);
}

#[test]
fn s6_unknown_group_is_skipped_without_events() {
    // start-group field 4, varint field 5 = 7, end-group field 4, against
    // a schema with no field 4 (`scalar_int32` only declares field 1).
    let (group, handlers) = upb_harness::schemas::scalar_int32();
    let input = [0x23, 0x28, 0x07, 0x24];
    let trace = upb_harness::decode_to_trace(group, &handlers, &input, 0).unwrap();
    assert_eq!(trace, vec!["STARTMSG", "ENDMSG"]);
}

#[test]
fn builtin_fixture_set_matches_scenario_behavior() {
    let set = upb_harness::fixtures::builtin_scenarios();
    for case in &set.cases {
        let (group, handlers) = upb_harness::schema_by_name(&case.schema);
        let trace = upb_harness::decode_to_trace(group, &handlers, &case.input_bytes(), 0).unwrap();
        assert_eq!(trace, case.expected_trace, "scenario {} mismatched", case.name);
    }
}
