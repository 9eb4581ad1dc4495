//! Selector assignment — the "only interesting ordering work" in
//! freezing a message (spec §4.2).
//!
//! Fields are sorted so submessage fields (lazy or not) occupy a
//! reserved low range sized `submsg_field_count`, immediately after
//! the two static STARTMSG/ENDMSG selectors; within that reserved
//! range (and within the remaining fields) order is ascending field
//! number. A field's dense index is simply its position in this
//! sorted order, which is why a submessage field's dense index can
//! double as both its STARTSUBMSG selector (minus the static count)
//! and its subhandlers-array index.

use upb_rc::NodeId;

use crate::field::FieldKind;
use crate::msg::STATIC_SELECTOR_COUNT;
use crate::pool::DefPool;
use crate::types::Label;

pub(crate) fn assign_selectors(pool: &mut DefPool, msg: NodeId) {
    let field_ids: Vec<NodeId> =
        pool.def(msg).as_msg().fields_by_number.values().copied().collect();

    let mut entries: Vec<(NodeId, bool, u32)> = field_ids
        .iter()
        .map(|&fid| {
            let f = pool.def(fid).as_field();
            let is_sub = FieldKind::of(f.ty, f.lazy).is_submessage_like();
            (fid, is_sub, f.number)
        })
        .collect();
    // Submessage fields first (false sorts before true, so negate),
    // then ascending field number within each class.
    entries.sort_by_key(|&(_, is_sub, number)| (!is_sub, number));

    let submsg_count = entries.iter().filter(|&&(_, is_sub, _)| is_sub).count() as u32;
    let mut cursor = STATIC_SELECTOR_COUNT + submsg_count;

    for (dense_index, &(fid, is_sub, _)) in entries.iter().enumerate() {
        let (kind, repeated) = {
            let f = pool.def(fid).as_field();
            (FieldKind::of(f.ty, f.lazy), f.label == Label::Repeated)
        };
        let selector_base = cursor;
        let total = kind.base_selector_count() + if repeated { 2 } else { 0 };
        cursor += total;

        let fm = pool.def_mut(fid).as_field_mut();
        fm.index_in_msg = dense_index as u32;
        fm.selector_base = selector_base;
        fm.end_submsg_selector = if is_sub { selector_base } else { 0 };
    }

    let msg_data = pool.def_mut(msg).as_msg_mut();
    msg_data.submsg_field_count = submsg_count;
    msg_data.selector_count = cursor;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldBuilder;
    use crate::types::FieldType;

    #[test]
    fn submessage_fields_get_low_range_and_cursor_grows() {
        let mut pool = DefPool::new();
        let inner = pool.new_msg(".p.Inner").unwrap();
        let outer = pool.new_msg(".p.Outer").unwrap();
        pool.new_field(
            outer,
            FieldBuilder::new("scalar", 1, Label::Optional, FieldType::Int32),
        )
        .unwrap();
        let sub_field = pool
            .new_field(outer, FieldBuilder::new("sub", 2, Label::Optional, FieldType::Message))
            .unwrap();
        pool.field_set_message_subdef(sub_field, inner).unwrap();

        pool.freeze(&[outer.into(), inner.into()], 64).unwrap();

        assert_eq!(outer.submsg_field_count(&pool), 1);
        // STARTSUBMSG selector = STATIC_SELECTOR_COUNT + dense_index(0) = 2
        assert_eq!(sub_field.index_in_message(&pool), 0);
        assert_eq!(STATIC_SELECTOR_COUNT + sub_field.index_in_message(&pool), 2);
        assert!(outer.selector_count(&pool) > STATIC_SELECTOR_COUNT + 1);
    }
}
