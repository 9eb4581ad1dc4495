use std::sync::Arc;

use tracing::{debug, trace};
use upb_def::{DefPool, FieldDef, FieldKind, MsgDef, STATIC_SELECTOR_COUNT};

use crate::closure::Closure;
use crate::error::HandlersError;
use crate::handler_fn::{DecodeStatus, HandlerAttr, HandlerEntry, HandlerFn};

/// Static selectors shared by every message (spec §4.3).
pub const SEL_STARTMSG: u32 = 0;
pub const SEL_ENDMSG: u32 = 1;

/// Selector-indexed handler table bound to one frozen `MsgDef` (spec §3
/// "Handlers node"). Built mutably selector-by-selector, then
/// [`Handlers::freeze`] validates closure-type consistency, fills in
/// any missing subhandlers, and returns an immutable, shareable
/// `Arc<Handlers>` the way a `upb_def::DefPool` transitions its defs.
pub struct Handlers {
    msg: MsgDef,
    table: Vec<HandlerEntry>,
    subhandlers: Vec<Option<Arc<Handlers>>>,
    cleanup: Vec<Box<dyn FnOnce() + Send>>,
    diagnostics: Vec<String>,
    frozen: bool,
}

impl Handlers {
    /// Creates an empty handler table sized for `msg` (which must
    /// already be frozen: selector assignment only exists post-freeze).
    pub fn new(msg: MsgDef, pool: &DefPool) -> Self {
        let selector_count = (msg.selector_count(pool) as usize).max(STATIC_SELECTOR_COUNT as usize);
        let submsg_count = msg.submsg_field_count(pool) as usize;
        Handlers {
            msg,
            table: vec![HandlerEntry::default(); selector_count],
            subhandlers: vec![None; submsg_count],
            cleanup: Vec::new(),
            diagnostics: Vec::new(),
            frozen: false,
        }
    }

    pub fn message(&self) -> MsgDef {
        self.msg
    }

    /// The subhandlers wired for `field` (spec §4.3 "Subhandlers
    /// wiring"), if any. Always `Some` for a frozen table's
    /// [`FieldKind::SubMessage`] fields once any of their handlers was
    /// set (`freeze` auto-installs an empty one), `None` if the field
    /// was never touched.
    pub fn subhandlers_for(&self, field: FieldDef, pool: &DefPool) -> Option<Arc<Handlers>> {
        self.subhandlers.get(field.index_in_message(pool) as usize)?.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// The function wired at `selector`, if any (spec §4.4 "Dispatch
    /// table": the VM looks up a field's selector and invokes whatever
    /// is there). `None` for an out-of-range selector or one nothing
    /// was ever set on.
    pub fn func_at(&self, selector: u32) -> Option<HandlerFn> {
        self.table.get(selector as usize)?.func
    }

    /// The attributes wired at `selector` (spec §3: "attr ... an
    /// always-ok flag"). Always `Some` for an in-range selector, even
    /// if no handler function was set there.
    pub fn attr_at(&self, selector: u32) -> Option<&HandlerAttr> {
        self.table.get(selector as usize).map(|e| &e.attr)
    }

    /// Build-time diagnostics accumulated by fallible setters (spec §3:
    /// "an error status accumulator for build-time diagnostics"), in
    /// addition to the `Result` each setter already returns.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Registers a cleanup callback run (LIFO) when this table drops
    /// (spec §3 "a cleanup callback list", §4.3).
    pub fn add_cleanup(&mut self, f: impl FnOnce() + Send + 'static) {
        self.cleanup.push(Box::new(f));
    }

    fn set(&mut self, selector: u32, func: HandlerFn, attr: HandlerAttr) {
        assert!(!self.frozen, "cannot set a handler on a frozen Handlers");
        self.table[selector as usize] = HandlerEntry { func: Some(func), attr };
    }

    pub fn set_start_msg(&mut self, func: fn(Closure) -> Option<Closure>, attr: HandlerAttr) {
        self.set(SEL_STARTMSG, HandlerFn::StartMsg(func), attr);
    }

    pub fn set_end_msg(&mut self, func: fn(Closure, DecodeStatus) -> bool, attr: HandlerAttr) {
        self.set(SEL_ENDMSG, HandlerFn::EndMsg(func), attr);
    }

    /// Sets the scalar value handler for a non-repeated, non-string,
    /// non-submessage field (the field's single cursor-allocated
    /// selector).
    pub fn set_value_handler(&mut self, field: FieldDef, pool: &DefPool, func: HandlerFn, attr: HandlerAttr) {
        self.set(field.selector_base(pool), func, attr);
    }

    /// String-triple setters: also used for lazy submessage fields,
    /// which are delivered to the sink as an undecoded byte span
    /// rather than recursive START/ENDSUBMSG events (spec §4.2's
    /// `FieldKind::LazySubMessage`, "delivered as a string").
    pub fn set_start_str(&mut self, field: FieldDef, pool: &DefPool, func: fn(Closure, usize) -> Option<Closure>, attr: HandlerAttr) {
        self.set(field.selector_base(pool), HandlerFn::StartStr(func), attr);
    }

    pub fn set_string_chunk(&mut self, field: FieldDef, pool: &DefPool, func: fn(Closure, &[u8]) -> usize, attr: HandlerAttr) {
        self.set(field.selector_base(pool) + 1, HandlerFn::StringChunk(func), attr);
    }

    pub fn set_end_str(&mut self, field: FieldDef, pool: &DefPool, func: fn(Closure) -> bool, attr: HandlerAttr) {
        self.set(field.selector_base(pool) + 2, HandlerFn::EndStr(func), attr);
    }

    pub fn set_start_submsg(
        &mut self,
        field: FieldDef,
        pool: &DefPool,
        func: fn(Closure) -> Option<Closure>,
        attr: HandlerAttr,
    ) -> Result<(), HandlersError> {
        self.require_submessage(field, pool)?;
        let selector = STATIC_SELECTOR_COUNT + field.index_in_message(pool);
        self.set(selector, HandlerFn::StartSubMsg(func), attr);
        Ok(())
    }

    pub fn set_end_submsg(
        &mut self,
        field: FieldDef,
        pool: &DefPool,
        func: fn(Closure) -> bool,
        attr: HandlerAttr,
    ) -> Result<(), HandlersError> {
        self.require_submessage(field, pool)?;
        self.set(field.end_submsg_selector(pool), HandlerFn::EndSubMsg(func), attr);
        Ok(())
    }

    /// STARTSEQ/ENDSEQ live right after a repeated field's base
    /// selectors (spec §4.2: "`+2` for repeated").
    pub fn set_start_seq(
        &mut self,
        field: FieldDef,
        pool: &DefPool,
        func: fn(Closure) -> Option<Closure>,
        attr: HandlerAttr,
    ) -> Result<(), HandlersError> {
        let selector = self.require_repeated(field, pool)?;
        self.set(selector, HandlerFn::StartSeq(func), attr);
        Ok(())
    }

    pub fn set_end_seq(
        &mut self,
        field: FieldDef,
        pool: &DefPool,
        func: fn(Closure) -> bool,
        attr: HandlerAttr,
    ) -> Result<(), HandlersError> {
        let selector = self.require_repeated(field, pool)? + 1;
        self.set(selector, HandlerFn::EndSeq(func), attr);
        Ok(())
    }

    fn require_submessage(&mut self, field: FieldDef, pool: &DefPool) -> Result<(), HandlersError> {
        if !field.kind(pool).is_submessage_like() {
            let name = field.name(pool).to_string();
            self.diagnostics.push(format!("{name:?} is not a submessage field"));
            return Err(HandlersError::NotASubmessageField(name));
        }
        Ok(())
    }

    fn require_repeated(&mut self, field: FieldDef, pool: &DefPool) -> Result<u32, HandlersError> {
        if !field.is_repeated(pool) {
            let name = field.name(pool).to_string();
            self.diagnostics.push(format!("{name:?} is not repeated"));
            return Err(HandlersError::NotASubmessageField(name));
        }
        Ok(field.selector_base(pool) + field.kind(pool).base_selector_count())
    }

    /// Wires `sub` as the subhandlers for `field` (spec §4.3
    /// "Subhandlers wiring"): `field` must be a submessage field whose
    /// subdef matches `sub`'s bound message, and the slot must not
    /// already be set.
    pub fn set_subhandlers(&mut self, field: FieldDef, pool: &DefPool, sub: Arc<Handlers>) -> Result<(), HandlersError> {
        if !field.kind(pool).is_submessage_like() {
            let name = field.name(pool).to_string();
            self.diagnostics.push(format!("{name:?} is not a submessage field"));
            return Err(HandlersError::NotASubmessageField(name));
        }
        if field.message_subdef(pool).full_name(pool) != sub.message().full_name(pool) {
            let name = field.name(pool).to_string();
            self.diagnostics.push(format!("subhandlers message mismatch for {name:?}"));
            return Err(HandlersError::SubhandlersMessageMismatch(name));
        }
        let idx = field.index_in_message(pool) as usize;
        if self.subhandlers[idx].is_some() {
            let name = field.name(pool).to_string();
            self.diagnostics.push(format!("subhandlers for {name:?} already set"));
            return Err(HandlersError::SubhandlersAlreadySet(name));
        }
        self.subhandlers[idx] = Some(sub);
        Ok(())
    }

    fn has_submsg_handler(&self, field: FieldDef, pool: &DefPool) -> bool {
        let start = (STATIC_SELECTOR_COUNT + field.index_in_message(pool)) as usize;
        let end = field.end_submsg_selector(pool) as usize;
        self.table[start].func.is_some() || self.table[end].func.is_some()
    }

    /// Validates closure-type consistency within this frame and
    /// auto-installs empty subhandlers where spec §4.3 requires it,
    /// then marks this table immutable.
    pub fn freeze(mut self, pool: &DefPool) -> Result<Arc<Handlers>, HandlersError> {
        for field in self.msg.fields(pool) {
            if field.kind(pool) != FieldKind::SubMessage {
                continue;
            }
            let idx = field.index_in_message(pool) as usize;
            if self.subhandlers[idx].is_none() && self.has_submsg_handler(field, pool) {
                let empty = Handlers::new(field.message_subdef(pool), pool).freeze(pool)?;
                trace!(field = field.name(pool), "upb-handlers::auto-install empty subhandlers");
                self.subhandlers[idx] = Some(empty);
            }
        }

        self.check_closure_types(pool)?;

        self.frozen = true;
        debug!(msg = self.msg.full_name(pool), selectors = self.table.len(), "upb-handlers::freeze");
        Ok(Arc::new(self))
    }

    fn check_closure_types(&mut self, pool: &DefPool) -> Result<(), HandlersError> {
        if self.table[SEL_STARTMSG as usize].func.is_none() {
            // No STARTMSG handler: this frame's closure type is
            // inherited from whoever embeds it, which we cannot see
            // from here, so the check is skipped (spec §4.3: "a
            // missing START is allowed ... when the surrounding
            // frame's closure type coincides with what the inner
            // handlers expect").
            return Ok(());
        }
        let frame_type = self.table[SEL_STARTMSG as usize].attr.return_closure_type;

        for (selector, entry) in self.table.iter().enumerate() {
            if selector as u32 == SEL_STARTMSG || entry.func.is_none() {
                continue;
            }
            if entry.attr.input_closure_type.is_some() && entry.attr.input_closure_type != frame_type {
                return Err(HandlersError::ClosureTypeMismatch {
                    field: self.msg.full_name(pool).to_string(),
                    selector: selector as u32,
                });
            }
        }
        Ok(())
    }
}

impl Drop for Handlers {
    fn drop(&mut self) {
        while let Some(f) = self.cleanup.pop() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upb_def::{FieldBuilder, FieldType, Label};

    fn leaf_pool() -> (DefPool, MsgDef) {
        let mut pool = DefPool::new();
        let leaf = pool.new_msg(".p.Leaf").unwrap();
        pool.new_field(leaf, FieldBuilder::new("n", 1, Label::Optional, FieldType::Int32)).unwrap();
        pool.freeze(&[leaf.into()], 64).unwrap();
        (pool, leaf)
    }

    fn holder_pool() -> (DefPool, MsgDef, MsgDef, MsgDef, FieldDef) {
        let mut pool = DefPool::new();
        let leaf = pool.new_msg(".p.Leaf").unwrap();
        pool.new_field(leaf, FieldBuilder::new("n", 1, Label::Optional, FieldType::Int32)).unwrap();
        let other = pool.new_msg(".p.Other").unwrap();
        pool.new_field(other, FieldBuilder::new("n", 1, Label::Optional, FieldType::Int32)).unwrap();
        let holder = pool.new_msg(".p.Holder").unwrap();
        let f = pool
            .new_field(holder, FieldBuilder::new("sub", 1, Label::Optional, FieldType::Message))
            .unwrap();
        pool.field_set_message_subdef(f, leaf).unwrap();
        pool.freeze(&[holder.into(), leaf.into(), other.into()], 64).unwrap();
        (pool, holder, leaf, other, f)
    }

    fn noop_start(_: Closure) -> Option<Closure> {
        None
    }
    fn noop_end(_: Closure) -> bool {
        true
    }
    fn noop_end_status(_: Closure, _: DecodeStatus) -> bool {
        true
    }

    #[test]
    fn value_handler_lands_in_field_selector_base() {
        let (pool, leaf) = leaf_pool();
        let field = leaf.field_by_number(&pool, 1).unwrap();
        let mut h = Handlers::new(leaf, &pool);
        h.set_value_handler(field, &pool, HandlerFn::Int32(|_, _| true), HandlerAttr::new());
        let frozen = h.freeze(&pool).unwrap();
        assert!(frozen.table[field.selector_base(&pool) as usize].func.is_some());
    }

    #[test]
    fn set_start_submsg_rejects_non_submessage_field() {
        let (pool, leaf) = leaf_pool();
        let field = leaf.field_by_number(&pool, 1).unwrap();
        let mut h = Handlers::new(leaf, &pool);
        let err = h.set_start_submsg(field, &pool, noop_start, HandlerAttr::new()).unwrap_err();
        assert!(matches!(err, HandlersError::NotASubmessageField(_)));
        assert_eq!(h.diagnostics().len(), 1);
    }

    #[test]
    fn subhandlers_must_match_field_subdef_and_set_once() {
        let (pool, holder, leaf, other, field) = holder_pool();
        let mut h = Handlers::new(holder, &pool);
        let sub = Handlers::new(leaf, &pool).freeze(&pool).unwrap();
        let wrong_msg = Handlers::new(other, &pool).freeze(&pool).unwrap();

        let err = h.set_subhandlers(field, &pool, wrong_msg).unwrap_err();
        assert!(matches!(err, HandlersError::SubhandlersMessageMismatch(_)));

        h.set_subhandlers(field, &pool, sub.clone()).unwrap();
        let err = h.set_subhandlers(field, &pool, sub).unwrap_err();
        assert!(matches!(err, HandlersError::SubhandlersAlreadySet(_)));
    }

    #[test]
    fn freeze_auto_installs_empty_subhandlers_when_only_end_submsg_is_set() {
        let (pool, holder, _leaf, _other, field) = holder_pool();
        let mut h = Handlers::new(holder, &pool);
        h.set_end_submsg(field, &pool, noop_end, HandlerAttr::new()).unwrap();
        let frozen = h.freeze(&pool).unwrap();
        assert!(frozen.subhandlers[field.index_in_message(&pool) as usize].is_some());
    }

    #[test]
    fn freeze_skips_without_auto_install_when_no_submsg_handlers_set() {
        let (pool, holder, _leaf, _other, field) = holder_pool();
        let h = Handlers::new(holder, &pool);
        let frozen = h.freeze(&pool).unwrap();
        assert!(frozen.subhandlers[field.index_in_message(&pool) as usize].is_none());
    }

    #[test]
    fn closure_type_mismatch_is_rejected_at_freeze() {
        struct FrameA;
        struct FrameB;

        fn start_a(c: Closure) -> Option<Closure> {
            Some(c)
        }

        let (pool, holder, _leaf, _other, field) = holder_pool();
        let mut h = Handlers::new(holder, &pool);
        h.set_start_msg(start_a, HandlerAttr::new().return_closure_type(std::any::TypeId::of::<FrameA>()));
        h.set_end_msg(
            noop_end_status,
            HandlerAttr::new().input_closure_type(std::any::TypeId::of::<FrameB>()),
        );
        let _ = field;
        let err = h.freeze(&pool).unwrap_err();
        assert!(matches!(err, HandlersError::ClosureTypeMismatch { .. }));
    }

    #[test]
    fn closure_type_check_is_skipped_without_a_start_msg_handler() {
        struct FrameB;
        let (pool, holder, _leaf, _other, _field) = holder_pool();
        let mut h = Handlers::new(holder, &pool);
        h.set_end_msg(
            noop_end_status,
            HandlerAttr::new().input_closure_type(std::any::TypeId::of::<FrameB>()),
        );
        assert!(h.freeze(&pool).is_ok());
    }

    #[test]
    fn cleanups_run_in_lifo_order_when_dropped() {
        use std::sync::{Arc, Mutex};

        let (pool, holder, _leaf, _other, _field) = holder_pool();
        let order = Arc::new(Mutex::new(Vec::new()));
        {
            let mut h = Handlers::new(holder, &pool);
            for i in 0..3 {
                let order = order.clone();
                h.add_cleanup(move || order.lock().unwrap().push(i));
            }
        }
        assert_eq!(*order.lock().unwrap(), vec![2, 1, 0]);
    }
}
