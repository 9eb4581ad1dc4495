//! The bytecode compiler (spec §4.4 "Compiler (two-pass)").
//!
//! Discovers every handlers node reachable from a root via
//! `get_subhandlers`, compiles one [`DecoderMethod`] per node into a
//! shared [`Group`], and patches forward `CALL`s once every method's
//! `code_base` is known.
//!
//! Deviation from the literal "compile twice, re-emitting the whole
//! method body on pass two" recipe, noted in `DESIGN.md`: instructions
//! live in an index-addressed `Vec`, so a forward `CALL` can be
//! recorded as a one-off patch (`pending_calls`) and fixed up in O(1)
//! once its target is known, rather than re-emitting every
//! already-compiled method a second time. The observable result is
//! identical — every `CALL` ends up pointing at its target's
//! `code_base` before the group is handed to the VM — which is what
//! spec §8's testable properties actually constrain.

use std::collections::VecDeque;
use std::sync::Arc;

use upb_def::{DefPool, FieldKind, MsgDef};
use upb_handlers::Handlers;

use crate::instr::{Instr, Pc, PrimitiveOp};
use crate::method::{DecoderMethod, DispatchEntry, Group};
use crate::wire::WireType;

struct Emitter<'a> {
    group: &'a mut Group,
}

impl<'a> Emitter<'a> {
    fn push(&mut self, instr: Instr) -> Pc {
        let pc = self.group.code.len();
        self.group.code.push(instr);
        pc
    }

    fn here(&self) -> Pc {
        self.group.code.len()
    }

    fn patch_branch_target(&mut self, pc: Pc, target: Pc) {
        match &mut self.group.code[pc] {
            Instr::CheckDelim(t) | Instr::Branch(t) | Instr::Call(t) => *t = target,
            other => panic!("patch_branch_target on non-jump instruction {other:?}"),
        }
    }
}

/// Compiles `root` and every handlers node transitively reachable
/// through submessage fields into a fresh [`Group`].
pub fn compile(pool: &DefPool, root: &Arc<Handlers>) -> Group {
    let mut group = Group::new();
    let mut queue: VecDeque<Arc<Handlers>> = VecDeque::new();
    queue.push_back(root.clone());

    // pending CALLs whose target method hasn't been compiled yet,
    // resolved once the whole reachable set has been visited.
    let mut pending_calls: Vec<(Pc, Arc<Handlers>)> = Vec::new();

    while let Some(h) = queue.pop_front() {
        if group.contains(&h) {
            continue;
        }
        let method = {
            let mut emitter = Emitter { group: &mut group };
            compile_method(pool, &h, &mut emitter, &mut pending_calls, &mut queue)
        };
        group.insert_method(h, method);
    }

    for (pc, target_handlers) in pending_calls {
        let target_base = group.method_for(&target_handlers).expect("every queued method was compiled").code_base;
        let mut emitter = Emitter { group: &mut group };
        emitter.patch_branch_target(pc, target_base);
    }

    group
}

/// The (STARTSEQ, ENDSEQ) selector pair for a repeated field, placed
/// right after its base selectors by `upb_def::selector::assign_selectors`
/// (spec §4.2 "+2 for repeated").
fn seq_selectors(field: upb_def::FieldDef, pool: &DefPool) -> (u32, u32) {
    let start = field.selector_base(pool) + field.kind(pool).base_selector_count();
    (start, start + 1)
}

fn compile_method(
    pool: &DefPool,
    handlers: &Arc<Handlers>,
    e: &mut Emitter,
    pending_calls: &mut Vec<(Pc, Arc<Handlers>)>,
    queue: &mut VecDeque<Arc<Handlers>>,
) -> DecoderMethod {
    let msg: MsgDef = handlers.message();
    let code_base = e.push(Instr::StartMsg);
    let loop_start = e.here();
    let checkdelim_pc = e.push(Instr::CheckDelim(0)); // patched to end_label below
    e.push(Instr::Dispatch);
    e.push(Instr::Branch(loop_start));

    let mut dispatch_table = std::collections::HashMap::new();
    let mut fields = msg.fields(pool);
    fields.sort_by_key(|f| f.number(pool));

    for field in fields {
        let number = field.number(pool);
        let selector_base = field.selector_base(pool);
        match field.kind(pool) {
            FieldKind::Scalar => {
                let op = PrimitiveOp::of(field.field_type(pool), field.encoding(pool));
                let repeated = field.is_repeated(pool);
                let seq = repeated.then(|| seq_selectors(field, pool));
                let primary_target = e.here();
                if let Some((start_sel, end_sel)) = seq {
                    e.push(Instr::StartSeq(start_sel, end_sel));
                }
                e.push(Instr::ParsePrimitive(op, selector_base));
                e.push(Instr::Branch(loop_start));

                let secondary = if repeated {
                    let packed_target = e.here();
                    if let Some((start_sel, end_sel)) = seq {
                        e.push(Instr::StartSeq(start_sel, end_sel));
                    }
                    e.push(Instr::PushLenDelim);
                    let packed_loop = e.here();
                    let packed_check = e.push(Instr::CheckDelim(0));
                    e.push(Instr::ParsePrimitive(op, selector_base));
                    e.push(Instr::Branch(packed_loop));
                    let after_packed = e.here();
                    e.patch_branch_target(packed_check, after_packed);
                    e.push(Instr::Pop);
                    e.push(Instr::Branch(loop_start));
                    Some((WireType::LenDelim, packed_target))
                } else {
                    None
                };

                dispatch_table.insert(
                    number,
                    DispatchEntry { primary_wt: op.wire_type(), primary_target, secondary },
                );
            }
            FieldKind::StringLike | FieldKind::LazySubMessage => {
                let target = e.here();
                if field.is_repeated(pool) {
                    let (start_sel, end_sel) = seq_selectors(field, pool);
                    e.push(Instr::StartSeq(start_sel, end_sel));
                }
                e.push(Instr::PushLenDelim);
                e.push(Instr::StartStr(selector_base));
                e.push(Instr::StringChunk(selector_base + 1));
                e.push(Instr::Pop);
                e.push(Instr::EndStr(selector_base + 2));
                e.push(Instr::SetDelim);
                e.push(Instr::Branch(loop_start));
                dispatch_table.insert(
                    number,
                    DispatchEntry { primary_wt: WireType::LenDelim, primary_target: target, secondary: None },
                );
            }
            FieldKind::SubMessage => {
                let start_selector = upb_def::STATIC_SELECTOR_COUNT + field.index_in_message(pool);
                let end_selector = field.end_submsg_selector(pool);

                let sub = handlers
                    .subhandlers_for(field, pool)
                    .expect("submessage field has subhandlers after Handlers::freeze");
                queue.push_back(sub.clone());

                let repeated_seq = field.is_repeated(pool).then(|| seq_selectors(field, pool));

                if field.is_tag_delimited(pool) {
                    let target = e.here();
                    if let Some((start_sel, end_sel)) = repeated_seq {
                        e.push(Instr::StartSeq(start_sel, end_sel));
                    }
                    e.push(Instr::PushTagDelim(number));
                    e.push(Instr::StartSubMsg(start_selector));
                    let call_pc = e.push(Instr::Call(0));
                    pending_calls.push((call_pc, sub));
                    e.push(Instr::Pop);
                    e.push(Instr::EndSubMsg(end_selector));
                    e.push(Instr::Branch(loop_start));
                    dispatch_table.insert(
                        number,
                        DispatchEntry { primary_wt: WireType::StartGroup, primary_target: target, secondary: None },
                    );
                } else {
                    let target = e.here();
                    if let Some((start_sel, end_sel)) = repeated_seq {
                        e.push(Instr::StartSeq(start_sel, end_sel));
                    }
                    e.push(Instr::PushLenDelim);
                    e.push(Instr::StartSubMsg(start_selector));
                    let call_pc = e.push(Instr::Call(0));
                    pending_calls.push((call_pc, sub));
                    e.push(Instr::Pop);
                    e.push(Instr::EndSubMsg(end_selector));
                    e.push(Instr::SetDelim);
                    e.push(Instr::Branch(loop_start));
                    dispatch_table.insert(
                        number,
                        DispatchEntry { primary_wt: WireType::LenDelim, primary_target: target, secondary: None },
                    );
                }
            }
        }
    }

    let end_label = e.here();
    e.patch_branch_target(checkdelim_pc, end_label);
    e.push(Instr::EndMsg);
    e.push(Instr::Ret);

    DecoderMethod { code_base, dispatch_table, endmsg_pc: end_label, handlers: handlers.clone() }
}
