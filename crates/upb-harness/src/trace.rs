//! A recorder [`Closure`] sink that turns decoder events into the
//! abbreviated trace strings the scenarios in spec §8 are written
//! against (e.g. `"STARTMSG"`, `"INT32(a)=150"`). Every handler here
//! reuses the single `Closure` it was handed rather than minting a new
//! one per frame, so nested submessages accumulate into the same
//! `Recorder` instead of needing one sink per frame.

use upb::{Closure, DecodeStatus};

/// Ordered event trace produced by a decode run.
#[derive(Debug, Default)]
pub struct Recorder {
    pub events: Vec<String>,
}

impl Recorder {
    pub fn new() -> Self {
        Recorder::default()
    }
}

fn push(c: Closure, event: impl Into<String>) {
    if let Some(r) = unsafe { c.downcast_mut::<Recorder>() } {
        r.events.push(event.into());
    }
}

pub fn start_msg(c: Closure) -> Option<Closure> {
    push(c, "STARTMSG");
    Some(c)
}

pub fn end_msg(c: Closure, _status: DecodeStatus) -> bool {
    push(c, "ENDMSG");
    true
}

pub fn record_a(c: Closure, v: i32) -> bool {
    push(c, format!("INT32(a)={v}"));
    true
}

pub fn record_x(c: Closure, v: i32) -> bool {
    push(c, format!("INT32(x)={v}"));
    true
}

pub fn record_r(c: Closure, v: i32) -> bool {
    push(c, format!("INT32={v}"));
    true
}

pub fn start_str_s(c: Closure, _size_hint: usize) -> Option<Closure> {
    push(c, "STARTSTR(s)");
    Some(c)
}

pub fn string_chunk_s(c: Closure, bytes: &[u8]) -> usize {
    push(c, format!("STRING(s,\"{}\")", String::from_utf8_lossy(bytes)));
    bytes.len()
}

pub fn end_str_s(c: Closure) -> bool {
    push(c, "ENDSTR(s)");
    true
}

pub fn start_seq_r(c: Closure) -> Option<Closure> {
    push(c, "STARTSEQ(r)");
    Some(c)
}

pub fn end_seq_r(c: Closure) -> bool {
    push(c, "ENDSEQ(r)");
    true
}

pub fn start_submsg_m(c: Closure) -> Option<Closure> {
    push(c, "STARTSUBMSG(m)");
    Some(c)
}

pub fn end_submsg_m(c: Closure) -> bool {
    push(c, "ENDSUBMSG(m)");
    true
}
