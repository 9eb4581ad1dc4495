//! Scenario and property-test support for the `upb` workspace: builds
//! tiny schema/handlers pairs, feeds literal wire bytes through
//! [`upb::Decoder`] and records the resulting event trace for
//! comparison against spec §8's abbreviated traces.

pub mod fixtures;
pub mod schemas;
pub mod trace;

use std::sync::Arc;

use upb::{DecodeResult, Decoder, Group, Handlers};

use trace::Recorder;

/// Feeds `input` to a fresh [`Decoder`] built from `group`/`handlers`
/// in `chunks`-sized pieces (or as one call if `chunks == 0`), signals
/// EOF, and returns the recorded event trace.
pub fn decode_to_trace(group: Arc<Group>, handlers: &Arc<Handlers>, input: &[u8], chunk: usize) -> DecodeResult<Vec<String>> {
    let mut recorder = Recorder::new();
    let closure = upb::Closure::new(&mut recorder);
    let mut decoder = Decoder::with_default_depth(group, handlers, closure)?;

    if chunk == 0 {
        decoder.decode(input)?;
    } else {
        // Each `decode()` call folds its residual in internally, so a
        // buffer-seam test just needs to hand over consecutive
        // chunks; none of the builtin scenarios trigger the
        // skip-overshoot protocol, so the return value needs no
        // bookkeeping here.
        for piece in input.chunks(chunk) {
            decoder.decode(piece)?;
        }
    }
    decoder.end()?;
    Ok(recorder.events)
}

/// Looks up one of [`schemas`]'s builder functions by the name used in
/// [`fixtures::ScenarioCase::schema`].
pub fn schema_by_name(name: &str) -> (Arc<Group>, Arc<Handlers>) {
    match name {
        "scalar_int32" => schemas::scalar_int32(),
        "string_field" => schemas::string_field(),
        "nested_submessage" => schemas::nested_submessage(),
        "repeated_int32" => schemas::repeated_int32(),
        other => panic!("unknown builtin schema {other:?}"),
    }
}
