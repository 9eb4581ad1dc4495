//! Fixture loading, mirroring the teacher harness's JSON fixture-set
//! shape: a named case carries its literal wire bytes (as a hex
//! string, since JSON has no native byte-string type) and the
//! abbreviated event trace it must produce.

use serde::{Deserialize, Serialize};

/// One scenario case (spec §8's S1-S6 are captured this way).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioCase {
    pub name: String,
    pub schema: String,
    pub input_hex: String,
    pub expected_trace: Vec<String>,
}

/// A collection of scenario cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioSet {
    pub version: String,
    pub cases: Vec<ScenarioCase>,
}

impl ScenarioCase {
    pub fn input_bytes(&self) -> Vec<u8> {
        decode_hex(&self.input_hex)
    }
}

impl ScenarioSet {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

fn decode_hex(s: &str) -> Vec<u8> {
    let clean: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let clean = clean.strip_prefix("0x").unwrap_or(&clean);
    (0..clean.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&clean[i..i + 2], 16).expect("malformed hex fixture"))
        .collect()
}

/// The builtin S1-S6 scenarios (spec §8), paired with the schema
/// each one decodes against. The schema name matches one of
/// [`crate::schemas`]'s builder functions.
pub fn builtin_scenarios() -> ScenarioSet {
    ScenarioSet {
        version: "1".to_string(),
        cases: vec![
            ScenarioCase {
                name: "S1".into(),
                schema: "scalar_int32".into(),
                input_hex: "08 96 01".into(),
                expected_trace: vec!["STARTMSG".into(), "INT32(a)=150".into(), "ENDMSG".into()],
            },
            ScenarioCase {
                name: "S2".into(),
                schema: "string_field".into(),
                input_hex: "12 03 61 62 63".into(),
                expected_trace: vec![
                    "STARTMSG".into(),
                    "STARTSTR(s)".into(),
                    "STRING(s,\"abc\")".into(),
                    "ENDSTR(s)".into(),
                    "ENDMSG".into(),
                ],
            },
            ScenarioCase {
                name: "S3".into(),
                schema: "nested_submessage".into(),
                input_hex: "1A 02 08 2A".into(),
                expected_trace: vec![
                    "STARTMSG".into(),
                    "STARTSUBMSG(m)".into(),
                    "STARTMSG".into(),
                    "INT32(x)=42".into(),
                    "ENDMSG".into(),
                    "ENDSUBMSG(m)".into(),
                    "ENDMSG".into(),
                ],
            },
            ScenarioCase {
                name: "S4".into(),
                schema: "repeated_int32".into(),
                input_hex: "22 03 01 02 03".into(),
                expected_trace: vec![
                    "STARTMSG".into(),
                    "STARTSEQ(r)".into(),
                    "INT32=1".into(),
                    "INT32=2".into(),
                    "INT32=3".into(),
                    "ENDSEQ(r)".into(),
                    "ENDMSG".into(),
                ],
            },
            ScenarioCase {
                name: "S5".into(),
                schema: "repeated_int32".into(),
                input_hex: "20 01 20 02 20 03".into(),
                expected_trace: vec![
                    "STARTMSG".into(),
                    "STARTSEQ(r)".into(),
                    "INT32=1".into(),
                    "INT32=2".into(),
                    "INT32=3".into(),
                    "ENDSEQ(r)".into(),
                    "ENDMSG".into(),
                ],
            },
            ScenarioCase {
                name: "S6".into(),
                schema: "scalar_int32".into(),
                input_hex: "23 28 07 24".into(),
                expected_trace: vec!["STARTMSG".into(), "ENDMSG".into()],
            },
        ],
    }
}
