//! CLI entrypoint for the `upb` scenario/property harness.

use clap::{Parser, Subcommand};

/// Scenario runner for the upb decoder.
#[derive(Debug, Parser)]
#[command(name = "upb-harness")]
#[command(about = "Scenario and fixture runner for the upb runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one or all of the builtin S1-S6 scenarios (spec §8) and
    /// report pass/fail.
    Scenario {
        /// Scenario name (e.g. "S1"), or omit to run all of them.
        name: Option<String>,
    },
    /// Decode arbitrary hex bytes against a builtin schema and print
    /// the resulting event trace.
    Decode {
        /// Builtin schema name (see `upb_harness::schemas`).
        #[arg(long)]
        schema: String,
        /// Wire-format input as a hex string (whitespace allowed).
        #[arg(long)]
        input: String,
        /// Feed the input in chunks of this many bytes (0 = one call).
        #[arg(long, default_value_t = 0)]
        chunk: usize,
    },
    /// Print the builtin scenario set as JSON.
    Fixtures,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Scenario { name } => {
            let set = upb_harness::fixtures::builtin_scenarios();
            let cases: Vec<_> = match &name {
                Some(n) => set.cases.into_iter().filter(|c| &c.name == n).collect(),
                None => set.cases,
            };
            if cases.is_empty() {
                return Err(format!("no builtin scenario named {:?}", name.unwrap_or_default()).into());
            }

            let mut failed = 0;
            for case in &cases {
                let (group, handlers) = upb_harness::schema_by_name(&case.schema);
                let trace = upb_harness::decode_to_trace(group, &handlers, &case.input_bytes(), 0)?;
                if trace == case.expected_trace {
                    println!("{}: PASS", case.name);
                } else {
                    failed += 1;
                    println!("{}: FAIL", case.name);
                    println!("  expected: {:?}", case.expected_trace);
                    println!("  actual:   {:?}", trace);
                }
            }
            if failed > 0 {
                return Err(format!("{failed} scenario(s) failed").into());
            }
        }
        Command::Decode { schema, input, chunk } => {
            let clean: String = input.chars().filter(|c| !c.is_whitespace()).collect();
            let clean = clean.strip_prefix("0x").unwrap_or(&clean).to_string();
            let bytes: Vec<u8> = (0..clean.len())
                .step_by(2)
                .map(|i| u8::from_str_radix(&clean[i..i + 2], 16))
                .collect::<Result<_, _>>()?;

            let (group, handlers) = upb_harness::schema_by_name(&schema);
            let trace = upb_harness::decode_to_trace(group, &handlers, &bytes, chunk)?;
            for event in trace {
                println!("{event}");
            }
        }
        Command::Fixtures => {
            let set = upb_harness::fixtures::builtin_scenarios();
            println!("{}", set.to_json()?);
        }
    }

    Ok(())
}
