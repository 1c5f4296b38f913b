//! Compile one source file and render the outcome.

use anyhow::Context;
use colored::Colorize;
use std::io::Write;

use tarn_compiler::{Compiler, Module};

use crate::args::CliArgs;

/// Run a compilation; returns the process exit code.
pub fn run(args: &CliArgs, out: &mut impl Write) -> anyhow::Result<i32> {
    let file = args.input.display().to_string();
    let source = std::fs::read_to_string(&args.input)
        .with_context(|| format!("cannot read {file}"))?;

    let module = match Compiler::new(&file, &source).and_then(Compiler::compile) {
        Ok(module) => module,
        Err(diag) => {
            let location = format!("{}:{}", diag.file, diag.pos);
            writeln!(out, "{}: {}", location.bold(), diag.message.red())?;
            return Ok(1);
        }
    };

    if args.json {
        writeln!(out, "{}", listing_json(&module))?;
    } else if args.disasm {
        write!(out, "{}", module.listing())?;
    }
    Ok(0)
}

fn listing_json(module: &Module) -> serde_json::Value {
    serde_json::json!({
        "globals_size": module.globals_size(),
        "code": module
            .code
            .iter()
            .enumerate()
            .map(|(offset, instr)| {
                serde_json::json!({ "offset": offset, "instr": instr.to_string() })
            })
            .collect::<Vec<_>>(),
    })
}
