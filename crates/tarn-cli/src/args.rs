use clap::Parser;
use std::path::PathBuf;

/// CLI arguments for the tarnc binary.
#[derive(Parser, Debug)]
#[command(name = "tarnc", version, about = "Compiler for the Tarn language")]
pub struct CliArgs {
    /// Source file to compile.
    pub input: PathBuf,

    /// Print the bytecode listing after a successful compilation.
    #[arg(long)]
    pub disasm: bool,

    /// Print the bytecode listing as JSON instead of plain text.
    #[arg(long)]
    pub json: bool,

    /// Log filter, e.g. `debug` or `tarn_compiler=trace`.
    #[arg(long = "log-level")]
    pub log_level: Option<String>,
}
