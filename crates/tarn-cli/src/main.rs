use clap::Parser;
use tracing_subscriber::EnvFilter;

use tarn_cli::args::CliArgs;
use tarn_cli::driver;

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    let filter = match &args.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let code = driver::run(&args, &mut std::io::stdout())?;
    std::process::exit(code);
}
