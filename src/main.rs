use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dacpac_diff::{compare_dacpacs, DiffOptions, OutputOptions};

#[derive(Parser)]
#[command(name = "dacpac-diff")]
#[command(
    author,
    version,
    about = "Generate a SQL Server delta script between two dacpac files"
)]
struct Cli {
    /// Dacpac describing the current schema (the target when --new is given)
    current: PathBuf,

    /// Dacpac describing the desired schema
    target: Option<PathBuf>,

    /// Write the script to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Compare against an empty database
    #[arg(short, long)]
    new: bool,

    /// Write CRLF line endings
    #[arg(short = 'l', long = "standard-eols")]
    standard_eols: bool,

    /// Schemas to leave out of the comparison
    #[arg(short = 'S', long, value_delimiter = ',', num_args = 1..)]
    exclude_schemas: Vec<String>,

    /// Objects to leave out, by full name (`*` matches any text)
    #[arg(short = 'x', long, value_delimiter = ',', num_args = 1..)]
    exclude_objects: Vec<String>,

    /// Put each statement of a block on its own line
    #[arg(long)]
    pretty: bool,

    /// Do not guard blocks that may lose data
    #[arg(long)]
    disable_dataloss_check: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let options = DiffOptions {
        current_path: cli.current,
        target_path: cli.target,
        output_path: cli.output,
        new: cli.new,
        exclude_schemas: cli.exclude_schemas,
        exclude_objects: cli.exclude_objects,
        output: OutputOptions {
            pretty_print: cli.pretty,
            disable_dataloss_check: cli.disable_dataloss_check,
            standardise_line_endings: cli.standard_eols,
        },
    };

    compare_dacpacs(&options)
}
