use std::path::PathBuf;
use std::time::Instant;

use facet::Facet;
use figue as args;
use heapdb::{CaptureConfig, DEFAULT_PROGRESS_EVERY, ReferenceEncoding, default_output_path};
use tracing::{error, info};

#[derive(Facet, Debug)]
struct Cli {
    #[facet(flatten)]
    builtins: args::FigueBuiltins,
    /// Heap export (JSON) to capture.
    #[facet(args::positional)]
    input: String,
    /// Snapshot path; defaults to the input with a `.sqlite` extension.
    #[facet(args::named, default)]
    output: Option<String>,
    /// `edges` (default) or `packed`.
    #[facet(args::named, default)]
    encoding: Option<String>,
    /// Which runtime of a multi-runtime export to capture.
    #[facet(args::named, default)]
    runtime: Option<usize>,
    #[facet(args::named, default)]
    progress_every: Option<u64>,
    /// Skip the secondary indexes.
    #[facet(args::named, default)]
    no_index: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run() {
        error!("{err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let started = Instant::now();
    let cli = parse_cli()?;

    let input = PathBuf::from(&cli.input);
    let output = cli
        .output
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&input));
    if output == input {
        return Err(format!(
            "output {} would overwrite the input; pass --output",
            output.display()
        ));
    }

    let encoding = match cli.encoding.as_deref() {
        None => ReferenceEncoding::default(),
        Some(value) => ReferenceEncoding::parse(value)
            .ok_or_else(|| format!("unknown encoding {value:?}; expected `edges` or `packed`"))?,
    };
    let config = CaptureConfig {
        encoding,
        progress_every: cli.progress_every.unwrap_or(DEFAULT_PROGRESS_EVERY),
        index_references: !cli.no_index,
    };

    let summary = heapdb::capture_export(&input, cli.runtime.unwrap_or(0), &output, &config)
        .map_err(|e| e.to_string())?;

    info!(
        output = %output.display(),
        objects = summary.rows.objects,
        types = summary.rows.types,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "done"
    );
    Ok(())
}

fn parse_cli() -> Result<Cli, String> {
    let figue_config = args::builder::<Cli>()
        .map_err(|e| format!("failed to build CLI schema: {e}"))?
        .cli(|cli| cli.strict())
        .help(|h| {
            h.program_name("heapdb")
                .description("Capture a heap export into a SQLite snapshot")
                .version(option_env!("CARGO_PKG_VERSION").unwrap_or("dev"))
        })
        .build();
    let cli = args::Driver::new(figue_config)
        .run()
        .into_result()
        .map_err(|e| e.to_string())?;
    Ok(cli.value)
}
