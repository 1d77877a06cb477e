use std::io::IsTerminal;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use eo_indices::catalog::CatalogHttpClient;
use eo_indices::config::ConfigLoader;
use eo_indices::domain::{
    BoundingBox, CloudCover, Credentials, ImageFormat, IndexKind, parse_date,
};
use eo_indices::error::EoError;
use eo_indices::output::{self, JsonOutput, LineProgress, OutputMode};
use eo_indices::pipeline::{CancelToken, Pipeline, PipelineOptions, RunRequest};
use eo_indices::store::CacheStore;
use eo_indices::tui::Tui;

#[derive(Parser)]
#[command(name = "eo-indices")]
#[command(about = "Query a scene catalog, cache scenes, and derive NDVI/BAI imagery")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run the index pipeline for an area and time window")]
    Run(RunArgs),
    #[command(about = "Inspect the scene cache")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long, value_enum, ignore_case = true)]
    index: IndexKind,

    #[arg(long, allow_hyphen_values = true, help = "minLon,maxLon,minLat,maxLat")]
    bbox: BoundingBox,

    #[arg(long, help = "YYYY-MM-DD; defaults to thirty days before the end date")]
    start: Option<String>,

    #[arg(long, help = "YYYY-MM-DD; defaults to now")]
    end: Option<String>,

    #[arg(long, default_value = "30")]
    cloud_cover: CloudCover,

    #[arg(long)]
    username: String,

    #[arg(long, env = "EO_PASSWORD", hide_env_values = true)]
    password: String,

    #[arg(long, value_enum, ignore_case = true)]
    format: Option<ImageFormat>,

    #[arg(long)]
    workers: Option<usize>,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "List cached archives and extracted scenes")]
    List,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<EoError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &EoError) -> u8 {
    match error {
        EoError::InvalidBbox(_)
        | EoError::InvalidCloudCover(_)
        | EoError::InvalidIndex(_)
        | EoError::InvalidDate(_)
        | EoError::InvalidImageFormat(_)
        | EoError::ConfigRead(_)
        | EoError::ConfigParse(_) => 2,
        EoError::Query(_) | EoError::CatalogHttp(_) | EoError::CatalogStatus { .. } => 3,
        EoError::Auth(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json {
        OutputMode::Json
    } else if cli.non_interactive || !std::io::stdout().is_terminal() {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    match cli.command {
        Commands::Run(args) => run_pipeline(args, cli.config.as_deref(), output_mode),
        Commands::Cache(args) => match args.command {
            CacheCommand::List => run_cache_list(cli.config.as_deref(), output_mode),
        },
    }
}

fn run_pipeline(
    args: RunArgs,
    config_path: Option<&str>,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve(config_path)?;
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(EoError::ConfigParse("--workers must be at least 1".to_string()).into());
        }
        config.workers = workers;
    }

    let request = RunRequest {
        index: args.index,
        bbox: args.bbox,
        start: args.start.as_deref().map(parse_date).transpose()?,
        end: args.end.as_deref().map(parse_date).transpose()?,
        cloud_cover: args.cloud_cover,
        credentials: Credentials {
            username: args.username,
            password: args.password,
        },
        image_format: args.format.unwrap_or(config.image_format),
    };
    tracing::debug!(?request, workers = config.workers, cache = %config.cache_root, "resolved run");

    let client = CatalogHttpClient::new(config.catalog.clone())?;
    let pipeline = Pipeline::new(
        CacheStore::from_config(&config),
        client,
        PipelineOptions::from_config(&config),
    );
    let cancel = CancelToken::new();

    match output_mode {
        OutputMode::Json => {
            let report = pipeline.run(&request, &JsonOutput, &cancel)?;
            JsonOutput::print_run(&report).into_diagnostic()?;
        }
        OutputMode::NonInteractive => {
            let report = pipeline.run(&request, &LineProgress, &cancel)?;
            output::print_run_summary(&report);
        }
        OutputMode::Interactive => {
            let title = format!("{} {}", request.index, request.bbox);
            let mut tui = Tui::new(title, cancel.clone());
            let report = tui.run(move |sink| pipeline.run(&request, sink, &cancel))?;
            output::print_run_summary(&report);
        }
    }
    Ok(())
}

fn run_cache_list(config_path: Option<&str>, output_mode: OutputMode) -> miette::Result<()> {
    let config = ConfigLoader::resolve(config_path)?;
    let store = CacheStore::from_config(&config);
    let items = store.list_entries()?;
    match output_mode {
        OutputMode::Json => JsonOutput::print_cache(&items).into_diagnostic()?,
        OutputMode::NonInteractive | OutputMode::Interactive => output::print_cache_listing(&items),
    }
    Ok(())
}
