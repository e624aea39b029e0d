use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use datawrangler::app::{ImportOptions, ImportReport, ProgressSink, RefreshReport, Wrangler};
use datawrangler::config::{ConfigLoader, ResolvedConfig};
use datawrangler::domain::FetchStamp;
use datawrangler::error::WranglerError;
use datawrangler::fetch::{HttpFetcher, SourceFetcher};
use datawrangler::format::LogicalFormat;
use datawrangler::output::{ConsoleProgress, JsonOutput};
use datawrangler::publish::{
    ChainedCredentials, EnvCredentials, GeoServerPublisher, PublishReport, StaticCredentials,
};
use datawrangler::store::SqliteStore;
use datawrangler::vector::FeatureCollectionConverter;

#[derive(Parser)]
#[command(name = "datawrangler")]
#[command(about = "Keep a local document store in sync with remote GIS and tabular data sources")]
#[command(version, author)]
struct Cli {
    /// Configuration file (defaults to ./datawrangler.json when present).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Print reports as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Seed country codes, load source descriptors and refresh expired sources")]
    Refresh(RefreshArgs),
    #[command(about = "Import a single local file into a collection")]
    Import(ImportArgs),
    #[command(about = "List stored source descriptors")]
    Sources,
    #[command(about = "Publish normalized source files to the map server")]
    Publish(PublishArgs),
}

#[derive(Args)]
struct RefreshArgs {
    /// Source descriptor CSV to load before refreshing.
    #[arg(long)]
    sources: Option<PathBuf>,
}

#[derive(Args)]
struct ImportArgs {
    path: PathBuf,

    #[arg(long)]
    format: LogicalFormat,

    #[arg(long)]
    collection: Option<String>,

    /// Natural key field.
    #[arg(long)]
    key: Option<String>,

    /// Lines to skip before the header row.
    #[arg(long)]
    header: Option<usize>,
}

#[derive(Args)]
struct PublishArgs {
    /// Only publish this source.
    #[arg(long)]
    source: Option<String>,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<WranglerError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &WranglerError) -> u8 {
    match error {
        WranglerError::ConfigRead(_)
        | WranglerError::ConfigParse(_)
        | WranglerError::UnknownFormat(_) => 2,
        WranglerError::Http(_)
        | WranglerError::HttpStatus { .. }
        | WranglerError::MissingUrl(_)
        | WranglerError::Publish(_)
        | WranglerError::Unauthorized(_) => 3,
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
    let config = ConfigLoader::resolve(cli.config.as_deref())?;
    let store = SqliteStore::open(config.store_path.as_std_path())?;

    let store = match cli.command {
        Commands::Refresh(args) => {
            let fetcher = HttpFetcher::new(config.work_dir.as_std_path(), config.fetch_timeout)?;
            let wrangler = Wrangler::new(store, fetcher, FeatureCollectionConverter, config.staleness);
            run_refresh(&wrangler, &config, args, cli.json)?;
            wrangler.into_store()
        }
        Commands::Import(args) => {
            let wrangler = offline(store, &config);
            run_import(&wrangler, args, cli.json)?;
            wrangler.into_store()
        }
        Commands::Sources => {
            let wrangler = offline(store, &config);
            let sources = wrangler.sources()?;
            if cli.json {
                JsonOutput::print_sources(&sources).into_diagnostic()?;
            } else {
                for source in &sources {
                    let date = source
                        .data_date
                        .map_or_else(|| "never".to_string(), |date| date.to_string());
                    println!(
                        "{:<32} {:<16} fetched {date}",
                        source.import_name, source.data_format
                    );
                }
            }
            wrangler.into_store()
        }
        Commands::Publish(args) => {
            let wrangler = offline(store, &config);
            run_publish(&wrangler, &config, args, cli.json)?;
            wrangler.into_store()
        }
    };
    store.close()?;
    Ok(())
}

fn offline(store: SqliteStore, config: &ResolvedConfig) -> Wrangler<SqliteStore, NopFetcher, FeatureCollectionConverter> {
    Wrangler::new(store, NopFetcher, FeatureCollectionConverter, config.staleness)
}

fn run_refresh<F: SourceFetcher>(
    wrangler: &Wrangler<SqliteStore, F, FeatureCollectionConverter>,
    config: &ResolvedConfig,
    args: RefreshArgs,
    json: bool,
) -> miette::Result<()> {
    if let Some(seeded) = wrangler.seed_country_codes(config.country_codes.as_std_path())? {
        if !json {
            print_import_summary(&seeded);
        }
    }

    let sources_csv = args
        .sources
        .or_else(|| config.sources_csv.as_ref().map(|path| path.as_std_path().to_path_buf()));
    if let Some(csv) = sources_csv {
        let loaded = wrangler.load_sources(&csv)?;
        if !json {
            print_import_summary(&loaded);
        }
    }

    let sink: &dyn ProgressSink = if json { &JsonOutput } else { &ConsoleProgress };
    let report = wrangler.refresh_all(FetchStamp::now(), sink)?;
    if json {
        JsonOutput::print_refresh(&report).into_diagnostic()?;
    } else {
        print_refresh_summary(&report);
    }
    Ok(())
}

fn run_import<F: SourceFetcher>(
    wrangler: &Wrangler<SqliteStore, F, FeatureCollectionConverter>,
    args: ImportArgs,
    json: bool,
) -> miette::Result<()> {
    let options = ImportOptions {
        collection: args.collection,
        data_key: args.key,
        header: args.header,
    };
    let report = wrangler.import_file(&args.path, args.format, &options)?;
    if json {
        JsonOutput::print_import(&report).into_diagnostic()?;
    } else {
        print_import_summary(&report);
    }
    Ok(())
}

fn run_publish<F: SourceFetcher>(
    wrangler: &Wrangler<SqliteStore, F, FeatureCollectionConverter>,
    config: &ResolvedConfig,
    args: PublishArgs,
    json: bool,
) -> miette::Result<()> {
    let publish = config.publish.clone().ok_or_else(|| {
        WranglerError::ConfigParse("no \"publish\" section in the configuration".to_string())
    })?;
    let credentials = ChainedCredentials::new(
        StaticCredentials::new(publish.username.clone(), publish.password.clone()),
        EnvCredentials,
    );
    let publisher = GeoServerPublisher::new(publish, credentials, config.fetch_timeout)?;
    let reports = wrangler.publish_all(&publisher, args.source.as_deref())?;
    if json {
        JsonOutput::print_publish(&reports).into_diagnostic()?;
    } else {
        print_publish_summary(&reports);
    }
    Ok(())
}

fn print_import_summary(report: &ImportReport) {
    println!(
        "{}: {} accepted, {} rejected",
        report.collection,
        report.accepted(),
        report.rejected()
    );
    for file in &report.files {
        println!("   {} {:?}", file.path, file.status);
    }
}

fn print_refresh_summary(report: &RefreshReport) {
    println!(
        "refresh at {}: {} of {} sources refreshed",
        report.now,
        report.refreshed(),
        report.sources.len()
    );
    for source in &report.sources {
        println!("   {} {:?}", source.import_name, source.status);
    }
}

fn print_publish_summary(reports: &[PublishReport]) {
    for report in reports {
        match (&report.outcome, &report.error) {
            (Some(outcome), _) => println!("{} {}: {outcome:?}", report.source, report.path),
            (None, Some(error)) => println!("{} {}: failed: {error}", report.source, report.path),
            (None, None) => {}
        }
    }
}

/// Stands in for the network on commands that never download.
struct NopFetcher;

impl SourceFetcher for NopFetcher {
    fn fetch(
        &self,
        _url: Option<&str>,
        file_name: &str,
        _sink: &dyn ProgressSink,
    ) -> Result<PathBuf, WranglerError> {
        Err(WranglerError::Http(format!(
            "downloading {file_name} is not available for this command"
        )))
    }
}
