use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use tempo_no2::cache::QueryCache;
use tempo_no2::catalog::{CmrCatalog, GranuleCatalog, GranuleHandle, GranuleSearch, SearchOutcome};
use tempo_no2::config::{ConfigLoader, ResolvedConfig};
use tempo_no2::domain::{GeoPoint, Query};
use tempo_no2::error::TempoError;
use tempo_no2::geocode::{Geocoder, NominatimGeocoder};
use tempo_no2::granule::GranuleReader;
use tempo_no2::output::{ClearResult, JsonOutput};
use tempo_no2::server;
use tempo_no2::service::{QueryService, ServiceSettings};
use tempo_no2::session::{Credentials, EarthdataSession};
use tempo_no2::transfer::{EarthdataTransfer, GranuleTransfer};

#[derive(Parser)]
#[command(name = "tempo-no2")]
#[command(about = "TEMPO NO2 column observations around a place, with a per-query cache")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Retrieve quality-filtered observations around a city")]
    Query(QueryArgs),
    #[command(about = "Subset one local granule around a point")]
    Inspect(InspectArgs),
    #[command(about = "Serve the query endpoint over HTTP")]
    Serve(ServeArgs),
    #[command(about = "Manage cached query results")]
    Cache(CacheArgs),
}

#[derive(Args)]
struct QueryArgs {
    city: String,
    start_date: String,
    end_date: String,

    #[arg(long, help = "Include the resolved point and result source")]
    full: bool,
}

#[derive(Args)]
struct InspectArgs {
    file: PathBuf,

    #[arg(long, allow_hyphen_values = true)]
    lat: f64,

    #[arg(long, allow_hyphen_values = true)]
    lon: f64,
}

#[derive(Args)]
struct ServeArgs {
    #[arg(long)]
    listen: Option<String>,
}

#[derive(Args)]
struct CacheArgs {
    #[command(subcommand)]
    command: CacheCommand,
}

#[derive(Subcommand)]
enum CacheCommand {
    #[command(about = "List cached queries")]
    List,
    #[command(about = "Remove every cached query")]
    Clear,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<TempoError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &TempoError) -> u8 {
    match error {
        TempoError::PlaceNotFound(_) | TempoError::NoData(_) => 2,
        TempoError::GeocoderHttp(_)
        | TempoError::GeocoderStatus { .. }
        | TempoError::CatalogHttp(_)
        | TempoError::CatalogStatus { .. }
        | TempoError::TransferHttp(_)
        | TempoError::TransferStatus { .. } => 3,
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

    match cli.command {
        Commands::Query(args) => run_query(args, &config),
        Commands::Inspect(args) => run_inspect(args, &config),
        Commands::Serve(args) => run_serve(args, &config),
        Commands::Cache(args) => run_cache(args, &config),
    }
}

fn run_query(args: QueryArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let service = build_service(config)?;
    let query = Query::new(args.city, args.start_date, args.end_date);
    let outcome = service.run(&query)?;
    if args.full {
        JsonOutput::print_outcome(&outcome).into_diagnostic()?;
    } else {
        JsonOutput::print_observations(&outcome.observations).into_diagnostic()?;
    }
    Ok(())
}

fn run_inspect(args: InspectArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let service = QueryService::new(
        NopGeocoder,
        NopCatalog,
        NopTransfer,
        granule_reader(),
        QueryCache::new(config.cache_dir.clone()),
        ServiceSettings::from(config),
    );
    let summary = service.inspect(&args.file, GeoPoint::new(args.lat, args.lon))?;
    JsonOutput::print_summary(&summary).into_diagnostic()
}

fn run_serve(args: ServeArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let listen = args.listen.unwrap_or_else(|| config.listen.clone());
    let service = Arc::new(Mutex::new(build_service(config)?));
    let app = server::router(Arc::clone(&service), &config.allowed_origins)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    runtime.block_on(server::serve(&listen, app))?;
    drop(runtime);
    drop(service);
    Ok(())
}

fn run_cache(args: CacheArgs, config: &ResolvedConfig) -> miette::Result<()> {
    let cache = QueryCache::new(config.cache_dir.clone());
    match args.command {
        CacheCommand::List => {
            let entries = cache.entries()?;
            JsonOutput::print_cache_entries(&entries).into_diagnostic()
        }
        CacheCommand::Clear => {
            let removed = cache.clear()?;
            JsonOutput::print_clear(&ClearResult {
                removed,
                path: cache.root().to_string(),
            })
            .into_diagnostic()
        }
    }
}

type LiveService = QueryService<NominatimGeocoder, CmrCatalog, EarthdataTransfer, Reader>;

fn build_service(config: &ResolvedConfig) -> Result<LiveService, TempoError> {
    let session = EarthdataSession::deferred(Credentials::from_env);
    let geocoder = NominatimGeocoder::new(&config.geocoder_url, &config.user_agent)?;
    let catalog = CmrCatalog::new(
        &config.catalog_url,
        &config.user_agent,
        Some(Arc::clone(&session)),
    )?;
    let transfer = EarthdataTransfer::new(&config.user_agent, session)?;
    Ok(QueryService::new(
        geocoder,
        catalog,
        transfer,
        granule_reader(),
        QueryCache::new(config.cache_dir.clone()),
        ServiceSettings::from(config),
    ))
}

#[cfg(feature = "netcdf")]
type Reader = tempo_no2::granule::NetcdfGranuleReader;

#[cfg(not(feature = "netcdf"))]
type Reader = NoNetcdfReader;

fn granule_reader() -> Reader {
    Reader::default()
}

#[cfg(not(feature = "netcdf"))]
#[derive(Clone, Copy, Default)]
struct NoNetcdfReader;

#[cfg(not(feature = "netcdf"))]
impl GranuleReader for NoNetcdfReader {
    fn read(
        &self,
        path: &std::path::Path,
    ) -> Result<tempo_no2::granule::GranuleData, TempoError> {
        Err(TempoError::GranuleRead {
            granule: tempo_no2::granule::granule_name(path),
            message: "tempo-no2 was built without the `netcdf` feature".to_string(),
        })
    }
}

struct NopGeocoder;
struct NopCatalog;
struct NopTransfer;

impl Geocoder for NopGeocoder {
    fn locate(&self, _place: &str) -> Result<Option<GeoPoint>, TempoError> {
        Err(TempoError::GeocoderHttp(
            "geocoder not configured".to_string(),
        ))
    }
}

impl GranuleCatalog for NopCatalog {
    fn search(&self, _request: &GranuleSearch<'_>) -> SearchOutcome {
        SearchOutcome::LookupFailed {
            reason: "catalog not configured".to_string(),
        }
    }
}

impl GranuleTransfer for NopTransfer {
    fn fetch(
        &self,
        _granules: &[GranuleHandle],
        _destination: &camino::Utf8Path,
    ) -> Result<Vec<PathBuf>, TempoError> {
        Err(TempoError::TransferHttp(
            "transfer not configured".to_string(),
        ))
    }
}
