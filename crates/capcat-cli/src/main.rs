mod bundle_store;
mod exit_codes;

use std::path::PathBuf;
use std::sync::Arc;

use capcat_content::DefaultContentFetcher;
use capcat_core::{BatchProcessor, BatchRequest, Config, Runtime, SourceRegistry};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use bundle_store::BundleStore;

#[derive(Parser)]
#[command(name = "capcat", about = "Personal news-archival engine", version)]
struct Cli {
    /// Path to a capcat.toml config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of declarative source descriptor TOML files.
    #[arg(long, global = true, default_value = "sources")]
    sources_dir: PathBuf,

    /// Path to the bundle store file.
    #[arg(long, global = true, default_value = "bundles.toml")]
    bundles_file: PathBuf,

    /// Suppress progress output.
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Verbose (debug-level) logging.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the latest articles from one or more named sources.
    Fetch {
        /// Source IDs to fetch. Omit if --bundle is given.
        sources: Vec<String>,
        /// Fetch all sources registered in a named bundle instead.
        #[arg(long)]
        bundle: Option<String>,
        /// Number of articles to request per source.
        #[arg(long)]
        count: Option<u32>,
        /// Re-run discovery/fetch for today's archive, updating existing entries.
        #[arg(long)]
        update: bool,
        /// Emit the run summary as JSON instead of tab-separated text.
        #[arg(long)]
        json: bool,
    },
    /// Archive a single article by URL, outside the batch pipeline.
    Single {
        url: String,
        /// Title to use if it can't be inferred; defaults to "Untitled Article".
        #[arg(long)]
        title: Option<String>,
    },
    /// Manage named bundles of sources.
    Bundle {
        #[command(subcommand)]
        action: BundleAction,
    },
    /// List sources currently registered from --sources-dir.
    Sources,
}

#[derive(Subcommand)]
enum BundleAction {
    List,
    Show { name: String },
    Set {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value_t = 5)]
        default_count: u32,
        #[arg(long, value_delimiter = ',')]
        sources: Vec<String>,
    },
    Remove { name: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    std::process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    match &cli.command {
        Command::Bundle { action } => run_bundle_action(&cli.bundles_file, action),
        Command::Sources => run_sources(&cli.sources_dir),
        Command::Fetch { sources, bundle, count, update, json } => {
            run_fetch(&cli, sources.clone(), bundle.clone(), *count, *update, *json).await
        }
        Command::Single { url, title } => run_single(&cli, url, title.clone()).await,
    }
}

fn build_registry(sources_dir: &PathBuf) -> SourceRegistry {
    let mut registry = SourceRegistry::new(Some(sources_dir.clone()));
    if let Err(e) = registry.reload() {
        error!(error = %e, dir = %sources_dir.display(), "failed to scan sources directory");
    }
    registry
}

fn run_sources(sources_dir: &PathBuf) -> i32 {
    let registry = build_registry(sources_dir);
    for descriptor in registry.all() {
        println!("{}\t{}\t{}", descriptor.source_id, descriptor.display_name, descriptor.category);
    }
    exit_codes::OK
}

fn run_bundle_action(bundles_file: &PathBuf, action: &BundleAction) -> i32 {
    let mut store = match BundleStore::load(bundles_file) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to load bundle store");
            return exit_codes::DATA_ERR;
        }
    };

    match action {
        BundleAction::List => {
            for bundle in store.list() {
                println!("{}\t{}\t{} sources", bundle.name, bundle.description, bundle.sources.len());
            }
            exit_codes::OK
        }
        BundleAction::Show { name } => match store.get(name) {
            Some(bundle) => {
                println!("{}: {}", bundle.name, bundle.description);
                for source in &bundle.sources {
                    println!("  {source}");
                }
                exit_codes::OK
            }
            None => {
                error!(name, "no such bundle");
                exit_codes::USAGE
            }
        },
        BundleAction::Set { name, description, default_count, sources } => {
            match store.upsert(name, description.clone(), *default_count, sources.clone()) {
                Ok(()) => exit_codes::OK,
                Err(e) => {
                    error!(error = %e, "failed to save bundle");
                    exit_codes::SOFTWARE
                }
            }
        }
        BundleAction::Remove { name } => match store.remove(name) {
            Ok(true) => exit_codes::OK,
            Ok(false) => {
                error!(name, "no such bundle");
                exit_codes::USAGE
            }
            Err(e) => {
                error!(error = %e, "failed to remove bundle");
                exit_codes::SOFTWARE
            }
        },
    }
}

async fn build_runtime(cli: &Cli) -> Result<Arc<Runtime>, i32> {
    let config = match Config::resolve(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return Err(exit_codes::for_error(&e));
        }
    };

    let registry = build_registry(&cli.sources_dir);
    let content_fetcher = Box::new(DefaultContentFetcher::new(reqwest::Client::new()));
    let mut runtime = Runtime::new(config, registry, content_fetcher);
    runtime.specialized_handlers.register(Box::new(capcat_content::VideoSocialPlaceholder::youtube()));
    runtime.specialized_handlers.register(Box::new(capcat_content::VideoSocialPlaceholder::twitter()));
    runtime.specialized_handlers.register(Box::new(capcat_content::VideoSocialPlaceholder::tiktok()));
    Ok(Arc::new(runtime))
}

async fn run_fetch(
    cli: &Cli,
    mut sources: Vec<String>,
    bundle: Option<String>,
    count: Option<u32>,
    update: bool,
    json: bool,
) -> i32 {
    let runtime = match build_runtime(cli).await {
        Ok(r) => r,
        Err(code) => return code,
    };

    let count_per_source = count.unwrap_or(runtime.config.default_count);

    if let Some(bundle_name) = &bundle {
        let mut store = match BundleStore::load(&cli.bundles_file) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to load bundle store");
                return exit_codes::DATA_ERR;
            }
        };
        match store.get(bundle_name) {
            Some(b) => sources.extend(b.sources),
            None => {
                error!(bundle = %bundle_name, "no such bundle");
                return exit_codes::USAGE;
            }
        }
    }

    if sources.is_empty() {
        error!("no sources given: pass source IDs or --bundle");
        return exit_codes::USAGE;
    }

    let request = BatchRequest {
        source_ids: sources,
        count_per_source,
        output_root: runtime.config.output_dir.clone(),
        download_media: true,
        update_mode: update,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let processor = BatchProcessor::new(runtime);
    let today = chrono::Utc::now().date_naive();

    let progress: Option<capcat_core::batch::ProgressCallback> = if cli.quiet {
        None
    } else {
        Some(Arc::new(|p: f64, stage: &str| {
            info!(progress = format!("{:.0}%", p * 100.0), stage, "fetch progress");
        }))
    };

    let summary = processor.run(request, today, progress).await;

    if json {
        match serde_json::to_string_pretty(&summary) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                error!(error = %e, "failed to serialize run summary");
                return exit_codes::SOFTWARE;
            }
        }
        return exit_codes::OK;
    }

    for (source_id, stats) in &summary.per_source {
        println!(
            "{source_id}\tdiscovered={}\tfetched={}\tfailed={}\tskipped={}\tsuccess_rate={:.1}%",
            stats.discovered,
            stats.fetched,
            stats.failed,
            stats.skipped,
            summary.success_rate(source_id)
        );
    }
    if !summary.skip_records.is_empty() {
        println!("skipped sources:");
        for record in &summary.skip_records {
            println!(
                "  {}\t{}\t{}\tattempts={}",
                record.source_id, record.error_kind, record.reason, record.attempts
            );
        }
    }
    println!("duplicates elided: {}", summary.duplicates_elided);

    exit_codes::OK
}

async fn run_single(cli: &Cli, url: &str, title: Option<String>) -> i32 {
    let runtime = match build_runtime(cli).await {
        Ok(r) => r,
        Err(code) => return code,
    };

    let article = capcat_core::Article::new(title.unwrap_or_else(|| "Untitled Article".to_string()), url.to_string());
    let today = chrono::Utc::now().date_naive();
    let out_dir = capcat_core::OutputLayout::single_article_dir(
        &runtime.config.output_dir,
        &article.title,
        today,
        runtime.config.max_filename_length,
    );

    let state = capcat_core::UpdateController::classify(&[out_dir.join("article.md")]);
    let choice = capcat_core::UpdateController::decide(&capcat_core::update::AutoUpdate, state);
    if matches!(choice, capcat_core::update::UpdateChoice::Cancel) {
        info!("cancelled");
        return exit_codes::OK;
    }

    match runtime.content_fetcher.fetch_article(&article, &out_dir).await {
        Ok((true, path)) => {
            println!("wrote {}", path.display());
            exit_codes::OK
        }
        Ok((false, _)) => {
            error!(url, "article fetch reported failure");
            exit_codes::TEMP_FAIL
        }
        Err(e) => {
            error!(url, error = %e, "article fetch failed");
            exit_codes::for_error(&e)
        }
    }
}
