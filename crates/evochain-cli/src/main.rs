use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use evochain_api::{EvolutionApi, PageQuery};
use evochain_client::{ClientConfig, DatasetPageSource, Feed, FeedPhase, PageSource};
use evochain_core::{ChainFilter, PageSize};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";

#[derive(Debug, Parser)]
#[command(name = "evochain")]
#[command(about = "Inspect and page through an evolution chain dataset")]
struct Cli {
    #[arg(long, default_value = "./evolutions.json")]
    dataset: PathBuf,

    #[arg(long, default_value_t = PageSize::default())]
    page_size: PageSize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Dataset {
        #[command(subcommand)]
        command: DatasetCommand,
    },
    /// Answer a single page query, parsing parameters exactly like the HTTP endpoint.
    Page(PageArgs),
    /// Drive the infinite-scroll feed until it runs out of data.
    Browse(BrowseArgs),
}

#[derive(Debug, Subcommand)]
enum DatasetCommand {
    Info(DatasetInfoArgs),
    Filters,
}

#[derive(Debug, Args)]
struct DatasetInfoArgs {
    /// Fail unless the dataset hashes to this `sha256:` version.
    #[arg(long)]
    expect_version: Option<String>,
}

#[derive(Debug, Args)]
struct PageArgs {
    #[arg(long = "generation-id", allow_hyphen_values = true)]
    generation_id: Option<String>,
    #[arg(long = "type")]
    type_name: Option<String>,
    #[arg(long, allow_hyphen_values = true)]
    page: Option<String>,
}

#[derive(Debug, Args)]
struct BrowseArgs {
    #[arg(long = "generation-id")]
    generation_id: Option<u32>,
    #[arg(long = "type")]
    type_name: Option<String>,
    #[arg(long, default_value_t = 100)]
    max_pages: u32,
    /// Fetch pages from a running service instead of the local dataset. The service's page
    /// size takes precedence over `--page-size`.
    #[arg(long)]
    base_url: Option<String>,
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Command::Dataset { command } => run_dataset(&cli.dataset, cli.page_size, command),
        Command::Page(args) => {
            let api = EvolutionApi::open(&cli.dataset, cli.page_size, None)?;
            run_page(&api, args)
        }
        Command::Browse(args) => run_browse(&cli.dataset, cli.page_size, args),
    }
}

fn run_dataset(dataset: &Path, page_size: PageSize, command: DatasetCommand) -> Result<()> {
    match command {
        DatasetCommand::Info(args) => {
            let api = EvolutionApi::open(dataset, page_size, args.expect_version.as_deref())?;
            emit_json(serde_json::to_value(api.summary())?)
        }
        DatasetCommand::Filters => {
            let api = EvolutionApi::open(dataset, page_size, None)?;
            emit_json(serde_json::to_value(api.catalog())?)
        }
    }
}

fn run_page(api: &EvolutionApi, args: PageArgs) -> Result<()> {
    let query =
        PageQuery { generation_id: args.generation_id, type_name: args.type_name, page: args.page };
    let chains = api.query_page(&query);
    emit_json(serde_json::json!({
        "dataset_version": api.dataset_info().version,
        "filter": query.filter(),
        "page": query.page_index(),
        "page_size": api.page_size(),
        "count": chains.len(),
        "full": api.page_size().is_full(chains.len()),
        "chains": chains,
    }))
}

fn run_browse(dataset: &Path, page_size: PageSize, args: BrowseArgs) -> Result<()> {
    if args.max_pages == 0 {
        return Err(anyhow!("--max-pages MUST be >= 1"));
    }
    let filter = ChainFilter::new(args.generation_id, args.type_name.clone());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;

    let timeout_ms = args.timeout_ms.map(|value| value.to_string());
    let mut config =
        ClientConfig::from_env().with_overrides(args.base_url.as_deref(), timeout_ms.as_deref());
    config.page_size = page_size;

    let remote = args.base_url.is_some();
    let report = if remote {
        runtime.block_on(async {
            let feed = Feed::connect(&config)
                .await
                .context("failed to connect to the evolution service")?;
            tracing::info!(
                base_url = %config.base_url,
                page_size = %feed.state().page_size(),
                %filter,
                "browsing remote feed"
            );
            browse(feed, &config, filter, args.max_pages).await
        })
    } else {
        let api = EvolutionApi::open(dataset, page_size, None)?;
        tracing::info!(%filter, "browsing local dataset");
        let feed = Feed::new(DatasetPageSource::new(api), page_size, config.timeout);
        runtime.block_on(browse(feed, &config, filter, args.max_pages))
    }?;
    emit_json(report)
}

async fn browse<S: PageSource>(
    mut feed: Feed<S>,
    config: &ClientConfig,
    filter: ChainFilter,
    max_pages: u32,
) -> Result<Value> {
    feed.set_filter(filter);
    let phase = feed.load_until_exhausted(max_pages).await;
    if phase == FeedPhase::Failed {
        tracing::warn!(cursor = feed.state().cursor(), "feed stopped on a failed page");
    }

    let state = feed.state();
    Ok(serde_json::json!({
        "filter": state.filter(),
        "phase": phase,
        "page_size": state.page_size(),
        "cursor": state.cursor(),
        "pages": state.cursor() + 1,
        "chain_count": state.loaded_chains().count(),
        "timeout_ms": u64::try_from(config.timeout.as_millis()).unwrap_or(u64::MAX),
        "items": feed.render(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test IDs: TCLI-001
    #[test]
    fn contract_version_is_stamped_on_objects_and_wrapped_otherwise() {
        let stamped = with_contract_version(serde_json::json!({ "count": 1 }));
        assert_eq!(stamped.get("contract_version"), Some(&Value::from(CLI_CONTRACT_VERSION)));

        let wrapped = with_contract_version(serde_json::json!([1, 2]));
        assert_eq!(wrapped.get("payload"), Some(&serde_json::json!([1, 2])));
    }

    // Test IDs: TCLI-002
    #[test]
    fn cli_parses_page_arguments_verbatim() {
        let cli = match Cli::try_parse_from([
            "evochain",
            "--page-size",
            "10",
            "page",
            "--generation-id",
            "-4",
            "--page",
            "abc",
        ]) {
            Ok(cli) => cli,
            Err(err) => panic!("failed to parse arguments: {err}"),
        };
        assert_eq!(cli.page_size.get(), 10);
        match cli.command {
            Command::Page(args) => {
                assert_eq!(args.generation_id.as_deref(), Some("-4"));
                assert_eq!(args.page.as_deref(), Some("abc"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    // Test IDs: TCLI-003
    #[test]
    fn zero_page_size_is_rejected_at_parse_time() {
        let parsed = Cli::try_parse_from(["evochain", "--page-size", "0", "dataset", "filters"]);
        assert!(parsed.is_err());
    }
}
