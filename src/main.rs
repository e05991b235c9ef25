use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cultural_vista::aggregate::{aggregate, Metric};
use cultural_vista::config::AppConfig;
use cultural_vista::data::{DatasetCache, MirrorWarehouse};
use cultural_vista::export::to_csv_bytes;
use cultural_vista::filter::{options, select, FilterState};
use cultural_vista::map::{assemble, to_geojson, MarkerFields};
use cultural_vista::pages::{self, PageContext, PageParams};
use cultural_vista::server;
use cultural_vista::types::Dataset;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the dashboard API
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
    /// Rank the groups of a dataset by a summed column or by record count
    Aggregate {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long)]
        dataset: String,
        #[arg(short, long)]
        group_by: String,
        /// Column to sum; omit (or pass "count") to count records
        #[arg(short, long)]
        metric: Option<String>,
        /// Groups to keep, at least 1 (default: aggregation.top_n)
        #[arg(short, long, value_parser = parse_top)]
        top: Option<usize>,
        #[arg(short, long = "filter", value_name = "DIM=VALUE", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },
    /// Print the map view of the filtered records
    Map {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long)]
        dataset: String,
        #[arg(short, long = "filter", value_name = "DIM=VALUE", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        /// Emit a GeoJSON feature collection instead
        #[arg(long)]
        geojson: bool,
    },
    /// List the selectable values of a column
    Options {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long)]
        dataset: String,
        #[arg(long)]
        column: String,
        /// Leading "no restriction" option, e.g. "All"
        #[arg(long)]
        sentinel: Option<String>,
    },
    /// Write the filtered records as CSV
    Export {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(short, long)]
        dataset: String,
        #[arg(short, long = "filter", value_name = "DIM=VALUE", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        #[arg(short, long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Render one dashboard page as JSON
    Page {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(value_parser = pages::PAGES)]
        name: String,
        #[arg(short, long = "param", value_name = "NAME=VALUE", value_parser = parse_key_value)]
        params: Vec<(String, String)>,
    },
}

fn parse_top(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("expected a positive whole number, got '{raw}'")),
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("missing name in '{raw}'"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

fn new_cache(config: &AppConfig) -> DatasetCache {
    match config.warehouse.as_ref().and_then(MirrorWarehouse::from_config) {
        Some(mirror) => DatasetCache::with_warehouse(Arc::new(mirror)),
        None => DatasetCache::new(),
    }
}

fn load(config: &AppConfig, cache: &mut DatasetCache, dataset: &str) -> Result<Arc<Dataset>> {
    let key = config.source_key(dataset)?;
    cache
        .get(&key)
        .with_context(|| format!("Failed to load dataset '{dataset}'"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(path: &Path) -> Result<AppConfig> {
    let config = AppConfig::load_from_file(path)?;
    info!(config = %path.display(), datasets = config.datasets.len(), "configuration loaded");
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let app_config = load_config(&config)?;
            server::start_server(app_config).await?;
        }
        Commands::Aggregate {
            config,
            dataset,
            group_by,
            metric,
            top,
            filters,
        } => {
            let app_config = load_config(&config)?;
            let mut cache = new_cache(&app_config);
            let data = load(&app_config, &mut cache, &dataset)?;
            let filter = FilterState::from_pairs(filters, &app_config.aggregation.sentinels());
            let result = aggregate(
                &data,
                &select(&data, &filter),
                &group_by,
                &Metric::from_option(metric.as_deref()),
                top.unwrap_or(app_config.aggregation.top_n),
            )?;
            print_json(&result)?;
        }
        Commands::Map {
            config,
            dataset,
            filters,
            geojson,
        } => {
            let app_config = load_config(&config)?;
            let mut cache = new_cache(&app_config);
            let data = load(&app_config, &mut cache, &dataset)?;
            let filter = FilterState::from_pairs(filters, &app_config.aggregation.sentinels());
            let fields = MarkerFields::infer(data.schema())?;
            let view = assemble(&data, &select(&data, &filter), &filter, &fields, &app_config.map)?;
            if geojson {
                print_json(&to_geojson(&view))?;
            } else {
                print_json(&view)?;
            }
        }
        Commands::Options {
            config,
            dataset,
            column,
            sentinel,
        } => {
            let app_config = load_config(&config)?;
            let mut cache = new_cache(&app_config);
            let data = load(&app_config, &mut cache, &dataset)?;
            print_json(&options(&data, &column, sentinel.as_deref())?)?;
        }
        Commands::Export {
            config,
            dataset,
            filters,
            out,
        } => {
            let app_config = load_config(&config)?;
            let mut cache = new_cache(&app_config);
            let data = load(&app_config, &mut cache, &dataset)?;
            let filter = FilterState::from_pairs(filters, &app_config.aggregation.sentinels());
            let records = select(&data, &filter);
            let bytes = to_csv_bytes(&data, &records, None)?;
            fs::write(&out, bytes)
                .with_context(|| format!("Failed to write export: {:?}", out))?;
            info!(rows = records.len(), out = %out.display(), "export written");
        }
        Commands::Page {
            config,
            name,
            params,
        } => {
            let app_config = load_config(&config)?;
            let mut cache = new_cache(&app_config);
            let mut ctx = PageContext::new(&mut cache, &app_config);
            let page = pages::render(&mut ctx, &name, &PageParams::from_pairs(params))?;
            print_json(&page)?;
        }
    }

    Ok(())
}
