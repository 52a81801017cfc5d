//! GridLens CLI
//!
//! Command-line front end for the query engine:
//! - Run queries and print tables, JSON or CSV
//! - Inspect resolution plans
//! - Look up catalog entries and list views
//! - Generate or show configuration

use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use gridlens::catalog::{EntityCatalog, UNKNOWN};
use gridlens::config::{generate_default_config, Config};
use gridlens::query::{format_timestamp, TabularResult};
use gridlens::{
    Domain, EngineContext, EntityFilter, QueryDescriptor, ResolutionPlan, ResolutionTier,
    TimeRange,
};
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "gridlens")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-resolution query engine for electricity market data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: search the usual locations)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(clap::Args)]
struct RangeArgs {
    /// Relative range ending now (e.g. 90m, 12h, 7d, 4w)
    #[arg(short, long, conflicts_with_all = ["start", "end"])]
    last: Option<String>,

    /// Range start: RFC 3339, YYYY-MM-DD or Unix milliseconds
    #[arg(long, requires = "end")]
    start: Option<String>,

    /// Range end (exclusive)
    #[arg(long, requires = "start")]
    end: Option<String>,
}

#[derive(clap::Args)]
struct QueryArgs {
    /// Domain: generation, price, transmission or rooftop
    domain: String,

    /// View name (default: the domain's default view)
    #[arg(short, long)]
    view: Option<String>,

    #[command(flatten)]
    range: RangeArgs,

    /// Restrict to entity ids
    #[arg(short, long, conflicts_with = "region")]
    entity: Vec<String>,

    /// Restrict to a region
    #[arg(short, long)]
    region: Option<String>,

    /// Read exactly this tier: fine, coarse or daily
    #[arg(short, long)]
    tier: Option<String>,

    /// Fail unless the whole range can be served
    #[arg(long)]
    require_complete: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query
    Query(QueryArgs),

    /// Show how a query would be served without reading values
    Plan(QueryArgs),

    /// Look up entities in the catalog
    Lookup {
        /// Entity ids
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// List views and the tiers they can run at
    Views,

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a documented default config
    Init {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::load_default(),
    };
    init_logging(&config);

    match cli.command {
        Commands::Query(args) => {
            let ctx = Arc::new(EngineContext::from_config(&config)?);
            let descriptor = build_descriptor(&args)?;
            let manager = ctx.query_manager(descriptor.domain);
            let result = manager.query(&descriptor).await?;
            print_result(&result, cli.format)?;
        }

        Commands::Plan(args) => {
            let ctx = Arc::new(EngineContext::from_config(&config)?);
            let descriptor = build_descriptor(&args)?;
            let plan = ctx.query_manager(descriptor.domain).plan_only(&descriptor).await?;
            print_plan(&plan, cli.format)?;
        }

        Commands::Lookup { ids } => {
            let catalog = match &config.catalog.path {
                Some(path) => EntityCatalog::load(path)?,
                None => bail!("no catalog configured (set [catalog] path or GRIDLENS_CATALOG)"),
            };
            let infos: Vec<_> = ids.iter().map(|id| catalog.lookup(id)).collect();
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&infos)?),
                _ => {
                    println!("{:<12} | {:<28} | {:<12} | {:<6} | {:>8}", "Entity", "Station", "Fuel", "Region", "MW");
                    println!("{}", "-".repeat(78));
                    for info in infos {
                        let capacity = info
                            .capacity_mw
                            .map(|c| format!("{:.0}", c))
                            .unwrap_or_else(|| UNKNOWN.to_string());
                        println!(
                            "{:<12} | {:<28} | {:<12} | {:<6} | {:>8}",
                            info.entity_id, info.station, info.fuel_type, info.region, capacity
                        );
                    }
                }
            }
        }

        Commands::Views => {
            let layout = config.storage.layout()?;
            let registry = gridlens::ViewRegistry::with_builtin(layout);
            for view in registry.views() {
                let tiers: Vec<String> = registry
                    .executable_tiers(&view.name)?
                    .iter()
                    .map(|t| t.to_string())
                    .collect();
                println!("{:<26} {:<13} [{}]", view.name, view.domain.to_string(), tiers.join(", "));
                if !view.description.is_empty() {
                    println!("    {}", view.description);
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { output } => {
                let template = generate_default_config();
                match output {
                    Some(path) => {
                        std::fs::write(&path, template)
                            .with_context(|| format!("writing {}", path.display()))?;
                        println!("Wrote {}", path.display());
                    }
                    None => print!("{}", template),
                }
            }
            ConfigAction::Show => match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
                _ => print!("{}", toml::to_string_pretty(&config)?),
            },
        },
    }

    Ok(())
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gridlens={}", config.logging.level)));
    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so query output on stdout stays clean
    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_descriptor(args: &QueryArgs) -> Result<QueryDescriptor> {
    let domain = Domain::parse(&args.domain).ok_or_else(|| anyhow!("unknown domain '{}'", args.domain))?;

    let mut builder = QueryDescriptor::builder(domain).range(parse_range(&args.range)?);
    if let Some(view) = &args.view {
        builder = builder.view(view.clone());
    }
    if let Some(region) = &args.region {
        builder = builder.filter(EntityFilter::region(region));
    } else if !args.entity.is_empty() {
        builder = builder.filter(EntityFilter::entities(&args.entity));
    }
    if let Some(tier) = &args.tier {
        let tier = ResolutionTier::parse(tier).ok_or_else(|| anyhow!("unknown tier '{}'", tier))?;
        builder = builder.tier(tier);
    }
    if args.require_complete {
        builder = builder.require_complete();
    }
    Ok(builder.build()?)
}

fn parse_range(args: &RangeArgs) -> Result<TimeRange> {
    match (&args.last, &args.start, &args.end) {
        (Some(last), _, _) => {
            let millis = parse_last(last)?;
            let end = Utc::now().timestamp_millis();
            Ok(TimeRange {
                start: end - millis,
                end,
            })
        }
        (None, Some(start), Some(end)) => {
            let (start, end) = (parse_time(start)?, parse_time(end)?);
            TimeRange::try_new(start, end).ok_or_else(|| anyhow!("end precedes start"))
        }
        _ => parse_range(&RangeArgs {
            last: Some("1d".to_string()),
            start: None,
            end: None,
        }),
    }
}

/// Relative span such as `90m`, `12h`, `7d` or `4w`, in milliseconds
fn parse_last(s: &str) -> Result<i64> {
    let re = Regex::new(r"^(\d+)\s*([mhdw])$")?;
    let caps = re
        .captures(s.trim())
        .ok_or_else(|| anyhow!("invalid range '{}', use e.g. 90m, 12h, 7d, 4w", s))?;

    let n: i64 = caps[1].parse()?;
    let unit = match &caps[2] {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => 7 * 86_400_000,
    };
    Ok(n * unit)
}

/// RFC 3339, `YYYY-MM-DD` (UTC midnight) or Unix milliseconds
fn parse_time(s: &str) -> Result<i64> {
    let s = s.trim();
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("invalid time '{}'", s))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("invalid date '{}'", s))?;
    Ok(Utc.from_utc_datetime(&midnight).timestamp_millis())
}

fn print_result(result: &TabularResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => print!("{}", result.to_csv()?),
        OutputFormat::Table => {
            if result.is_empty() {
                println!("No data for the selected time range");
            } else {
                print_table(result);
            }
            println!(
                "\n{} rows, coverage {:.1}%{}",
                result.len(),
                result.coverage.ratio * 100.0,
                if result.coverage.is_degraded() {
                    " (degraded)".to_string()
                } else if result.coverage.is_complete() {
                    String::new()
                } else {
                    format!(" ({} periods missing)", result.coverage.missing_periods())
                }
            );
        }
    }
    Ok(())
}

fn print_table(result: &TabularResult) {
    let header: Vec<&str> = result.columns.iter().map(|c| c.name.as_str()).collect();
    let mut lines: Vec<Vec<String>> = Vec::with_capacity(result.len());
    for row in &result.rows {
        let mut line = vec![format_timestamp(row.timestamp), row.tier.to_string()];
        line.extend(row.dimensions.iter().cloned());
        line.extend(row.measures.iter().map(|m| format!("{:.2}", m)));
        lines.push(line);
    }

    let widths: Vec<usize> = header
        .iter()
        .enumerate()
        .map(|(i, h)| {
            lines
                .iter()
                .filter_map(|l| l.get(i))
                .map(String::len)
                .chain(std::iter::once(h.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let render = |cells: Vec<&str>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<w$}", c, w = *w))
            .collect::<Vec<_>>()
            .join(" | ")
    };

    println!("{}", render(header));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1)));
    for line in &lines {
        println!("{}", render(line.iter().map(String::as_str).collect()));
    }
}

fn print_plan(plan: &ResolutionPlan, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(plan)?),
        _ => {
            println!("Primary tier: {}", plan.primary_tier);
            for segment in &plan.segments {
                println!(
                    "  {} .. {}  {}",
                    format_timestamp(segment.range.start),
                    format_timestamp(segment.range.end),
                    segment.source
                );
            }
        }
    }
    Ok(())
}
