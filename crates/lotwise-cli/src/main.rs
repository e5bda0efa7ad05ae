mod display;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use lotwise_ai::{PredictionRouter, RoutingCounters};
use lotwise_core::features::UNIFIED_SCHEMA;
use lotwise_core::{
    CoreError, EngineConfig, Enrichments, FreshnessIndex, Isbn13, ItemRecord, PriceEstimate,
    export,
};
use lotwise_lots::{
    AggregateOptions, BundlingEngine, LotComp, LotCompSource, LotListing, LotMember,
    LotSizeInference, LotStrategy, NoComps, ScopedListings, StaticCompSource, aggregate,
    looks_like_lot, plan_lots,
};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Price used books and plan multi-book lots.
#[derive(Parser, Debug)]
#[command(name = "lotwise", version)]
struct Cli {
    /// Engine configuration (TOML).
    #[arg(long, global = true, env = "LOTWISE_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON instead of text.
    #[arg(long, global = true)]
    json: bool,

    /// Judge freshness as of this RFC 3339 instant instead of now.
    #[arg(long, global = true)]
    as_of: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Estimate one book from a JSON file holding `item` and `enrichments`.
    Predict { input: PathBuf },

    /// Estimate every book in a JSONL file.
    Batch {
        input: PathBuf,
        /// Write estimates as an Arrow IPC file.
        #[arg(long)]
        export: Option<PathBuf>,
        /// Write unified feature vectors as an Arrow IPC file.
        #[arg(long)]
        features: Option<PathBuf>,
    },

    /// Show how fresh each input of one book is.
    Freshness { input: PathBuf },

    /// Infer lot sizes from listing titles.
    LotSize {
        #[arg(required = true)]
        titles: Vec<String>,
    },

    /// Per-book price by lot size from a JSON array of listings.
    LotPricing { listings: PathBuf },

    /// Price a set of books as one lot.
    Suggest {
        /// JSON array of books (`item` + `enrichments`).
        members: PathBuf,
        #[arg(long, default_value = "series")]
        strategy: LotStrategy,
        /// JSON array of `{strategy, label, listings}`.
        #[arg(long)]
        comps: Option<PathBuf>,
    },

    /// Propose lots for a shelf of books.
    Plan {
        books: PathBuf,
        #[arg(long, value_delimiter = ',', default_value = "series,author,value")]
        strategies: Vec<LotStrategy>,
        #[arg(long)]
        comps: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let now = cli.as_of.unwrap_or_else(Utc::now);

    match cli.command {
        Command::Predict { ref input } => cmd_predict(&cli, &config, input, now),
        Command::Batch {
            ref input,
            ref export,
            ref features,
        } => cmd_batch(&cli, &config, input, export.as_deref(), features.as_deref(), now),
        Command::Freshness { ref input } => cmd_freshness(&cli, &config, input, now),
        Command::LotSize { ref titles } => cmd_lot_size(&cli, &config, titles),
        Command::LotPricing { ref listings } => cmd_lot_pricing(&cli, &config, listings),
        Command::Suggest {
            ref members,
            strategy,
            ref comps,
        } => cmd_suggest(&cli, &config, members, strategy, comps.as_deref(), now),
        Command::Plan {
            ref books,
            ref strategies,
            ref comps,
        } => cmd_plan(&cli, &config, books, strategies, comps.as_deref(), now),
    }
}

// ── Commands ──

fn cmd_predict(
    cli: &Cli,
    config: &EngineConfig,
    input: &Path,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let member: LotMember = read_json(input)?;
    let router = PredictionRouter::from_config(config, Arc::new(RoutingCounters::new()));
    let estimate = router
        .predict_at(&member.item, &member.enrichments, now)
        .with_context(|| format!("pricing {}", member.isbn()))?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&estimate)?);
    } else {
        display::print_estimate_card(member.isbn(), &estimate);
    }
    Ok(())
}

fn cmd_batch(
    cli: &Cli,
    config: &EngineConfig,
    input: &Path,
    export_path: Option<&Path>,
    features_path: Option<&Path>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let members: Vec<LotMember> = read_jsonl(input)?;
    let counters = Arc::new(RoutingCounters::new());
    let router = PredictionRouter::from_config(config, counters.clone());

    let pairs: Vec<_> = members
        .into_iter()
        .map(|m| (m.item, m.enrichments))
        .collect();
    let results = router.predict_batch(&pairs, now);
    let rows = scored_rows(&pairs, results);
    info!(scored = rows.len(), total = pairs.len(), "batch scored");

    let batch = export::estimates_to_batch(&rows, now)?;
    if let Some(path) = export_path {
        write_ipc(path, &batch)?;
        info!(path = %path.display(), rows = batch.num_rows(), "estimates exported");
    }
    if let Some(path) = features_path {
        let schema = router.assembler().registry().unified()?;
        let mut vectors = Vec::with_capacity(pairs.len());
        for (item, enrichments) in &pairs {
            if item.validate().is_err() {
                continue;
            }
            let fv = router
                .assembler()
                .assemble(item, enrichments, UNIFIED_SCHEMA, now)
                .with_context(|| format!("assembling features for {}", item.isbn()))?;
            vectors.push((item.isbn().clone(), fv));
        }
        let features = export::features_to_batch(&schema, &vectors)?;
        write_ipc(path, &features)?;
        info!(path = %path.display(), rows = features.num_rows(), "features exported");
    }

    if cli.json {
        for (isbn, estimate) in &rows {
            println!(
                "{}",
                serde_json::json!({ "isbn": isbn, "estimate": estimate })
            );
        }
        eprintln!("{}", serde_json::to_string(&counters.snapshot())?);
    } else {
        arrow::util::pretty::print_batches(&[batch])?;
        println!();
        display::print_routing_stats(&counters.snapshot());
    }
    Ok(())
}

fn cmd_freshness(
    cli: &Cli,
    config: &EngineConfig,
    input: &Path,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let member: LotMember = read_json(input)?;
    let report = FreshnessIndex::new(&config.freshness).report(&member.item, &member.enrichments, now);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        display::print_freshness(member.isbn(), &report);
    }
    Ok(())
}

fn cmd_lot_size(cli: &Cli, config: &EngineConfig, titles: &[String]) -> anyhow::Result<()> {
    let inference = LotSizeInference::from_config(&config.lots);
    let rows: Vec<(&str, Option<u32>, bool)> = titles
        .iter()
        .map(|t| (t.as_str(), inference.infer(t), looks_like_lot(t)))
        .collect();

    if cli.json {
        let out: Vec<_> = rows
            .iter()
            .map(|(title, size, is_lot)| {
                serde_json::json!({ "title": title, "lot_size": size, "looks_like_lot": is_lot })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        display::print_lot_sizes(&rows);
    }
    Ok(())
}

fn cmd_lot_pricing(cli: &Cli, config: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    let listings: Vec<LotListing> = read_json(path)?;
    let inference = LotSizeInference::from_config(&config.lots);
    let comps: Vec<LotComp> = listings
        .iter()
        .map(|l| LotComp::from_listing(l, &inference))
        .collect();
    let table = aggregate(&comps, &AggregateOptions::from(&config.lots));

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&table)?);
    } else {
        display::print_pricing_table(&table);
    }
    Ok(())
}

fn cmd_suggest(
    cli: &Cli,
    config: &EngineConfig,
    members: &Path,
    strategy: LotStrategy,
    comps: Option<&Path>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let members: Vec<LotMember> = read_json(members)?;
    if members.is_empty() {
        bail!("no books to bundle");
    }
    let router = PredictionRouter::from_config(config, Arc::new(RoutingCounters::new()));
    let source = load_comps(comps)?;
    let engine = BundlingEngine::new(&router, source.as_ref(), config.lots.clone());
    let suggestion = engine.suggest(&members, strategy, now)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&suggestion)?);
    } else {
        display::print_suggestion(&suggestion);
    }
    Ok(())
}

fn cmd_plan(
    cli: &Cli,
    config: &EngineConfig,
    books: &Path,
    strategies: &[LotStrategy],
    comps: Option<&Path>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let books: Vec<LotMember> = read_json(books)?;
    let router = PredictionRouter::from_config(config, Arc::new(RoutingCounters::new()));
    let source = load_comps(comps)?;
    let engine = BundlingEngine::new(&router, source.as_ref(), config.lots.clone());
    let plan = plan_lots(&engine, &books, strategies, now)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else if plan.is_empty() {
        println!("No lots: no group of two or more books shares a series, author, or value band.");
    } else {
        for suggestion in &plan {
            display::print_suggestion(suggestion);
        }
    }
    Ok(())
}

// ── Input / output ──

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

/// One JSON value per non-blank line.
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut out = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(
            serde_json::from_str(&line)
                .with_context(|| format!("{}:{}: invalid record", path.display(), n + 1))?,
        );
    }
    Ok(out)
}

fn load_comps(path: Option<&Path>) -> anyhow::Result<Box<dyn LotCompSource>> {
    match path {
        Some(path) => {
            let scoped: Vec<ScopedListings> = read_json(path)?;
            let source: StaticCompSource = scoped.into_iter().collect();
            info!(listings = source.len(), "lot comps loaded");
            Ok(Box::new(source))
        }
        None => Ok(Box::new(NoComps)),
    }
}

/// Pair each scored item with its estimate, logging and dropping failures.
fn scored_rows(
    pairs: &[(ItemRecord, Enrichments)],
    results: Vec<Result<PriceEstimate, CoreError>>,
) -> Vec<(Isbn13, PriceEstimate)> {
    let mut rows = Vec::with_capacity(results.len());
    for ((item, _), result) in pairs.iter().zip(results) {
        match result {
            Ok(estimate) => rows.push((item.isbn().clone(), estimate)),
            Err(e) => warn!(isbn = %item.isbn(), error = %e, "skipping"),
        }
    }
    rows
}

fn write_ipc(path: &Path, batch: &arrow::record_batch::RecordBatch) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = arrow::ipc::writer::FileWriter::try_new(file, &batch.schema())?;
    writer.write(batch)?;
    writer.finish()?;
    Ok(())
}
