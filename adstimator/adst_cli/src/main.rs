use std::{
    fs::{self, File},
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
};

use adstimator_estimation::{
    ClassifierEvaluator, ClassifierRegistry, ClassifierSpec, Dataset, EstimationTelemetry,
    EvaluationConfig, Evaluator, PerformanceEvaluator, RecordRef, StrategyEvaluator,
    SuggestionPipeline, Value as Cell,
};
use anyhow::{Context, Result};
use chrono::{Datelike, Local, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Map, Value};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "adst", version, about = "Ad click-rate estimation and evaluation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scores classifiers by how often their estimates land within the tolerance.
    Evaluate(EvaluateArgs),
    /// Scores the "run the top N creatives" policy per classifier.
    Strategy(StrategyArgs),
    /// Estimates every untested content combination.
    Suggest(SuggestArgs),
    /// Sums clicks and impressions per value of one attribute.
    Aggregate(AggregateArgs),
    /// Times a classifier on a generated data set.
    Performance(PerformanceArgs),
}

#[derive(Args, Debug)]
struct LogArgs {
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[arg(long)]
    data: PathBuf,
    #[arg(long)]
    config: PathBuf,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args, Debug)]
struct StrategyArgs {
    #[arg(long)]
    data: PathBuf,
    #[arg(long)]
    config: PathBuf,
    /// Overrides the configured strategy depth.
    #[arg(long)]
    depth: Option<usize>,
    #[arg(long)]
    weighted: bool,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args, Debug)]
struct SuggestArgs {
    #[arg(long)]
    data: PathBuf,
    #[arg(long)]
    classifier: String,
    /// Classifier option, passed through verbatim. Repeat for each token.
    #[arg(long = "option", allow_hyphen_values = true)]
    options: Vec<String>,
    /// `KEY=VALUE` equality filter applied to the knowledge first.
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args, Debug)]
struct AggregateArgs {
    #[arg(long)]
    data: PathBuf,
    #[arg(long)]
    by: String,
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    #[command(flatten)]
    log: LogArgs,
}

#[derive(Args, Debug)]
struct PerformanceArgs {
    #[arg(long)]
    values: usize,
    #[arg(long)]
    occurrences: usize,
    #[arg(long)]
    classifier: String,
    #[arg(long = "option", allow_hyphen_values = true)]
    options: Vec<String>,
    #[command(flatten)]
    log: LogArgs,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Evaluate(args) => handle_evaluate(&args),
        Commands::Strategy(args) => handle_strategy(&args),
        Commands::Suggest(args) => handle_suggest(&args),
        Commands::Aggregate(args) => handle_aggregate(&args),
        Commands::Performance(args) => handle_performance(&args),
    }
}

fn handle_evaluate(args: &EvaluateArgs) -> Result<()> {
    let config = EvaluationConfig::load(&args.config)?;
    let run = RunContext::start(&args.log.log_dir, config.log_path.as_deref(), "evaluate")?;
    run.finish(|telemetry| {
        let data = read_dataset(&args.data)?;
        let registry = ClassifierRegistry::with_builtins();
        let mut evaluator = ClassifierEvaluator::from_config(&data, &registry, &config)?
            .with_telemetry(telemetry.clone());
        println!("{}", evaluator.description());
        print!("{}", evaluator.result()?);
        Ok(())
    })
}

fn handle_strategy(args: &StrategyArgs) -> Result<()> {
    let config = EvaluationConfig::load(&args.config)?;
    let run = RunContext::start(&args.log.log_dir, config.log_path.as_deref(), "strategy")?;
    run.finish(|telemetry| {
        let data = read_dataset(&args.data)?;
        let registry = ClassifierRegistry::with_builtins();
        let depth = args.depth.unwrap_or(config.strategy);
        let weighted = args.weighted || config.weighted;
        let mut evaluator = StrategyEvaluator::from_config(&data, &registry, &config)?
            .with_telemetry(telemetry.clone());
        for (label, averages) in evaluator.evaluate(depth, weighted)? {
            let columns: Vec<String> = averages
                .iter()
                .enumerate()
                .map(|(n, rate)| format!("top {}: {rate:.5}", n + 1))
                .collect();
            println!("{label}: {}", columns.join(", "));
        }
        Ok(())
    })
}

fn handle_suggest(args: &SuggestArgs) -> Result<()> {
    let run = RunContext::start(&args.log.log_dir, None, "suggest")?;
    run.finish(|telemetry| {
        let knowledge = read_dataset(&args.data)?.filter(&filter_pairs(&args.filters))?;
        let classifier =
            ClassifierRegistry::with_builtins().create(&args.classifier, &args.options)?;
        let suggestions = SuggestionPipeline::new()
            .with_telemetry(telemetry.clone())
            .run(&knowledge, classifier)?;
        println!("{}", serde_json::to_string_pretty(&rows_json(&suggestions))?);
        Ok(())
    })
}

fn handle_aggregate(args: &AggregateArgs) -> Result<()> {
    let run = RunContext::start(&args.log.log_dir, None, "aggregate")?;
    run.finish(|_| {
        let aggregated = read_dataset(&args.data)?
            .filter(&filter_pairs(&args.filters))?
            .aggregate(&args.by)?;
        println!("{}", serde_json::to_string_pretty(&rows_json(&aggregated))?);
        Ok(())
    })
}

fn handle_performance(args: &PerformanceArgs) -> Result<()> {
    let run = RunContext::start(&args.log.log_dir, None, "performance")?;
    run.finish(|telemetry| {
        let registry = ClassifierRegistry::with_builtins();
        let spec = ClassifierSpec::new(args.classifier.as_str(), args.options.iter().cloned());
        let mut evaluator =
            PerformanceEvaluator::new(&registry, spec.clone(), args.values, args.occurrences)?;
        println!("{}", evaluator.description());
        println!("{}", evaluator.result()?);
        telemetry.log(
            LogLevel::Info,
            "performance.measured",
            json!({
                "classifier": spec.to_string(),
                "values": args.values,
                "occurrences": args.occurrences,
                "seconds": evaluator.time()?.as_secs_f64(),
            }),
        )?;
        Ok(())
    })
}

/// One CLI invocation: its id, log file and telemetry handle.
struct RunContext {
    run_id: String,
    log_path: PathBuf,
    telemetry: EstimationTelemetry,
}

impl RunContext {
    fn start(log_dir: &Path, log_path: Option<&Path>, command: &str) -> Result<Self> {
        let run_id = format!("run-{}", Uuid::new_v4());
        let log_path = match log_path {
            Some(path) => path.to_path_buf(),
            None => compute_log_path(log_dir)?,
        };
        let sink = RunSink::new(&log_path, run_id.clone())?;
        let telemetry = EstimationTelemetry::builder("adst")
            .sink(Arc::new(sink))
            .build()?;
        telemetry.log(
            LogLevel::Info,
            "run started",
            json!({ "command": command, "started_at": Utc::now() }),
        )?;
        eprintln!("{run_id} logging to {}", log_path.display());
        Ok(Self {
            run_id,
            log_path,
            telemetry,
        })
    }

    fn finish(self, body: impl FnOnce(&EstimationTelemetry) -> Result<()>) -> Result<()> {
        match body(&self.telemetry) {
            Ok(()) => self.telemetry.log(
                LogLevel::Info,
                "run completed",
                json!({ "log_path": self.log_path }),
            ),
            Err(err) => {
                self.telemetry.log(
                    LogLevel::Error,
                    "run failed",
                    json!({ "error": format!("{err:#}") }),
                )?;
                Err(err.context(format!("{} failed", self.run_id)))
            }
        }
    }
}

/// JSON-lines sink stamping every record with the run id.
struct RunSink {
    run_id: String,
    inner: JsonLogger,
}

impl RunSink {
    fn new(path: &Path, run_id: String) -> Result<Self> {
        Ok(Self {
            run_id,
            inner: JsonLogger::new(path)?,
        })
    }
}

impl LogSink for RunSink {
    fn write(&self, record: &LogRecord) -> Result<()> {
        let mut tagged = record.clone();
        tagged
            .metadata
            .insert("run_id".into(), Value::String(self.run_id.clone()));
        self.inner.write(&tagged)
    }

    fn min_level(&self) -> LogLevel {
        self.inner.min_level()
    }
}

fn compute_log_path(base: &Path) -> Result<PathBuf> {
    let now = Local::now();
    let dir = base
        .join(format!("{:04}", now.year()))
        .join(format!("{:02}", now.month()))
        .join(format!("{:02}", now.day()));
    fs::create_dir_all(&dir)?;
    Ok(dir.join(format!(
        "run-{}.log.jsonl",
        Utc::now().format("%Y%m%d-%H%M%S")
    )))
}

fn read_dataset(path: &Path) -> Result<Dataset> {
    let file = File::open(path).with_context(|| format!("opening data set {path:?}"))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing data set {path:?}"))
}

fn parse_filter(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("filter `{raw}` is not KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("filter `{raw}` has an empty key"));
    }
    Ok((key.to_owned(), value.trim().to_owned()))
}

fn filter_pairs(filters: &[(String, String)]) -> Vec<(&str, &str)> {
    filters
        .iter()
        .map(|(key, value)| (key.as_str(), value.as_str()))
        .collect()
}

/// Rows as objects keyed by column name; labels as strings, numbers as numbers.
fn rows_json(dataset: &Dataset) -> Value {
    let columns = dataset.column_names();
    Value::Array(
        dataset
            .rows()
            .map(|row| {
                let object: Map<String, Value> = columns
                    .iter()
                    .map(|column| ((*column).to_owned(), cell_json(row, column)))
                    .collect();
                Value::Object(object)
            })
            .collect(),
    )
}

fn cell_json(row: RecordRef<'_>, column: &str) -> Value {
    match row.get(column) {
        Some(Cell::Numeric(number)) => json!(number),
        Some(Cell::Nominal(_)) => row.display(column).map_or(Value::Null, Value::String),
        Some(Cell::Missing) | None => Value::Null,
    }
}
