use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, error::ErrorKind};
use serde::Serialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use crate::{
    aggregate::{self, FilterSelection},
    cache::{Loader, RefreshCache},
    encoding::{CategoryMapping, MODEL_DIMENSIONS, PredictionInput},
    error::{CliError, PipelineError},
    output::{self, OutputFormat, TableView},
    pipeline::{Pipeline, PipelineOptions},
    record::{AIRLINE, DURATION, PRICE},
    store::{JsonFileStore, MongoStore, StoreTarget},
    view::ColumnarView,
};

#[derive(Clone, Debug, ValueEnum)]
enum OutputArg {
    Table,
    Json,
    Yaml,
}

#[derive(Parser, Debug)]
#[command(name = "farescope")]
#[command(about = "Fare statistics over a flight-fare collection")]
#[command(version)]
struct CliArgs {
    /// MongoDB connection string
    #[arg(long, env = "FARESCOPE_URI", default_value = "", hide_env_values = true)]
    uri: String,

    #[arg(long, env = "FARESCOPE_DATABASE", default_value = "Vpandas")]
    database: String,

    #[arg(long, env = "FARESCOPE_COLLECTION", default_value = "Fight_data")]
    collection: String,

    /// Read a collection export (JSON array or JSON lines) instead of MongoDB
    #[arg(short = 'i', long = "input", value_name = "file")]
    input: Option<PathBuf>,

    #[arg(long = "timeout-secs", default_value_t = 10)]
    timeout_secs: u64,

    /// Factor applied to Price for the Price_with_Tax column
    #[arg(long = "tax-multiplier", default_value_t = 1.1)]
    tax_multiplier: f64,

    #[arg(
        short = 'o',
        long = "output",
        default_value = "table",
        value_enum,
        ignore_case = true,
        global = true
    )]
    output: OutputArg,

    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Flight count, mean and max of a measure
    Summary {
        #[arg(long, default_value = PRICE)]
        measure: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Mean price per airline, most expensive first
    ByAirline {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Mean of a measure grouped by a categorical column
    Group {
        #[arg(long = "by")]
        by: String,
        #[arg(long, default_value = PRICE)]
        measure: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Distribution of a measure over equal-width bins
    Histogram {
        #[arg(long, default_value_t = 20)]
        bins: usize,
        #[arg(long, default_value = PRICE)]
        measure: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// First rows of the dataset, derived columns included
    Rows {
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Distinct values of a categorical column
    Unique { dimension: String },
    /// Statistics of every numeric column
    Describe {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Price summary of flights lasting at least an hour
    LongFlights,
    /// Encode model inputs as category indices
    Encode {
        #[arg(long)]
        airline: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        destination: String,
        #[arg(long)]
        stops: String,
        /// YAML or JSON category tables; derived from the dataset when omitted
        #[arg(long, value_name = "file")]
        mapping: Option<PathBuf>,
    },
}

#[derive(Args, Clone, Debug)]
struct FilterArgs {
    /// Column the selection applies to
    #[arg(long = "filter-dim", default_value = AIRLINE)]
    filter_dim: String,

    /// Allowed value; repeat for several. Without any, every row is kept.
    #[arg(
        short = 's',
        long = "select",
        visible_alias = "airline",
        value_name = "value"
    )]
    select: Vec<String>,
}

impl FilterArgs {
    fn apply(
        &self,
        view: &ColumnarView,
    ) -> Result<ColumnarView, CliError> {
        let selection: FilterSelection = self.select.iter().cloned().collect();
        aggregate::apply_filter(view, &self.filter_dim, &selection).map_err(CliError::View)
    }
}

#[derive(Serialize)]
struct EncodedInput {
    input: PredictionInput,
    indices: [usize; 4],
}

pub fn run() -> Result<(), CliError> {
    let Some(args) = parse_cli_args()? else {
        return Ok(());
    };
    init_tracing(args.verbose);

    let cache = RefreshCache::new(build_pipeline(&args)?);
    let rendered = execute(&args.command, &cache, map_output_format(&args.output))?;
    println!("{rendered}");
    Ok(())
}

fn parse_cli_args() -> Result<Option<CliArgs>, CliError> {
    match CliArgs::try_parse() {
        Ok(args) => Ok(Some(args)),
        Err(error) => {
            if matches!(
                error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                print!("{error}");
                return Ok(None);
            }
            Err(CliError::InvalidArgs(error.to_string()))
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    // A subscriber may already be installed when embedded; keep that one.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_pipeline(args: &CliArgs) -> Result<Pipeline, CliError> {
    if !args.tax_multiplier.is_finite() {
        return Err(CliError::InvalidArgs(
            "--tax-multiplier must be a finite number".to_string(),
        ));
    }

    let target = StoreTarget {
        uri: args.uri.clone(),
        database: args.database.clone(),
        collection: args.collection.clone(),
    };
    let options = PipelineOptions {
        tax_multiplier: args.tax_multiplier,
    };

    match &args.input {
        Some(path) => Ok(Pipeline::new(JsonFileStore::new(path), target, options)),
        None => {
            let store = MongoStore::new(Duration::from_secs(args.timeout_secs))
                .map_err(|error| CliError::Pipeline(PipelineError::Connectivity(error)))?;
            Ok(Pipeline::new(store, target, options))
        }
    }
}

const SUMMARY_COLUMNS: [&str; 3] = ["count", "mean", "max"];
const STATS_COLUMNS: [&str; 6] = ["column", "count", "mean", "std", "min", "max"];

fn execute<L: Loader>(
    command: &Command,
    cache: &RefreshCache<L>,
    format: OutputFormat,
) -> Result<String, CliError> {
    let dataset = || cache.get_or_build().map_err(CliError::Pipeline);

    match command {
        Command::Summary { measure, filter } => {
            let dataset = dataset()?;
            let view = filter.apply(&dataset)?;
            let summary = aggregate::summarize(&view, measure).map_err(CliError::View)?;
            let table = TableView::from_items(std::slice::from_ref(&summary), &SUMMARY_COLUMNS)
                .map_err(CliError::Output)?
                .with_footer(format!("measure: {measure}"));
            render(&summary, &table, format)
        }
        Command::ByAirline { filter } => {
            let dataset = dataset()?;
            grouped(&filter.apply(&dataset)?, AIRLINE, PRICE, format)
        }
        Command::Group {
            by,
            measure,
            filter,
        } => {
            let dataset = dataset()?;
            grouped(&filter.apply(&dataset)?, by, measure, format)
        }
        Command::Histogram {
            bins,
            measure,
            filter,
        } => {
            let dataset = dataset()?;
            let view = filter.apply(&dataset)?;
            let bins = aggregate::histogram(&view, measure, *bins).map_err(CliError::View)?;
            let table = TableView::from_items(&bins, &["lower", "upper", "count"])
                .map_err(CliError::Output)?
                .with_footer(format!("bins: {}, rows: {}", bins.len(), view.row_count()));
            render(&bins, &table, format)
        }
        Command::Rows { limit, filter } => {
            let dataset = dataset()?;
            let view = filter.apply(&dataset)?;
            let rows = view.head(*limit).map_err(CliError::View)?;
            let table = TableView {
                columns: view
                    .column_names()
                    .iter()
                    .map(|name| name.to_string())
                    .collect(),
                rows: rows.clone(),
                footer: Some(format!("rows: {} of {}", rows.len(), view.row_count())),
            };
            render(&rows, &table, format)
        }
        Command::Unique { dimension } => {
            let values = dataset()?.unique(dimension).map_err(CliError::View)?;
            let table = TableView::from_items(&values, &["value"])
                .map_err(CliError::Output)?
                .with_footer(format!("{dimension}: {} values", values.len()));
            render(&values, &table, format)
        }
        Command::Describe { filter } => {
            let dataset = dataset()?;
            let view = filter.apply(&dataset)?;
            let stats = aggregate::describe(&view).map_err(CliError::View)?;
            let table =
                TableView::from_items(&stats, &STATS_COLUMNS).map_err(CliError::Output)?;
            render(&stats, &table, format)
        }
        Command::LongFlights => {
            let dataset = dataset()?;
            let view =
                aggregate::filter_contains(&dataset, DURATION, "h").map_err(CliError::View)?;
            let summary = aggregate::summarize(&view, PRICE).map_err(CliError::View)?;
            let table = TableView::from_items(std::slice::from_ref(&summary), &SUMMARY_COLUMNS)
                .map_err(CliError::Output)?
                .with_footer(format!("long flights: {}", summary.count));
            render(&summary, &table, format)
        }
        Command::Encode {
            airline,
            source,
            destination,
            stops,
            mapping,
        } => {
            let mapping = match mapping {
                Some(path) => CategoryMapping::from_file(path).map_err(CliError::Config)?,
                None => {
                    let dataset = dataset()?;
                    CategoryMapping::from_view(&dataset).map_err(CliError::View)?
                }
            };
            let input = PredictionInput {
                airline: airline.clone(),
                source: source.clone(),
                destination: destination.clone(),
                total_stops: stops.clone(),
            };
            let indices = input.encode(&mapping).map_err(CliError::Encoding)?;

            let row: BTreeMap<String, Value> = MODEL_DIMENSIONS
                .iter()
                .zip(indices)
                .map(|(dimension, index)| (dimension.to_string(), Value::from(index)))
                .collect();
            let table = TableView {
                columns: MODEL_DIMENSIONS
                    .iter()
                    .map(|name| name.to_string())
                    .collect(),
                rows: vec![row],
                footer: Some("encoded: 1".to_string()),
            };
            render(&EncodedInput { input, indices }, &table, format)
        }
    }
}

fn grouped(
    view: &ColumnarView,
    dimension: &str,
    measure: &str,
    format: OutputFormat,
) -> Result<String, CliError> {
    let result = aggregate::group_mean(view, dimension, measure).map_err(CliError::View)?;
    let table = TableView::from_items(&result.groups, &["key", "mean", "count"])
        .map_err(CliError::Output)?
        .with_footer(format!(
            "groups: {} ({measure} by {dimension}, rows: {})",
            result.groups.len(),
            view.row_count()
        ));
    render(&result, &table, format)
}

fn render<T: Serialize>(
    payload: &T,
    table: &TableView,
    format: OutputFormat,
) -> Result<String, CliError> {
    output::render(payload, table, format).map_err(CliError::Output)
}

fn map_output_format(format: &OutputArg) -> OutputFormat {
    match format {
        OutputArg::Table => OutputFormat::Table,
        OutputArg::Json => OutputFormat::Json,
        OutputArg::Yaml => OutputFormat::Yaml,
    }
}
