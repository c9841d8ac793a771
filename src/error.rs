use thiserror::Error;

/// Failures reaching or reading the document store.
///
/// Every variant belongs to the connectivity class: fatal to the current
/// refresh attempt, retryable on the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store target is incomplete: {0}")]
    InvalidTarget(String),
    #[error("failed to init async runtime: {0}")]
    RuntimeInit(String),
    #[error("failed to parse connection string: {0}")]
    ConnectionString(String),
    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout {
        stage: &'static str,
        timeout_ms: u64,
    },
    #[error("failed to fetch collection '{collection}': {reason}")]
    FetchFailed { collection: String, reason: String },
    #[error("failed to read '{path}': {reason}")]
    Unreadable { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("record {row}: missing required field '{field}'")]
    MissingField { row: usize, field: &'static str },
    #[error("record {row}: field '{field}' is not numeric: {value}")]
    NotNumeric {
        row: usize,
        field: &'static str,
        value: String,
    },
    #[error("record {row}: field '{field}' is not text: {value}")]
    NotText {
        row: usize,
        field: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    #[error("column '{0}' is not numeric")]
    NotNumeric(String),
    #[error("column '{0}' is not categorical")]
    NotCategorical(String),
    #[error("column '{0}' already exists")]
    DuplicateColumn(String),
    #[error("histogram bin count must be between 1 and {max}, got {requested}")]
    InvalidBins { requested: usize, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("no category table for dimension '{dimension}'")]
    UnknownDimension { dimension: String },
    #[error("'{value}' is not a known {dimension} category")]
    UnknownCategory { dimension: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("{label}: {0}", label = connectivity_label(.0))]
    Connectivity(#[from] StoreError),
    #[error("malformed record: {0}")]
    Schema(#[from] SchemaError),
    #[error("collection '{collection}' is empty")]
    EmptyDataset { collection: String },
    #[error("failed to build view: {0}")]
    View(#[from] ViewError),
    #[error("dataset build panicked")]
    BuildPanicked,
}

fn connectivity_label(error: &StoreError) -> &'static str {
    match error {
        StoreError::Unreadable { .. } => "export unreadable",
        _ => "store unreachable",
    }
}

impl PipelineError {
    /// An empty collection is an expected state, not a failure of the store.
    pub fn is_empty_dataset(&self) -> bool {
        matches!(self, Self::EmptyDataset { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutputError {
    #[error("failed to serialize json output: {0}")]
    JsonSerialize(String),
    #[error("failed to serialize yaml output: {0}")]
    YamlSerialize(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliError {
    #[error("invalid args: {0}\n\nTip: run `farescope --help` to see usage and examples.")]
    InvalidArgs(String),
    #[error("config error: {0}\n\nTip: mapping files are YAML or JSON objects of `dimension: [categories]`.")]
    Config(String),
    #[error("{0}\n\n{tip}", tip = pipeline_tip(.0))]
    Pipeline(PipelineError),
    #[error("query error: {0}\n\nTip: run `farescope describe` to list the available columns.")]
    View(ViewError),
    #[error("encoding error: {0}\n\nTip: run `farescope unique <dimension>` to list the known categories.")]
    Encoding(EncodingError),
    #[error("output error: {0}\n\nTip: supported formats are `table`, `json`, `yaml`.")]
    Output(OutputError),
}

fn pipeline_tip(error: &PipelineError) -> &'static str {
    match error {
        PipelineError::EmptyDataset { .. } => {
            "Tip: the collection holds no documents yet. Import the dataset and retry."
        }
        PipelineError::Connectivity(StoreError::Timeout { .. })
        | PipelineError::Connectivity(StoreError::FetchFailed { .. }) => {
            "Tip: the database did not answer. Check the IP access list of the cluster and the credentials in the connection string."
        }
        PipelineError::Connectivity(StoreError::Unreadable { .. }) => {
            "Tip: check the --input path; exports must be a JSON array or one JSON object per line."
        }
        PipelineError::Connectivity(_) => {
            "Tip: pass a connection string with --uri or FARESCOPE_URI, or read an export with --input."
        }
        PipelineError::Schema(_) => {
            "Tip: every document needs Airline, Source, Destination, Total_Stops, Duration and a numeric Price."
        }
        PipelineError::View(_) | PipelineError::BuildPanicked => {
            "Tip: rerun with -vv to see which pipeline stage failed."
        }
    }
}
