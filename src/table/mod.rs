use std::collections::HashMap;

use crate::record::{AIRLINE, DESTINATION, DURATION, FlightRecord, PRICE, SOURCE, TOTAL_STOPS};

/// One contiguous column of the working table.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    /// Dictionary-encoded strings; `codes[row]` indexes `dictionary`.
    Categorical {
        dictionary: Vec<String>,
        codes: Vec<u32>,
    },
    Text(Vec<String>),
    Float64(Vec<f64>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Categorical { codes, .. } => codes.len(),
            Column::Text(values) => values.len(),
            Column::Float64(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Float64(_))
    }

    /// String value at `row`, for categorical and text columns.
    pub fn text(
        &self,
        row: usize,
    ) -> Option<&str> {
        match self {
            Column::Categorical { dictionary, codes } => codes
                .get(row)
                .and_then(|code| dictionary.get(*code as usize))
                .map(String::as_str),
            Column::Text(values) => values.get(row).map(String::as_str),
            Column::Float64(_) => None,
        }
    }

    pub fn number(
        &self,
        row: usize,
    ) -> Option<f64> {
        match self {
            Column::Float64(values) => values.get(row).copied(),
            _ => None,
        }
    }
}

#[derive(Default)]
struct CategoricalBuilder {
    dictionary: Vec<String>,
    lookup: HashMap<String, u32>,
    codes: Vec<u32>,
}

impl CategoricalBuilder {
    fn with_capacity(rows: usize) -> Self {
        Self {
            codes: Vec::with_capacity(rows),
            ..Self::default()
        }
    }

    fn push(
        &mut self,
        value: String,
    ) {
        let code = match self.lookup.get(&value) {
            Some(code) => *code,
            None => {
                let code = self.dictionary.len() as u32;
                self.dictionary.push(value.clone());
                self.lookup.insert(value, code);
                code
            }
        };
        self.codes.push(code);
    }

    fn finish(self) -> Column {
        Column::Categorical {
            dictionary: self.dictionary,
            codes: self.codes,
        }
    }
}

/// The normalized dataset of one refresh cycle, stored column by column.
///
/// Built once from validated records and never mutated afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkingTable {
    names: Vec<String>,
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    row_count: usize,
}

impl WorkingTable {
    pub fn from_records(records: Vec<FlightRecord>) -> Self {
        let rows = records.len();
        let mut airline = CategoricalBuilder::with_capacity(rows);
        let mut source = CategoricalBuilder::with_capacity(rows);
        let mut destination = CategoricalBuilder::with_capacity(rows);
        let mut total_stops = CategoricalBuilder::with_capacity(rows);
        let mut duration = Vec::with_capacity(rows);
        let mut price = Vec::with_capacity(rows);

        for record in records {
            airline.push(record.airline);
            source.push(record.source);
            destination.push(record.destination);
            total_stops.push(record.total_stops);
            duration.push(record.duration);
            price.push(record.price);
        }

        Self::from_columns(
            vec![
                (AIRLINE, airline.finish()),
                (SOURCE, source.finish()),
                (DESTINATION, destination.finish()),
                (TOTAL_STOPS, total_stops.finish()),
                (DURATION, Column::Text(duration)),
                (PRICE, Column::Float64(price)),
            ],
            rows,
        )
    }

    fn from_columns(
        columns: Vec<(&str, Column)>,
        row_count: usize,
    ) -> Self {
        let mut names = Vec::with_capacity(columns.len());
        let mut stored = Vec::with_capacity(columns.len());
        let mut index = HashMap::with_capacity(columns.len());

        for (position, (name, column)) in columns.into_iter().enumerate() {
            index.insert(name.to_string(), position);
            names.push(name.to_string());
            stored.push(column);
        }

        Self {
            names,
            columns: stored,
            index,
            row_count,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(
        &self,
        name: &str,
    ) -> Option<&Column> {
        self.index.get(name).map(|position| &self.columns[*position])
    }
}
