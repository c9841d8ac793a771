//! Read-only columnar views over a [`WorkingTable`].
//!
//! A view shares its table through an `Arc` and narrows it with a list of
//! selected row ids, so filtering never copies column data. Derived columns
//! are stored as expressions and evaluated row by row whenever they are read.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    ops,
    sync::Arc,
};

use serde_json::Value;

use crate::{
    duration::parse_minutes,
    error::ViewError,
    table::{Column, WorkingTable},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn apply(
        self,
        left: f64,
        right: f64,
    ) -> Option<f64> {
        match self {
            BinaryOp::Add => Some(left + right),
            BinaryOp::Sub => Some(left - right),
            BinaryOp::Mul => Some(left * right),
            BinaryOp::Div if right == 0.0 => None,
            BinaryOp::Div => Some(left / right),
        }
    }
}

/// Expression behind a derived column.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(f64),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Minutes of a duration text column; null when the text does not parse.
    DurationMinutes(String),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn literal(value: f64) -> Self {
        Expr::Literal(value)
    }

    pub fn duration_minutes(column: impl Into<String>) -> Self {
        Expr::DurationMinutes(column.into())
    }

    fn binary(
        op: BinaryOp,
        left: Expr,
        right: Expr,
    ) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

impl ops::Add for Expr {
    type Output = Expr;

    fn add(
        self,
        rhs: Expr,
    ) -> Expr {
        Expr::binary(BinaryOp::Add, self, rhs)
    }
}

impl ops::Sub for Expr {
    type Output = Expr;

    fn sub(
        self,
        rhs: Expr,
    ) -> Expr {
        Expr::binary(BinaryOp::Sub, self, rhs)
    }
}

impl ops::Mul for Expr {
    type Output = Expr;

    fn mul(
        self,
        rhs: Expr,
    ) -> Expr {
        Expr::binary(BinaryOp::Mul, self, rhs)
    }
}

impl ops::Div for Expr {
    type Output = Expr;

    fn div(
        self,
        rhs: Expr,
    ) -> Expr {
        Expr::binary(BinaryOp::Div, self, rhs)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
struct DerivedColumns {
    order: Vec<String>,
    exprs: HashMap<String, Expr>,
}

type RowFn<'a> = Box<dyn Fn(usize) -> Option<f64> + 'a>;

/// Numeric reader over the rows of a view, base or derived.
pub struct NumericColumn<'a> {
    view: &'a ColumnarView,
    accessor: RowFn<'a>,
}

impl NumericColumn<'_> {
    /// Values of the selected rows in view order; `None` marks a null.
    pub fn values(&self) -> impl Iterator<Item = Option<f64>> + '_ {
        self.view.row_ids().map(|row| (self.accessor)(row))
    }
}

/// Physical row ids of a view.
pub enum RowIds<'a> {
    All(ops::Range<usize>),
    Selected(std::slice::Iter<'a, usize>),
}

impl Iterator for RowIds<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        match self {
            RowIds::All(range) => range.next(),
            RowIds::Selected(rows) => rows.next().copied(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            RowIds::All(range) => range.size_hint(),
            RowIds::Selected(rows) => rows.size_hint(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ColumnarView {
    table: Arc<WorkingTable>,
    selection: Option<Arc<[usize]>>,
    derived: Arc<DerivedColumns>,
}

pub fn build_view(table: WorkingTable) -> ColumnarView {
    ColumnarView::new(Arc::new(table))
}

impl ColumnarView {
    pub fn new(table: Arc<WorkingTable>) -> Self {
        Self {
            table,
            selection: None,
            derived: Arc::new(DerivedColumns::default()),
        }
    }

    pub fn table(&self) -> &WorkingTable {
        &self.table
    }

    pub fn row_count(&self) -> usize {
        match &self.selection {
            Some(rows) => rows.len(),
            None => self.table.row_count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn row_ids(&self) -> RowIds<'_> {
        match &self.selection {
            Some(rows) => RowIds::Selected(rows.iter()),
            None => RowIds::All(0..self.table.row_count()),
        }
    }

    /// Base columns followed by derived columns in registration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.table
            .column_names()
            .iter()
            .chain(self.derived.order.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn has_column(
        &self,
        name: &str,
    ) -> bool {
        self.table.column(name).is_some() || self.derived.exprs.contains_key(name)
    }

    pub fn is_numeric(
        &self,
        name: &str,
    ) -> bool {
        match self.table.column(name) {
            Some(column) => column.is_numeric(),
            None => self.derived.exprs.contains_key(name),
        }
    }

    /// Registers a derived column and returns the extended view.
    ///
    /// The receiver and its base columns are left untouched.
    pub fn with_derived(
        &self,
        name: impl Into<String>,
        expr: Expr,
    ) -> Result<ColumnarView, ViewError> {
        let name = name.into();
        if self.has_column(&name) {
            return Err(ViewError::DuplicateColumn(name));
        }
        self.compile(&expr)?;

        let mut derived = DerivedColumns::clone(&self.derived);
        derived.order.push(name.clone());
        derived.exprs.insert(name, expr);

        Ok(ColumnarView {
            table: Arc::clone(&self.table),
            selection: self.selection.clone(),
            derived: Arc::new(derived),
        })
    }

    pub fn numeric(
        &self,
        name: &str,
    ) -> Result<NumericColumn<'_>, ViewError> {
        Ok(NumericColumn {
            view: self,
            accessor: self.numeric_accessor(name)?,
        })
    }

    /// A base categorical or text column, for grouping and filtering.
    pub fn text_column(
        &self,
        name: &str,
    ) -> Result<&Column, ViewError> {
        match self.table.column(name) {
            Some(column @ (Column::Categorical { .. } | Column::Text(_))) => Ok(column),
            Some(Column::Float64(_)) => Err(ViewError::NotCategorical(name.to_string())),
            None if self.derived.exprs.contains_key(name) => {
                Err(ViewError::NotCategorical(name.to_string()))
            }
            None => Err(ViewError::UnknownColumn(name.to_string())),
        }
    }

    /// Narrows the view to the given physical row ids.
    pub(crate) fn select(
        &self,
        rows: Vec<usize>,
    ) -> ColumnarView {
        ColumnarView {
            table: Arc::clone(&self.table),
            selection: Some(rows.into()),
            derived: Arc::clone(&self.derived),
        }
    }

    /// Sorted distinct values of a categorical or text column among the selected rows.
    pub fn unique(
        &self,
        name: &str,
    ) -> Result<Vec<String>, ViewError> {
        match self.text_column(name)? {
            Column::Categorical { dictionary, codes } => {
                let mut seen = vec![false; dictionary.len()];
                for row in self.row_ids() {
                    seen[codes[row] as usize] = true;
                }
                let mut values: Vec<String> = dictionary
                    .iter()
                    .zip(seen)
                    .filter(|(_, seen)| *seen)
                    .map(|(value, _)| value.clone())
                    .collect();
                values.sort();
                Ok(values)
            }
            column => {
                let values: BTreeSet<&str> =
                    self.row_ids().filter_map(|row| column.text(row)).collect();
                Ok(values.into_iter().map(str::to_string).collect())
            }
        }
    }

    /// The first `limit` rows as name → value records, derived columns included.
    pub fn head(
        &self,
        limit: usize,
    ) -> Result<Vec<BTreeMap<String, Value>>, ViewError> {
        let names = self.column_names();
        let mut readers = Vec::with_capacity(names.len());
        for name in &names {
            let reader = match self.table.column(name) {
                Some(column) => CellReader::Base(column),
                None => CellReader::Derived(self.numeric_accessor(name)?),
            };
            readers.push((*name, reader));
        }

        Ok(self
            .row_ids()
            .take(limit)
            .map(|row| {
                readers
                    .iter()
                    .map(|(name, reader)| (name.to_string(), reader.read(row)))
                    .collect()
            })
            .collect())
    }

    fn numeric_accessor(
        &self,
        name: &str,
    ) -> Result<RowFn<'_>, ViewError> {
        if let Some(column) = self.table.column(name) {
            return match column {
                Column::Float64(values) => Ok(Box::new(move |row| values.get(row).copied())),
                _ => Err(ViewError::NotNumeric(name.to_string())),
            };
        }

        match self.derived.exprs.get(name) {
            Some(expr) => self.compile(expr),
            None => Err(ViewError::UnknownColumn(name.to_string())),
        }
    }

    fn compile<'a>(
        &'a self,
        expr: &'a Expr,
    ) -> Result<RowFn<'a>, ViewError> {
        match expr {
            Expr::Literal(value) => {
                let value = *value;
                Ok(Box::new(move |_| Some(value)))
            }
            Expr::Column(name) => self.numeric_accessor(name),
            Expr::DurationMinutes(name) => {
                let column = self.text_column(name)?;
                Ok(Box::new(move |row| {
                    column.text(row).and_then(parse_minutes).map(f64::from)
                }))
            }
            Expr::Binary { op, left, right } => {
                let op = *op;
                let left = self.compile(left)?;
                let right = self.compile(right)?;
                Ok(Box::new(move |row| op.apply(left(row)?, right(row)?)))
            }
        }
    }
}

enum CellReader<'a> {
    Base(&'a Column),
    Derived(RowFn<'a>),
}

impl CellReader<'_> {
    fn read(
        &self,
        row: usize,
    ) -> Value {
        match self {
            CellReader::Base(Column::Float64(values)) => number_value(values.get(row).copied()),
            CellReader::Base(column) => column
                .text(row)
                .map(|text| Value::String(text.to_string()))
                .unwrap_or(Value::Null),
            CellReader::Derived(accessor) => number_value(accessor(row)),
        }
    }
}

fn number_value(value: Option<f64>) -> Value {
    value
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
