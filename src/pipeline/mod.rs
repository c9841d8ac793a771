use tracing::{debug, info};

use crate::{
    error::PipelineError,
    normalize::{Dataset, normalize},
    record::{DURATION, PRICE},
    store::{DocumentStore, StoreTarget},
    view::{ColumnarView, Expr, build_view},
};

pub const PRICE_WITH_TAX: &str = "Price_with_Tax";
pub const DURATION_MINUTES: &str = "Duration_Minutes";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PipelineOptions {
    /// Factor applied to `Price` for the `Price_with_Tax` column.
    pub tax_multiplier: f64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            tax_multiplier: 1.1,
        }
    }
}

/// Fetch, normalize and build: one full refresh of the dataset.
pub struct Pipeline {
    store: Box<dyn DocumentStore>,
    target: StoreTarget,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        store: impl DocumentStore + 'static,
        target: StoreTarget,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store: Box::new(store),
            target,
            options,
        }
    }

    pub fn target(&self) -> &StoreTarget {
        &self.target
    }

    pub fn run(&self) -> Result<ColumnarView, PipelineError> {
        let raw = self.store.fetch_all(&self.target)?;
        debug!(records = raw.len(), "normalizing records");

        let table = match normalize(&raw)? {
            Dataset::Loaded(table) => table,
            Dataset::Empty => {
                return Err(PipelineError::EmptyDataset {
                    collection: self.target.collection.clone(),
                });
            }
        };

        let view = build_view(table)
            .with_derived(
                PRICE_WITH_TAX,
                Expr::column(PRICE) * Expr::literal(self.options.tax_multiplier),
            )?
            .with_derived(DURATION_MINUTES, Expr::duration_minutes(DURATION))?;

        info!(rows = view.row_count(), "dataset built");
        Ok(view)
    }
}
