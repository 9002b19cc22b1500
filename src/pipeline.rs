use crate::category::{CATEGORY_COLUMN, CategoryPolicy, FALLBACK_LABEL};
use crate::classifier::Classifier;
use crate::config::DEFAULT_MAX_IN_FLIGHT;
use crate::table::{Row, Table};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Column (0-based) whose text is sent to the classifier.
pub const DESCRIPTION_COLUMN: usize = 2;

#[derive(Clone, Copy, Debug)]
pub struct PipelineOptions {
    pub max_in_flight: usize,
    pub policy: CategoryPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            policy: CategoryPolicy::default(),
        }
    }
}

/// Append a `Category` column to `table`, classifying every data row.
///
/// Rows are classified concurrently with at most `max_in_flight` requests
/// outstanding, and the call returns once every row has an answer. Output
/// rows keep their input order. A failed classification only affects its own
/// row, which gets the fallback label.
pub async fn categorize<C>(table: Table, classifier: Arc<C>, options: PipelineOptions) -> Table
where
    C: Classifier + 'static,
{
    let mut rows = table.into_rows();
    if rows.is_empty() {
        return Table::empty();
    }

    let data_rows = rows.len() - 1;
    let semaphore = Arc::new(Semaphore::new(options.max_in_flight.max(1)));
    let mut tasks = JoinSet::new();

    for (index, row) in rows.iter().skip(1).enumerate() {
        let description = row.get(DESCRIPTION_COLUMN).cloned().unwrap_or_default();
        let classifier = Arc::clone(&classifier);
        let semaphore = Arc::clone(&semaphore);
        let policy = options.policy;

        tasks.spawn(async move {
            // The semaphore is never closed, so acquiring only waits.
            let _permit = semaphore.acquire_owned().await.ok();
            let category = match classifier.classify(&description).await {
                Ok(answer) => policy.resolve(&answer),
                Err(e) => {
                    log::warn!("Classifier error for row {}: {}", index + 1, e);
                    FALLBACK_LABEL.to_string()
                }
            };
            (index, category)
        });
    }

    let mut categories = vec![FALLBACK_LABEL.to_string(); data_rows];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, category)) => categories[index] = category,
            Err(e) => log::error!("Classification task failed: {}", e),
        }
    }

    // Square up ragged rows so the category lands in its own column.
    let width = rows.iter().map(Vec::len).max().unwrap_or_default();
    for row in rows.iter_mut() {
        row.resize(width, String::new());
    }

    rows[0].push(CATEGORY_COLUMN.to_string());
    for (row, category) in rows.iter_mut().skip(1).zip(categories) {
        row.push(category);
    }

    log::info!("Categorized {} rows", data_rows);
    Table::new(rows)
}

/// Category column index of a categorized table, if present.
pub fn category_column(header: &Row) -> Option<usize> {
    header.iter().position(|name| name == CATEGORY_COLUMN)
}
