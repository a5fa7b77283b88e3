use crate::{AsValue, Params, Value};
use anyhow::anyhow;
use std::sync::Arc;

pub type RowNames = Arc<[String]>;
pub type Row = Box<[Value]>;

/// A fetched row: positional values plus their column-alias labels.
/// Entities materialize against the labels, which the SQL generator sets to
/// property names (or `alias__Property` in joined queries).
#[derive(Debug, Clone)]
pub struct RowLabeled {
    pub labels: RowNames,
    pub values: Row,
}

impl RowLabeled {
    pub fn new(labels: RowNames, values: Row) -> Self {
        Self { labels, values }
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, label: &str) -> Option<&Value> {
        self.labels
            .iter()
            .position(|l| l == label)
            .map(|i| &self.values[i])
    }

    /// Typed access by label, converting through [`AsValue`].
    pub fn try_get<T: AsValue>(&self, label: &str) -> anyhow::Result<T> {
        let value = self
            .get(label)
            .ok_or_else(|| anyhow!("row has no column labeled `{}`", label))?;
        T::try_from_value(value.clone())
    }
}

/// Outcome of a mutating statement: affected count plus any output
/// parameters the driver read back (e.g. `RETURNING ... INTO` keys).
#[derive(Default, Debug)]
pub struct RowsAffected {
    pub rows_affected: u64,
    pub output: Params,
}

#[derive(Debug)]
pub enum QueryResult {
    Row(RowLabeled),
    Affected(RowsAffected),
}

impl Extend<RowsAffected> for RowsAffected {
    fn extend<T: IntoIterator<Item = RowsAffected>>(&mut self, iter: T) {
        for elem in iter {
            self.rows_affected += elem.rows_affected;
            if !elem.output.is_empty() {
                self.output = elem.output;
            }
        }
    }
}
