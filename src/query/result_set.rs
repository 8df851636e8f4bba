//! Query results

use std::vec;

use serde_json::Value;

/// Forward-only cursor over one execution's rows
///
/// Rows are a snapshot taken when the query executed; later mutations do
/// not affect an existing cursor.
#[derive(Debug)]
pub struct ResultSet {
    rows: vec::IntoIter<Value>,
}

impl ResultSet {
    pub(crate) fn new(rows: Vec<Value>) -> Self {
        Self {
            rows: rows.into_iter(),
        }
    }

    /// Drain every remaining row
    pub fn all_results(self) -> Vec<Value> {
        self.rows.collect()
    }

    /// Rows not yet consumed
    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl Iterator for ResultSet {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        self.rows.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

/// One change notification delivered to a query listener
#[derive(Debug, Clone, PartialEq)]
pub struct QueryChange {
    pub rows: Vec<Value>,
}

impl QueryChange {
    pub fn results(&self) -> ResultSet {
        ResultSet::new(self.rows.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forward_only() {
        let mut results = ResultSet::new(vec![json!(1), json!(2), json!(3)]);
        assert_eq!(results.next(), Some(json!(1)));
        assert_eq!(results.remaining(), 2);
        assert_eq!(results.all_results(), vec![json!(2), json!(3)]);
    }

    #[test]
    fn test_change_results_are_independent() {
        let change = QueryChange {
            rows: vec![json!({"name": "Ada"})],
        };
        let mut first = change.results();
        first.next();
        assert_eq!(change.results().remaining(), 1);
    }
}
