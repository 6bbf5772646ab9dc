use std::sync::Arc;

use super::row::CustomDbRow;

/// Owned single-pass cursor over a snapshot of a handle's last result.
#[derive(Debug, Clone)]
pub struct RowCursor {
    rows: Arc<Vec<CustomDbRow>>,
    position: usize,
}

impl RowCursor {
    pub(crate) fn new(rows: Arc<Vec<CustomDbRow>>, position: usize) -> Self {
        let position = position.min(rows.len());
        Self { rows, position }
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn has_rows(&self) -> bool {
        self.position < self.rows.len()
    }
}

impl Iterator for RowCursor {
    type Item = CustomDbRow;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.get(self.position)?.clone();
        self.position += 1;
        Some(row)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.rows.len() - self.position;
        (left, Some(left))
    }
}

impl ExactSizeIterator for RowCursor {}
