//! # k-NN Result Types

use std::cmp::Ordering;

/// Row index marking an unfilled result slot
pub const NO_NEIGHBOR: i64 = -1;

/// Candidate kept in the top-k heap
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smaller distance = smaller in ordering, ties by row. BinaryHeap is a
        // max-heap, so the worst candidate sits at the top and is popped first.
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.row.cmp(&other.row))
    }
}

/// Fixed-width answer of a k-NN query.
///
/// Both vectors have exactly `k` slots; slots past the number of indexed rows
/// carry [`NO_NEIGHBOR`] and an infinite distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbors {
    pub distances: Vec<f32>,
    pub rows: Vec<i64>,
}

impl Neighbors {
    pub fn from_sorted(sorted: Vec<Neighbor>, k: usize) -> Self {
        let mut distances = Vec::with_capacity(k);
        let mut rows = Vec::with_capacity(k);
        for n in sorted.into_iter().take(k) {
            distances.push(n.distance);
            rows.push(n.row as i64);
        }
        while rows.len() < k {
            distances.push(f32::INFINITY);
            rows.push(NO_NEIGHBOR);
        }
        Self { distances, rows }
    }

    /// Filled slots only, as `(row, distance)`
    pub fn iter_filled(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.rows
            .iter()
            .zip(self.distances.iter())
            .filter(|(row, _)| **row != NO_NEIGHBOR)
            .map(|(row, d)| (*row as usize, *d))
    }

    pub fn k(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BinaryHeap;

    #[test]
    fn test_heap_pops_worst() {
        let mut heap = BinaryHeap::new();
        heap.push(Neighbor { row: 0, distance: 1.0 });
        heap.push(Neighbor { row: 1, distance: 3.0 });
        heap.push(Neighbor { row: 2, distance: 3.0 });
        assert_eq!(heap.pop().unwrap().row, 2);
        assert_eq!(heap.pop().unwrap().row, 1);
    }

    #[test]
    fn test_padding() {
        let n = Neighbors::from_sorted(vec![Neighbor { row: 4, distance: 0.5 }], 3);
        assert_eq!(n.rows, vec![4, NO_NEIGHBOR, NO_NEIGHBOR]);
        assert_eq!(n.iter_filled().collect::<Vec<_>>(), vec![(4, 0.5)]);
        assert!(n.distances[2].is_infinite());
    }
}
