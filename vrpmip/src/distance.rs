use crate::problem::{NodeId, Position};

/// Travel times between all ordered node pairs, row-major.
///
/// Euclidean input makes the matrix symmetric, but entries are kept per
/// direction so that asymmetric costs can be plugged in through
/// [`DistanceMatrix::from_fn`].
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    num_nodes: usize,
    data: Vec<f64>,
}

impl DistanceMatrix {
    pub fn new(positions: &[Position]) -> Self {
        Self::from_fn(positions.len(), |i, j| positions[i].distance(&positions[j]))
    }

    pub fn from_fn<F>(num_nodes: usize, travel: F) -> Self
    where
        F: Fn(NodeId, NodeId) -> f64,
    {
        let mut data = vec![0.0; num_nodes * num_nodes];
        for i in 0..num_nodes {
            for j in 0..num_nodes {
                if i != j {
                    data[i * num_nodes + j] = travel(i, j);
                }
            }
        }
        DistanceMatrix { num_nodes, data }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn get(&self, i: NodeId, j: NodeId) -> f64 {
        debug_assert!(i != j);
        debug_assert!(i < self.num_nodes && j < self.num_nodes);
        self.data[i * self.num_nodes + j]
    }

    /// All ordered pairs `(i, j)` with `i != j` and their travel time
    pub fn arcs(&self) -> impl Iterator<Item = (NodeId, NodeId, f64)> + '_ {
        let n = self.num_nodes;
        (0..n).flat_map(move |i| {
            (0..n)
                .filter(move |j| *j != i)
                .map(move |j| (i, j, self.get(i, j)))
        })
    }

    /// Sum over all ordered pairs
    pub fn total(&self) -> f64 {
        self.data.iter().sum()
    }

    pub fn max(&self) -> f64 {
        self.data.iter().copied().fold(0.0, f64::max)
    }

    pub fn is_symmetric(&self, tolerance: f64) -> bool {
        (0..self.num_nodes).all(|i| {
            (i + 1..self.num_nodes).all(|j| (self.get(i, j) - self.get(j, i)).abs() <= tolerance)
        })
    }
}
