//! Support/query index sets for the class-major episode layout

use serde::{Deserialize, Serialize};

use crate::error::{EpisodeError, Result};

/// The (way, shot, query) configuration of an episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeShape {
    /// Classes per episode
    pub way: usize,
    /// Support examples per class
    pub shot: usize,
    /// Query examples per class
    pub query: usize,
}

impl EpisodeShape {
    /// Creates a validated shape
    pub fn new(way: usize, shot: usize, query: usize) -> Result<Self> {
        let shape = EpisodeShape { way, shot, query };
        shape.validate()?;
        Ok(shape)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("way", self.way), ("shot", self.shot), ("query", self.query)] {
            if value == 0 {
                return Err(EpisodeError::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }

    /// Examples drawn per class (`shot + query`)
    pub fn examples_per_class(&self) -> usize {
        self.shot + self.query
    }

    /// Examples in a full episode
    pub fn total_examples(&self) -> usize {
        self.way * self.examples_per_class()
    }

    pub fn support_len(&self) -> usize {
        self.way * self.shot
    }

    pub fn query_len(&self) -> usize {
        self.way * self.query
    }

    /// Index sets for episodes of this shape
    pub fn partition(&self) -> Result<IndexPartition> {
        IndexPartition::compute(self.way, self.shot, self.query)
    }
}

impl std::fmt::Display for EpisodeShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-way {}-shot {}-query", self.way, self.shot, self.query)
    }
}

/// Disjoint adaptation (support) and evaluation (query) positions within an episode.
///
/// Episodes lay out each class as `shot + query` contiguous rows, classes in
/// draw order. Class `c` therefore owns `[c*(shot+query), (c+1)*(shot+query))`,
/// of which the first `shot` rows are support and the remaining `query` rows
/// are evaluated. One partition serves every episode of the same shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPartition {
    shape: EpisodeShape,
    adaptation: Vec<usize>,
    evaluation: Vec<usize>,
}

impl IndexPartition {
    pub fn compute(way: usize, shot: usize, query: usize) -> Result<Self> {
        let shape = EpisodeShape::new(way, shot, query)?;
        let block = shape.examples_per_class();

        let mut adaptation = Vec::with_capacity(shape.support_len());
        let mut evaluation = Vec::with_capacity(shape.query_len());

        for class in 0..way {
            let start = class * block;
            adaptation.extend(start..start + shot);
            evaluation.extend(start + shot..start + block);
        }

        Ok(IndexPartition {
            shape,
            adaptation,
            evaluation,
        })
    }

    pub fn shape(&self) -> EpisodeShape {
        self.shape
    }

    /// Support positions, class-major
    pub fn adaptation(&self) -> &[usize] {
        &self.adaptation
    }

    /// Query positions, class-major
    pub fn evaluation(&self) -> &[usize] {
        &self.evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_five_way_one_shot_three_query() {
        let partition = IndexPartition::compute(5, 1, 3).unwrap();

        assert_eq!(partition.adaptation(), &[0, 4, 8, 12, 16]);
        assert_eq!(
            partition.evaluation(),
            &[1, 2, 3, 5, 6, 7, 9, 10, 11, 13, 14, 15, 17, 18, 19]
        );
    }

    #[test]
    fn test_zero_dimension_is_invalid() {
        assert!(matches!(IndexPartition::compute(0, 1, 1), Err(EpisodeError::InvalidConfig(_))));
        assert!(matches!(IndexPartition::compute(5, 0, 1), Err(EpisodeError::InvalidConfig(_))));
        assert!(matches!(IndexPartition::compute(5, 1, 0), Err(EpisodeError::InvalidConfig(_))));
    }

    #[test]
    fn test_shape_partition_matches_compute() {
        let shape = EpisodeShape::new(3, 2, 4).unwrap();
        assert_eq!(shape.partition().unwrap(), IndexPartition::compute(3, 2, 4).unwrap());
        assert_eq!(shape.total_examples(), 18);
    }
}
