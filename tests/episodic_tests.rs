// tests/episodic_tests.rs
//! Tests for episode partitioning and sampling

use std::collections::HashSet;

use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use episodic_eval::prelude::*;

/// `classes` classes of `per_class` rows; row `i` holds the single feature `i`
fn indexed_dataset(classes: usize, per_class: usize) -> LabeledDataset {
    let n = classes * per_class;
    let features = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
    let labels = (0..n).map(|i| i / per_class).collect();
    LabeledDataset::new(features, labels).unwrap()
}

#[test]
fn test_partition_reference_layout() {
    let partition = IndexPartition::compute(5, 1, 3).unwrap();

    assert_eq!(partition.adaptation().to_vec(), vec![0, 4, 8, 12, 16]);
    assert_eq!(
        partition.evaluation().to_vec(),
        vec![1, 2, 3, 5, 6, 7, 9, 10, 11, 13, 14, 15, 17, 18, 19]
    );
}

#[test]
fn test_partition_is_idempotent() {
    let first = IndexPartition::compute(4, 3, 2).unwrap();
    let second = IndexPartition::compute(4, 3, 2).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_sample_layout_and_labels() {
    let shape = EpisodeShape::new(5, 2, 3).unwrap();
    let mut sampler =
        EpisodicSampler::seeded(indexed_dataset(8, 10), shape, TaskBudget::Unbounded, 42).unwrap();

    let episode = sampler.sample().unwrap();

    assert_eq!(episode.len(), 25);
    assert_eq!(episode.inputs().nrows(), 25);
    assert_eq!(episode.classes().len(), 5);

    for label in 0..5 {
        assert_eq!(episode.labels().iter().filter(|&&l| l == label).count(), 5);
    }

    // Each class block holds distinct rows of the class behind its label
    for (label, &class) in episode.classes().iter().enumerate() {
        let block: Vec<usize> = (label * 5..label * 5 + 5)
            .map(|r| episode.inputs()[[r, 0]] as usize)
            .collect();
        assert!(block.iter().all(|row| row / 10 == class));
        assert_eq!(block.iter().collect::<HashSet<_>>().len(), 5);
        assert!(episode.labels()[label * 5..label * 5 + 5].iter().all(|&l| l == label));
    }

    let distinct: HashSet<_> = episode.classes().iter().collect();
    assert_eq!(distinct.len(), 5);
}

#[test]
fn test_partition_slices_support_and_query() {
    let shape = EpisodeShape::new(3, 2, 2).unwrap();
    let partition = shape.partition().unwrap();
    let mut sampler =
        EpisodicSampler::seeded(indexed_dataset(3, 6), shape, TaskBudget::Unbounded, 1).unwrap();
    let episode = sampler.sample().unwrap();

    let (support, support_labels) = episode.select(partition.adaptation()).unwrap();
    let (query, query_labels) = episode.select(partition.evaluation()).unwrap();

    assert_eq!(support.nrows(), 6);
    assert_eq!(query.nrows(), 6);
    assert_eq!(support_labels, vec![0, 0, 1, 1, 2, 2]);
    assert_eq!(query_labels, vec![0, 0, 1, 1, 2, 2]);

    let support_rows: HashSet<usize> = support.column(0).iter().map(|&v| v as usize).collect();
    let query_rows: HashSet<usize> = query.column(0).iter().map(|&v| v as usize).collect();
    assert!(support_rows.is_disjoint(&query_rows));
}

#[test]
fn test_hundred_episodes_from_ten_classes() {
    let shape = EpisodeShape::new(5, 5, 15).unwrap();
    let mut sampler =
        EpisodicSampler::seeded(indexed_dataset(10, 20), shape, TaskBudget::Unbounded, 7).unwrap();

    let episodes: Vec<Episode> = sampler
        .episodes()
        .take(100)
        .collect::<episodic_eval::Result<_>>()
        .unwrap();

    assert_eq!(episodes.len(), 100);
    assert!(episodes.iter().all(|e| e.len() == 100));
}

#[test]
fn test_insufficient_classes() {
    let shape = EpisodeShape::new(5, 5, 15).unwrap();
    // Only 19 examples per class, one short of shot + query
    let result = EpisodicSampler::seeded(indexed_dataset(10, 19), shape, TaskBudget::Unbounded, 0);

    match result {
        Err(EpisodeError::InsufficientClassSamples {
            required,
            available,
            min_examples,
        }) => {
            assert_eq!(required, 5);
            assert_eq!(available, 0);
            assert_eq!(min_examples, 20);
        }
        _ => panic!("expected InsufficientClassSamples"),
    }

    let shape = EpisodeShape::new(4, 1, 1).unwrap();
    assert!(matches!(
        EpisodicSampler::seeded(indexed_dataset(3, 5), shape, TaskBudget::Unbounded, 0),
        Err(EpisodeError::InsufficientClassSamples { available: 3, .. })
    ));
}

#[test]
fn test_zero_task_budget_is_invalid() {
    let shape = EpisodeShape::new(2, 1, 1).unwrap();
    assert!(matches!(
        EpisodicSampler::seeded(indexed_dataset(3, 5), shape, TaskBudget::Fixed(0), 0),
        Err(EpisodeError::InvalidConfig(_))
    ));
}

#[test]
fn test_same_seed_same_episodes() {
    let shape = EpisodeShape::new(3, 1, 2).unwrap();
    let mut a = EpisodicSampler::seeded(indexed_dataset(6, 8), shape, TaskBudget::Unbounded, 99).unwrap();
    let mut b = EpisodicSampler::seeded(indexed_dataset(6, 8), shape, TaskBudget::Unbounded, 99).unwrap();

    for _ in 0..10 {
        let (ea, eb) = (a.sample().unwrap(), b.sample().unwrap());
        assert_eq!(ea.inputs(), eb.inputs());
        assert_eq!(ea.classes(), eb.classes());
    }
}

#[test]
fn test_sample_with_leaves_sampler_stream_alone() {
    let shape = EpisodeShape::new(3, 1, 2).unwrap();
    let mut a = EpisodicSampler::seeded(indexed_dataset(6, 8), shape, TaskBudget::Unbounded, 5).unwrap();
    let mut b = EpisodicSampler::seeded(indexed_dataset(6, 8), shape, TaskBudget::Unbounded, 5).unwrap();

    let mut external = ChaCha8Rng::seed_from_u64(1234);
    a.sample_with(&mut external).unwrap();

    assert_eq!(a.sample().unwrap().inputs(), b.sample().unwrap().inputs());
}

#[test]
fn test_fixed_pool_draws_only_pooled_tasks() {
    let shape = EpisodeShape::new(2, 1, 1).unwrap();
    let mut sampler =
        EpisodicSampler::seeded(indexed_dataset(10, 10), shape, TaskBudget::Fixed(3), 8).unwrap();
    assert_eq!(sampler.budget(), TaskBudget::Fixed(3));

    let distinct: HashSet<Vec<u64>> = (0..50)
        .map(|_| {
            let episode = sampler.sample().unwrap();
            episode.inputs().iter().map(|v| *v as u64).collect()
        })
        .collect();

    assert!(distinct.len() <= 3);
}
