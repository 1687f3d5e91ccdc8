// tests/adaptation_tests.rs
//! Tests for fast adaptation and the episode runner

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use episodic_eval::prelude::*;

fn clustered(classes: usize, per_class: usize, dim: usize, seed: u64) -> LabeledDataset {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    LabeledDataset::synthetic(classes, per_class, dim, 0.2, &mut rng)
}

fn backbone(dim: usize, classes: usize, seed: u64) -> FeedForwardNN {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    FeedForwardNN::new(dim, vec![16], classes, &mut rng)
}

fn one_episode(shape: EpisodeShape, seed: u64) -> Episode {
    let mut sampler =
        EpisodicSampler::seeded(clustered(10, 20, 8, seed), shape, TaskBudget::Unbounded, seed).unwrap();
    sampler.sample().unwrap()
}

#[test]
fn test_zero_steps_evaluates_unadapted_clone() {
    let shape = EpisodeShape::new(5, 1, 3).unwrap();
    let partition = shape.partition().unwrap();
    let episode = one_episode(shape, 1);

    let base = Maml::new(backbone(8, 5, 2), 0.5);
    let mut learner = base.clone_learner();
    let result = fast_adapt(&episode, &partition, &mut learner, &SoftmaxCrossEntropy, 0).unwrap();

    assert!(result.loss.is_finite());
    assert!((0.0..=1.0).contains(&result.accuracy));
    assert_eq!(learner.model().get_parameters(), base.model().get_parameters());

    // Same numbers as scoring the base directly on the query rows
    let (query, labels) = episode.select(partition.evaluation()).unwrap();
    let logits = base.predict(&query).unwrap();
    let expected_loss = SoftmaxCrossEntropy.loss(&logits, &labels).unwrap().value();
    assert_eq!(result.loss, expected_loss);
    assert_eq!(result.accuracy, accuracy(logits.values(), &labels).unwrap());
}

#[test]
fn test_adaptation_leaves_base_untouched() {
    let shape = EpisodeShape::new(5, 5, 5).unwrap();
    let partition = shape.partition().unwrap();
    let episode = one_episode(shape, 3);

    let base = MetaWrapping::Maml.wrap(backbone(8, 5, 4), 0.5);
    let before = base.model().get_parameters();

    let mut learner = base.clone_learner();
    fast_adapt(&episode, &partition, &mut learner, &SoftmaxCrossEntropy, 5).unwrap();

    assert_eq!(base.model().get_parameters(), before);
    assert_ne!(learner.model().get_parameters(), before);
}

#[test]
fn test_adaptation_reduces_support_loss() {
    let shape = EpisodeShape::new(5, 5, 5).unwrap();
    let partition = shape.partition().unwrap();
    let episode = one_episode(shape, 5);
    let (support, labels) = episode.select(partition.adaptation()).unwrap();

    let base = Maml::new(backbone(8, 5, 6), 0.1);
    let initial = SoftmaxCrossEntropy
        .loss(&base.predict(&support).unwrap(), &labels)
        .unwrap()
        .value();

    let mut learner = base.clone_learner();
    for _ in 0..20 {
        let loss = SoftmaxCrossEntropy.loss(&learner.predict(&support).unwrap(), &labels).unwrap();
        learner.adapt(&loss).unwrap();
    }
    let adapted = SoftmaxCrossEntropy
        .loss(&learner.predict(&support).unwrap(), &labels)
        .unwrap()
        .value();

    assert!(adapted < initial, "support loss {} did not drop below {}", adapted, initial);
}

#[test]
fn test_meta_sgd_uses_per_parameter_rates() {
    let model = backbone(8, 5, 7);
    let count = model.parameter_count();

    let learner = MetaSgd::new(model.clone(), META_SGD_INITIAL_RATE);
    assert_eq!(learner.learning_rates().len(), count);
    assert!(learner.learning_rates().iter().all(|&r| r == META_SGD_INITIAL_RATE));

    assert!(MetaSgd::with_rates(model.clone(), vec![0.1; count - 1]).is_err());

    // Zero step sizes freeze every parameter
    let frozen = MetaSgd::with_rates(model, vec![0.0; count]).unwrap();
    let before = frozen.model().get_parameters();
    let shape = EpisodeShape::new(5, 2, 2).unwrap();
    let mut clone = frozen.clone_learner();
    fast_adapt(&one_episode(shape, 8), &shape.partition().unwrap(), &mut clone, &SoftmaxCrossEntropy, 1).unwrap();
    assert_eq!(clone.model().get_parameters(), before);
}

#[test]
fn test_mismatched_partition_is_index_error() {
    let episode = one_episode(EpisodeShape::new(2, 1, 1).unwrap(), 9);
    let partition = IndexPartition::compute(5, 1, 3).unwrap();

    let mut learner = Maml::new(backbone(8, 5, 9), 0.1);
    let result = fast_adapt(&episode, &partition, &mut learner, &SoftmaxCrossEntropy, 1);

    assert!(matches!(result, Err(EpisodeError::IndexOutOfRange { len: 4, .. })));
}

#[test]
fn test_runner_records_every_episode() {
    let shape = EpisodeShape::new(5, 1, 3).unwrap();
    let sampler = EpisodicSampler::seeded(clustered(10, 20, 8, 10), shape, TaskBudget::Unbounded, 10).unwrap();

    let base = MetaWrapping::Maml.wrap(backbone(8, 5, 11), 0.1);
    let before = base.model().get_parameters();
    let criterion = SoftmaxCrossEntropy;

    let mut runner = EpisodeRunner::new(&base, &criterion, sampler, 3).unwrap();
    assert_eq!(runner.partition().adaptation(), &[0, 4, 8, 12, 16]);

    let mut seen = Vec::new();
    let outcome = runner.run_with(50, |i, _| seen.push(i)).unwrap();

    assert_eq!(outcome.len(), 50);
    assert_eq!(outcome.losses.len(), 50);
    assert_eq!(seen, (1..=50).collect::<Vec<_>>());
    assert!(outcome.accuracies.iter().all(|a| (0.0..=1.0).contains(a)));
    assert_eq!(base.model().get_parameters(), before);

    let summary = outcome.summary().unwrap();
    assert_eq!(summary.episodes, 50);
    assert!(summary.accuracy_ci.half_width(ConfidenceLevel::NinetyFive).unwrap()
        >= summary.accuracy_ci.half_width(ConfidenceLevel::Ninety).unwrap());
}

#[test]
fn test_runner_rejects_zero_episodes() {
    let shape = EpisodeShape::new(2, 1, 1).unwrap();
    let sampler = EpisodicSampler::seeded(clustered(4, 5, 8, 12), shape, TaskBudget::Unbounded, 12).unwrap();
    let base = Maml::new(backbone(8, 2, 12), 0.1);

    let mut runner = EpisodeRunner::new(&base, &SoftmaxCrossEntropy, sampler, 1).unwrap();
    assert!(matches!(runner.run(0), Err(EpisodeError::InvalidConfig(_))));
}

#[test]
fn test_parallel_run_is_reproducible() {
    let shape = EpisodeShape::new(3, 2, 2).unwrap();
    let base = MetaWrapping::MetaSgd.wrap(backbone(8, 3, 13), 0.0);
    let criterion = SoftmaxCrossEntropy;

    let make_runner = || {
        let sampler =
            EpisodicSampler::seeded(clustered(6, 10, 8, 13), shape, TaskBudget::Unbounded, 13).unwrap();
        EpisodeRunner::new(&base, &criterion, sampler, 1).unwrap()
    };

    let first = make_runner().run_parallel(24, 77).unwrap();
    let second = make_runner().run_parallel(24, 77).unwrap();

    assert_eq!(first.len(), 24);
    assert_eq!(first, second);
}

#[test]
fn test_runner_rejects_narrow_classifier_head() {
    let shape = EpisodeShape::new(5, 1, 1).unwrap();
    let sampler = EpisodicSampler::seeded(clustered(6, 4, 8, 14), shape, TaskBudget::Unbounded, 14).unwrap();
    let base = MetaWrapping::Maml.wrap(backbone(8, 2, 14), 0.1);
    assert_eq!(base.output_dim(), 2);

    let result = EpisodeRunner::new(&base, &SoftmaxCrossEntropy, sampler, 1);
    assert!(matches!(result, Err(EpisodeError::InvalidConfig(_))));
}

#[test]
fn test_runner_with_linear_backbone() {
    let shape = EpisodeShape::new(3, 2, 2).unwrap();
    let sampler = EpisodicSampler::seeded(clustered(6, 10, 8, 15), shape, TaskBudget::Unbounded, 15).unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(15);
    let base = Maml::new(LinearModel::new(8, 3, &mut rng), 0.5);
    let before = base.model().get_parameters();

    let mut runner = EpisodeRunner::new(&base, &SoftmaxCrossEntropy, sampler, 2).unwrap();
    let outcome = runner.run(10).unwrap();

    assert_eq!(outcome.len(), 10);
    assert!(outcome.losses.iter().all(|l| l.is_finite()));
    assert_eq!(base.model().get_parameters(), before);
}
