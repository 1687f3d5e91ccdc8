//! Balanced N-way K-shot episode sampling

use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::episodic::partition::EpisodeShape;
use crate::error::{EpisodeError, Result};
use crate::machine_learning::dataset::{ClassIndex, Dataset};

/// How many distinct tasks a sampler can hand out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskBudget {
    /// Every call draws a fresh task
    Unbounded,
    /// A fixed pool of tasks drawn once at construction, sampled from thereafter
    Fixed(usize),
}

impl TaskBudget {
    /// Interprets the conventional `num_tasks` setting, where `-1` means unbounded
    pub fn from_num_tasks(num_tasks: i64) -> Result<Self> {
        match num_tasks {
            -1 => Ok(TaskBudget::Unbounded),
            n if n > 0 => Ok(TaskBudget::Fixed(n as usize)),
            n => Err(EpisodeError::InvalidConfig(format!(
                "num_tasks must be -1 or positive, got {}",
                n
            ))),
        }
    }
}

/// One materialized episode.
///
/// Rows are grouped by class in draw order, `shot + query` rows per class.
/// `labels` are the per-episode labels `0..way`; `classes[l]` is the dataset
/// label behind episode label `l`.
#[derive(Debug, Clone)]
pub struct Episode {
    shape: EpisodeShape,
    inputs: Array2<f64>,
    labels: Vec<usize>,
    classes: Vec<usize>,
}

impl Episode {
    pub fn shape(&self) -> EpisodeShape {
        self.shape
    }

    pub fn inputs(&self) -> &Array2<f64> {
        &self.inputs
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Dataset label behind each episode label
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Rows and labels at the given positions
    pub fn select(&self, indices: &[usize]) -> Result<(Array2<f64>, Vec<usize>)> {
        if let Some(&index) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(EpisodeError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }

        let inputs = self.inputs.select(Axis(0), indices);
        let labels = indices.iter().map(|&i| self.labels[i]).collect();
        Ok((inputs, labels))
    }
}

/// Dataset rows and classes that make up one task, before materialization
#[derive(Debug, Clone)]
struct TaskDescription {
    rows: Vec<usize>,
    classes: Vec<usize>,
}

/// Draws episodes from a labelled dataset.
///
/// Classes with fewer than `shot + query` examples are dropped at construction.
/// Each task picks `way` distinct classes and `shot + query` distinct examples
/// from each of them, uniformly and without replacement.
pub struct EpisodicSampler<D, R = ChaCha8Rng> {
    dataset: D,
    shape: EpisodeShape,
    budget: TaskBudget,
    class_index: ClassIndex,
    classes: Vec<usize>,
    tasks: Vec<TaskDescription>,
    rng: R,
}

impl<D: Dataset> EpisodicSampler<D, ChaCha8Rng> {
    /// Creates a sampler driven by a `ChaCha8Rng` seeded with `seed`
    pub fn seeded(dataset: D, shape: EpisodeShape, budget: TaskBudget, seed: u64) -> Result<Self> {
        Self::new(dataset, shape, budget, ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<D: Dataset, R: Rng> EpisodicSampler<D, R> {
    pub fn new(dataset: D, shape: EpisodeShape, budget: TaskBudget, mut rng: R) -> Result<Self> {
        shape.validate()?;
        if budget == TaskBudget::Fixed(0) {
            return Err(EpisodeError::InvalidConfig("task budget must be positive".to_string()));
        }

        let min_examples = shape.examples_per_class();
        let mut class_index = dataset.class_index()?;
        let total_classes = class_index.len();

        class_index.retain(|label, rows| {
            let keep = rows.len() >= min_examples;
            if !keep {
                debug!(label, examples = rows.len(), min_examples, "dropping class");
            }
            keep
        });

        if class_index.len() < shape.way {
            return Err(EpisodeError::InsufficientClassSamples {
                required: shape.way,
                available: class_index.len(),
                min_examples,
            });
        }

        let classes: Vec<usize> = class_index.keys().copied().collect();
        info!(
            "{} of {} classes qualify for {} episodes",
            classes.len(),
            total_classes,
            shape
        );

        let tasks = match budget {
            TaskBudget::Unbounded => Vec::new(),
            TaskBudget::Fixed(n) => {
                debug!(tasks = n, "drawing fixed task pool");
                (0..n)
                    .map(|_| draw_task(&class_index, &classes, shape, &mut rng))
                    .collect()
            }
        };

        Ok(EpisodicSampler {
            dataset,
            shape,
            budget,
            class_index,
            classes,
            tasks,
            rng,
        })
    }

    /// Draws the next episode from the sampler's own random source
    pub fn sample(&mut self) -> Result<Episode> {
        let task = self.pick_task_with_own_rng();
        self.materialize(&task)
    }

    /// Endless stream of episodes; each item draws fresh randomness
    pub fn episodes(&mut self) -> impl Iterator<Item = Result<Episode>> + '_ {
        std::iter::from_fn(move || Some(self.sample()))
    }

    fn pick_task_with_own_rng(&mut self) -> TaskDescription {
        let EpisodicSampler {
            class_index,
            classes,
            tasks,
            shape,
            rng,
            ..
        } = self;
        pick_task(class_index, classes, tasks, *shape, rng)
    }
}

impl<D: Dataset, R> EpisodicSampler<D, R> {
    /// Draws an episode from a caller-supplied random source.
    ///
    /// Leaves the sampler untouched, so independent streams can sample from
    /// the same sampler concurrently.
    pub fn sample_with<G: Rng + ?Sized>(&self, rng: &mut G) -> Result<Episode> {
        let task = pick_task(&self.class_index, &self.classes, &self.tasks, self.shape, rng);
        self.materialize(&task)
    }

    pub fn shape(&self) -> EpisodeShape {
        self.shape
    }

    pub fn budget(&self) -> TaskBudget {
        self.budget
    }

    /// Dataset labels that can appear in an episode
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    fn materialize(&self, task: &TaskDescription) -> Result<Episode> {
        let (inputs, _) = self.dataset.get_batch(&task.rows)?;
        let per_class = self.shape.examples_per_class();
        let labels = (0..self.shape.way)
            .flat_map(|label| std::iter::repeat(label).take(per_class))
            .collect();

        Ok(Episode {
            shape: self.shape,
            inputs,
            labels,
            classes: task.classes.clone(),
        })
    }
}

fn pick_task<G: Rng + ?Sized>(
    class_index: &ClassIndex,
    classes: &[usize],
    tasks: &[TaskDescription],
    shape: EpisodeShape,
    rng: &mut G,
) -> TaskDescription {
    match tasks.choose(rng) {
        Some(task) => task.clone(),
        None => draw_task(class_index, classes, shape, rng),
    }
}

fn draw_task<G: Rng + ?Sized>(
    class_index: &ClassIndex,
    classes: &[usize],
    shape: EpisodeShape,
    rng: &mut G,
) -> TaskDescription {
    let chosen: Vec<usize> = classes.choose_multiple(rng, shape.way).copied().collect();
    let mut rows = Vec::with_capacity(shape.total_examples());

    for class in &chosen {
        // Construction guarantees every retained class has enough rows
        let pool = &class_index[class];
        rows.extend(pool.choose_multiple(rng, shape.examples_per_class()).copied());
    }

    TaskDescription {
        rows,
        classes: chosen,
    }
}
