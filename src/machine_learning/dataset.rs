use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use std::collections::BTreeMap;
use std::path::Path;
use std::fs::File;
use std::io::{BufRead, BufReader};

/// Mapping from class label to the ordered row indices holding that label
pub type ClassIndex = BTreeMap<usize, Vec<usize>>;

#[derive(Debug)]
pub enum DatasetError {
    IndexOutOfBounds(usize, usize),
    DimensionMismatch(String),
    Parse(String),
    IOError(std::io::Error),
}

impl std::fmt::Display for DatasetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DatasetError::IndexOutOfBounds(idx, len) =>
                write!(f, "Index {} out of bounds for dataset of length {}", idx, len),
            DatasetError::DimensionMismatch(msg) =>
                write!(f, "Dimension mismatch: {}", msg),
            DatasetError::Parse(msg) =>
                write!(f, "Parse error: {}", msg),
            DatasetError::IOError(err) =>
                write!(f, "IO error: {}", err),
        }
    }
}

impl std::error::Error for DatasetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DatasetError::IOError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DatasetError {
    fn from(err: std::io::Error) -> Self {
        DatasetError::IOError(err)
    }
}

/// Trait representing a labelled classification dataset
pub trait Dataset {
    /// Get the number of samples in the dataset
    fn len(&self) -> usize;

    /// Check if the dataset is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Width of every input row
    fn feature_dim(&self) -> usize;

    /// Class label of a single sample
    fn label(&self, index: usize) -> Result<usize, DatasetError>;

    /// Get a single sample
    fn get_sample(&self, index: usize) -> Result<(Array1<f64>, usize), DatasetError>;

    /// Get a batch of samples, rows in the order of `indices`
    fn get_batch(&self, indices: &[usize]) -> Result<(Array2<f64>, Vec<usize>), DatasetError>;

    /// Group sample indices by label
    fn class_index(&self) -> Result<ClassIndex, DatasetError> {
        let mut index = ClassIndex::new();
        for i in 0..self.len() {
            index.entry(self.label(i)?).or_default().push(i);
        }
        Ok(index)
    }
}

/// In-memory dataset of feature rows with integer class labels
#[derive(Debug, Clone)]
pub struct LabeledDataset {
    features: Array2<f64>,
    labels: Vec<usize>,
}

impl LabeledDataset {
    /// Create a new dataset from a feature matrix and one label per row
    pub fn new(features: Array2<f64>, labels: Vec<usize>) -> Result<Self, DatasetError> {
        if features.nrows() != labels.len() {
            return Err(DatasetError::DimensionMismatch(format!(
                "Number of feature rows ({}) does not match number of labels ({})",
                features.nrows(),
                labels.len()
            )));
        }

        Ok(LabeledDataset { features, labels })
    }

    /// Load a dataset from a delimited text file
    pub fn from_csv<P: AsRef<Path>>(
        path: P,
        has_header: bool,
        feature_cols: &[usize],
        label_col: usize,
        delimiter: char,
    ) -> Result<Self, DatasetError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        // Skip header if needed
        if has_header {
            lines.next();
        }

        let mut features_data = Vec::new();
        let mut labels = Vec::new();

        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let values: Vec<&str> = line.split(delimiter).map(str::trim).collect();

            let field = |col: usize| {
                values.get(col).copied().ok_or_else(|| {
                    DatasetError::Parse(format!("line {}: column {} out of bounds", line_no + 1, col))
                })
            };

            for &col in feature_cols {
                let raw = field(col)?;
                let value = raw.parse::<f64>().map_err(|e| {
                    DatasetError::Parse(format!("line {}: feature {:?}: {}", line_no + 1, raw, e))
                })?;
                features_data.push(value);
            }

            let raw = field(label_col)?;
            let label = raw.parse::<usize>().map_err(|e| {
                DatasetError::Parse(format!("line {}: label {:?}: {}", line_no + 1, raw, e))
            })?;
            labels.push(label);
        }

        let features = Array2::from_shape_vec((labels.len(), feature_cols.len()), features_data)
            .map_err(|e| DatasetError::DimensionMismatch(e.to_string()))?;

        Ok(LabeledDataset { features, labels })
    }

    /// Gaussian-ish clusters, one centre per class, for demos and tests
    pub fn synthetic<R: Rng + ?Sized>(
        num_classes: usize,
        per_class: usize,
        feature_dim: usize,
        spread: f64,
        rng: &mut R,
    ) -> Self {
        let mut data = Vec::with_capacity(num_classes * per_class * feature_dim);
        let mut labels = Vec::with_capacity(num_classes * per_class);

        for class in 0..num_classes {
            let centre: Vec<f64> = (0..feature_dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            for _ in 0..per_class {
                data.extend(centre.iter().map(|c| c + spread * (rng.gen::<f64>() - 0.5)));
                labels.push(class);
            }
        }

        let features = Array2::from_shape_vec((labels.len(), feature_dim), data)
            .unwrap_or_else(|_| Array2::zeros((0, feature_dim)));

        LabeledDataset { features, labels }
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    /// Number of distinct labels
    pub fn num_classes(&self) -> usize {
        let mut seen: Vec<usize> = self.labels.clone();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }

    /// Normalize features using z-score (mean=0, std=1)
    pub fn normalize_z_score(&mut self) {
        let n_samples = self.features.nrows();
        if n_samples == 0 {
            return;
        }

        for mut column in self.features.columns_mut() {
            let mean = column.sum() / n_samples as f64;
            let std_dev = (column.mapv(|x| (x - mean).powi(2)).sum() / n_samples as f64).sqrt();

            if std_dev > 1e-10 {
                column.mapv_inplace(|x| (x - mean) / std_dev);
            }
        }
    }
}

impl Dataset for LabeledDataset {
    fn len(&self) -> usize {
        self.labels.len()
    }

    fn feature_dim(&self) -> usize {
        self.features.ncols()
    }

    fn label(&self, index: usize) -> Result<usize, DatasetError> {
        self.labels
            .get(index)
            .copied()
            .ok_or(DatasetError::IndexOutOfBounds(index, self.len()))
    }

    fn get_sample(&self, index: usize) -> Result<(Array1<f64>, usize), DatasetError> {
        let label = self.label(index)?;
        Ok((self.features.row(index).to_owned(), label))
    }

    fn get_batch(&self, indices: &[usize]) -> Result<(Array2<f64>, Vec<usize>), DatasetError> {
        if let Some(&idx) = indices.iter().find(|&&idx| idx >= self.len()) {
            return Err(DatasetError::IndexOutOfBounds(idx, self.len()));
        }

        let batch_features = self.features.select(Axis(0), indices);
        let batch_labels = indices.iter().map(|&idx| self.labels[idx]).collect();

        Ok((batch_features, batch_labels))
    }

    fn class_index(&self) -> Result<ClassIndex, DatasetError> {
        let mut index = ClassIndex::new();
        for (i, &label) in self.labels.iter().enumerate() {
            index.entry(label).or_default().push(i);
        }
        Ok(index)
    }
}
