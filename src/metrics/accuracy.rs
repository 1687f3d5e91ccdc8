//! Classification accuracy

use ndarray::Array2;

use crate::machine_learning::core::ModelError;

/// Index of the largest score in each row.
///
/// Ties go to the first maximal index; NaN scores never win.
pub fn argmax_rows(scores: &Array2<f64>) -> Vec<usize> {
    scores
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            let mut best_score = f64::NEG_INFINITY;
            for (i, &score) in row.iter().enumerate() {
                if score > best_score {
                    best = i;
                    best_score = score;
                }
            }
            best
        })
        .collect()
}

/// Fraction of predicted classes that equal their targets
pub fn accuracy_from_predictions(predictions: &[usize], targets: &[usize]) -> Result<f64, ModelError> {
    if predictions.len() != targets.len() {
        return Err(ModelError::DimensionMismatch(format!(
            "{} predictions for {} targets",
            predictions.len(),
            targets.len()
        )));
    }
    if targets.is_empty() {
        return Err(ModelError::DimensionMismatch("no targets to score".to_string()));
    }

    let correct = predictions
        .iter()
        .zip(targets.iter())
        .filter(|(p, t)| p == t)
        .count();

    Ok(correct as f64 / targets.len() as f64)
}

/// Accuracy of argmax predictions over a batch of logits
pub fn accuracy(logits: &Array2<f64>, targets: &[usize]) -> Result<f64, ModelError> {
    accuracy_from_predictions(&argmax_rows(logits), targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_ties_resolve_to_first_index() {
        let scores = array![[1.0, 1.0, 0.0], [0.0, 2.0, 2.0], [f64::NAN, 0.5, 0.1]];
        assert_eq!(argmax_rows(&scores), vec![0, 1, 1]);
    }

    #[test]
    fn test_perfect_disjoint_and_partial() {
        let logits = array![[3.0, 0.0], [0.0, 3.0], [3.0, 0.0], [0.0, 3.0]];

        assert_eq!(accuracy(&logits, &[0, 1, 0, 1]).unwrap(), 1.0);
        assert_eq!(accuracy(&logits, &[1, 0, 1, 0]).unwrap(), 0.0);
        assert_eq!(accuracy(&logits, &[0, 1, 1, 1]).unwrap(), 0.75);
    }

    #[test]
    fn test_length_mismatch() {
        let logits = array![[1.0, 0.0]];
        assert!(accuracy(&logits, &[0, 1]).is_err());
        assert!(accuracy_from_predictions(&[], &[]).is_err());
    }
}
