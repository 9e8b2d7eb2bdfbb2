use serde::{Deserialize, Serialize};

use crate::dataset::schema::ClassSchema;

/// `counts[truth][predicted]`, rows and columns in schema order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub classes: Vec<String>,
    pub counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(schema: &ClassSchema) -> ConfusionMatrix {
        let n = schema.len();
        ConfusionMatrix {
            classes: schema.names().to_vec(),
            counts: vec![vec![0; n]; n],
        }
    }

    pub fn record(&mut self, truth: usize, predicted: usize) {
        self.counts[truth][predicted] += 1;
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn correct(&self) -> usize {
        (0..self.counts.len()).map(|i| self.counts[i][i]).sum()
    }

    pub fn accuracy(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            n => self.correct() as f64 / n as f64,
        }
    }

    /// `None` when the class was never predicted.
    pub fn precision(&self, class: usize) -> Option<f64> {
        let predicted: usize = self.counts.iter().map(|row| row[class]).sum();
        (predicted > 0).then(|| self.counts[class][class] as f64 / predicted as f64)
    }

    /// `None` when the class never occurs.
    pub fn recall(&self, class: usize) -> Option<f64> {
        let support = self.support(class);
        (support > 0).then(|| self.counts[class][class] as f64 / support as f64)
    }

    pub fn support(&self, class: usize) -> usize {
        self.counts[class].iter().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: String,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub support: usize,
}

/// Result of one full pass over a labeled split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub split: String,
    /// Mean cross-entropy over every decoded example.
    pub loss: f64,
    pub accuracy: f64,
    pub examples: usize,
    pub skipped: usize,
    pub confusion: ConfusionMatrix,
    pub per_class: Vec<ClassMetrics>,
}

impl EvaluationReport {
    pub fn new(split: impl Into<String>, total_loss: f64, skipped: usize, confusion: ConfusionMatrix) -> EvaluationReport {
        let examples = confusion.total();
        let per_class = confusion
            .classes
            .iter()
            .enumerate()
            .map(|(i, name)| ClassMetrics {
                class: name.clone(),
                precision: confusion.precision(i),
                recall: confusion.recall(i),
                support: confusion.support(i),
            })
            .collect();
        EvaluationReport {
            split: split.into(),
            loss: if examples == 0 { 0.0 } else { total_loss / examples as f64 },
            accuracy: confusion.accuracy(),
            examples,
            skipped,
            confusion,
            per_class,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> ConfusionMatrix {
        let schema = ClassSchema::new(["normal", "lesao"]).unwrap();
        let mut m = ConfusionMatrix::new(&schema);
        // 3 normal: 2 right, 1 called lesao. 2 lesao: both right.
        m.record(0, 0);
        m.record(0, 0);
        m.record(0, 1);
        m.record(1, 1);
        m.record(1, 1);
        m
    }

    #[test]
    fn accuracy_precision_recall() {
        let m = matrix();
        assert_eq!(m.total(), 5);
        assert!((m.accuracy() - 0.8).abs() < 1e-12);
        assert_eq!(m.precision(0), Some(1.0));
        assert!((m.recall(0).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.precision(1).unwrap() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.recall(1), Some(1.0));
    }

    #[test]
    fn report_uses_example_weighted_loss() {
        let report = EvaluationReport::new("val", 2.5, 1, matrix());
        assert_eq!(report.examples, 5);
        assert!((report.loss - 0.5).abs() < 1e-12);
        assert_eq!(report.per_class[1].support, 2);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn undefined_ratios_are_none() {
        let schema = ClassSchema::new(["a", "b"]).unwrap();
        let mut m = ConfusionMatrix::new(&schema);
        m.record(0, 0);
        assert_eq!(m.precision(1), None);
        assert_eq!(m.recall(1), None);
    }
}
