use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::activation::activation::{argmax, softmax};
use crate::dataset::schema::ClassSchema;
use crate::error::{Error, Result};

/// Per-class probabilities in schema order.
///
/// Serializes as a JSON object `{class_name: probability}` whose keys keep the
/// schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    entries: Vec<(String, f64)>,
}

impl Prediction {
    /// Softmax over `logits`. Any non-finite logit is an inference error, never
    /// a silently wrong distribution.
    pub fn from_logits(schema: &ClassSchema, logits: &[f64]) -> Result<Prediction> {
        if logits.len() != schema.len() {
            return Err(Error::Inference(format!(
                "model produced {} logits for {} classes",
                logits.len(),
                schema.len()
            )));
        }
        if let Some(i) = logits.iter().position(|z| !z.is_finite()) {
            return Err(Error::Inference(format!(
                "non-finite logit {} for class '{}'",
                logits[i],
                schema.names()[i]
            )));
        }
        let probs = softmax(logits);
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(Error::Inference("softmax produced non-finite probabilities".into()));
        }
        Ok(Prediction {
            entries: schema.names().iter().cloned().zip(probs).collect(),
        })
    }

    pub fn probability(&self, class: &str) -> Option<f64> {
        self.entries.iter().find(|(name, _)| name == class).map(|(_, p)| *p)
    }

    /// Most probable class and its probability.
    pub fn top(&self) -> (&str, f64) {
        let probs: Vec<f64> = self.entries.iter().map(|(_, p)| *p).collect();
        let (name, p) = &self.entries[argmax(&probs)];
        (name.as_str(), *p)
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(name, p)| (name.as_str(), *p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Prediction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, p) in &self.entries {
            map.serialize_entry(name, p)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ClassSchema {
        ClassSchema::new(["normal", "lesao"]).unwrap()
    }

    #[test]
    fn probabilities_form_a_distribution() {
        let p = Prediction::from_logits(&schema(), &[2.0, -1.0]).unwrap();
        let sum: f64 = p.iter().map(|(_, v)| v).sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert_eq!(p.top().0, "normal");
        assert!(p.probability("lesao").unwrap() < 0.5);
        assert_eq!(p.probability("other"), None);
    }

    #[test]
    fn nan_or_infinite_logits_are_inference_errors() {
        for bad in [[f64::NAN, 0.0], [0.0, f64::INFINITY]] {
            let err = Prediction::from_logits(&schema(), &bad).unwrap_err();
            assert!(matches!(err, Error::Inference(_)));
        }
    }

    #[test]
    fn serializes_as_ordered_object() {
        let schema = ClassSchema::new(["zeta", "alpha"]).unwrap();
        let p = Prediction::from_logits(&schema, &[0.0, 0.0]).unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(json, r#"{"zeta":0.5,"alpha":0.5}"#);
    }

    #[test]
    fn huge_logits_stay_finite() {
        let p = Prediction::from_logits(&schema(), &[1e300, -1e300]).unwrap();
        assert!((p.probability("normal").unwrap() - 1.0).abs() < 1e-12);
    }
}
