//! Plain-text reports derived from a [`Prediction`].

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::inference::prediction::Prediction;

/// Lesion probability at or above which risk is at least moderate.
pub const MODERATE_RISK_THRESHOLD: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Moderate => write!(f, "moderate"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    /// Class whose probability drives the risk level.
    pub lesion_class: String,
    pub high_risk_threshold: f64,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            lesion_class: "lesao".to_owned(),
            high_risk_threshold: 0.7,
        }
    }
}

impl ReportOptions {
    pub fn validate(&self) -> Result<()> {
        let t = self.high_risk_threshold;
        if !(MODERATE_RISK_THRESHOLD..=1.0).contains(&t) {
            return Err(Error::config(format!(
                "high-risk threshold must be in [{}, 1], got {}",
                MODERATE_RISK_THRESHOLD, t
            )));
        }
        Ok(())
    }

    /// Probability of the lesion class; 0 when the schema has no such class.
    pub fn lesion_probability(&self, prediction: &Prediction) -> f64 {
        prediction.probability(&self.lesion_class).unwrap_or(0.0)
    }

    pub fn risk(&self, prediction: &Prediction) -> RiskLevel {
        let p = self.lesion_probability(prediction);
        if p >= self.high_risk_threshold {
            RiskLevel::High
        } else if p >= MODERATE_RISK_THRESHOLD {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }
}

pub fn clinician_report(prediction: &Prediction, options: &ReportOptions) -> String {
    let (top, top_p) = prediction.top();
    let lesion = options.lesion_probability(prediction);
    [
        "Technical report - automated assessment".to_owned(),
        format!("Most probable class: {} ({:.1}%).", top, top_p * 100.0),
        format!(
            "Lesion probability: {:.1}%. Estimated risk: {}.",
            lesion * 100.0,
            options.risk(prediction)
        ),
        "Recommendations:".to_owned(),
        "- Correlate with the clinical picture and the patient's history.".to_owned(),
        "- Compare with previous exams, if available.".to_owned(),
        "- Consider complementary exams if the clinical picture is not explained.".to_owned(),
        String::new(),
        "Note: result produced by a supervised algorithm. Confirm findings in clinical discussion."
            .to_owned(),
    ]
    .join("\n")
}

pub fn patient_report(prediction: &Prediction, options: &ReportOptions) -> String {
    let lesion = options.lesion_probability(prediction);
    [
        "Patient report - plain language".to_owned(),
        format!(
            "The analyzed images indicate a {:.1}% chance of a lesion.",
            lesion * 100.0
        ),
        format!(
            "This means the suggested level of attention is {}.",
            options.risk(prediction)
        ),
        "Recommended next step:".to_owned(),
        "- Book an appointment with your doctor to discuss the result.".to_owned(),
        "- Bring this report and mention any recent symptom or change.".to_owned(),
        String::new(),
        "Important: this result complements, but does not replace, an in-person medical evaluation."
            .to_owned(),
    ]
    .join("\n")
}

/// Writes `clinician_report.txt` and `patient_report.txt` into `dir`.
pub fn write_reports(dir: &Path, prediction: &Prediction, options: &ReportOptions) -> Result<(PathBuf, PathBuf)> {
    options.validate()?;
    fs::create_dir_all(dir)?;
    let clinician = dir.join("clinician_report.txt");
    let patient = dir.join("patient_report.txt");
    fs::write(&clinician, clinician_report(prediction, options))?;
    fs::write(&patient, patient_report(prediction, options))?;
    Ok((clinician, patient))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::schema::ClassSchema;
    use tempfile::TempDir;

    /// Prediction with P(lesao) = p.
    fn prediction(p: f64) -> Prediction {
        let schema = ClassSchema::new(["normal", "lesao"]).unwrap();
        Prediction::from_logits(&schema, &[0.0, (p / (1.0 - p)).ln()]).unwrap()
    }

    #[test]
    fn risk_thresholds() {
        let opts = ReportOptions::default();
        assert_eq!(opts.risk(&prediction(0.9)), RiskLevel::High);
        assert_eq!(opts.risk(&prediction(0.7001)), RiskLevel::High);
        assert_eq!(opts.risk(&prediction(0.55)), RiskLevel::Moderate);
        assert_eq!(opts.risk(&prediction(0.2)), RiskLevel::Low);
    }

    #[test]
    fn unknown_lesion_class_counts_as_zero() {
        let opts = ReportOptions {
            lesion_class: "tumor".into(),
            ..ReportOptions::default()
        };
        assert_eq!(opts.risk(&prediction(0.99)), RiskLevel::Low);
    }

    #[test]
    fn reports_mention_probability_and_risk() {
        let opts = ReportOptions::default();
        let p = prediction(0.8);
        let clinician = clinician_report(&p, &opts);
        assert!(clinician.contains("Most probable class: lesao (80.0%)"));
        assert!(clinician.contains("Estimated risk: high"));
        let patient = patient_report(&p, &opts);
        assert!(patient.contains("80.0% chance"));
        assert!(patient.contains("attention is high"));
    }

    #[test]
    fn writes_both_files() {
        let dir = TempDir::new().unwrap();
        let (c, p) = write_reports(dir.path(), &prediction(0.3), &ReportOptions::default()).unwrap();
        assert!(fs::read_to_string(c).unwrap().contains("risk: low"));
        assert!(fs::read_to_string(p).unwrap().contains("attention is low"));
    }

    #[test]
    fn rejects_threshold_below_moderate() {
        let opts = ReportOptions {
            high_risk_threshold: 0.2,
            ..ReportOptions::default()
        };
        assert!(write_reports(Path::new("unused"), &prediction(0.5), &opts).is_err());
    }
}
