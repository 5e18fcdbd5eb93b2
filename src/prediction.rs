//! prediction.rs: output shape of the symptom matcher.
//!
//! Flattened into the `/api/predict` response body; the storage layer
//! only ever keeps `summary()` of it.

use serde::{Deserialize, Serialize};

pub const UNKNOWN_DISEASE: &str = "Unknown";

/// A runner-up disease and its own confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub disease: String,
    pub probability: f64,
}

/// Best match for one symptom selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResult {
    pub disease: String,
    /// Heuristic score, never below the configured floor.
    pub confidence: f64,
    /// Selected symptoms (normalized, caller order) that the disease lists.
    pub matching_symptoms: Vec<String>,
    pub description: String,
    pub precautions: Vec<String>,
    pub diet: Vec<String>,
    #[serde(default)]
    pub alternatives: Vec<Alternative>,
}

impl PredictionResult {
    /// Sentinel returned when no disease shares a single symptom with the input.
    pub fn unknown(confidence: f64) -> Self {
        Self {
            disease: UNKNOWN_DISEASE.to_string(),
            confidence,
            matching_symptoms: Vec::new(),
            description: "Unable to determine disease based on provided symptoms.".to_string(),
            precautions: vec![
                "Consult a healthcare professional for proper diagnosis".to_string(),
                "Monitor your symptoms closely".to_string(),
                "Keep track of any changes in your condition".to_string(),
            ],
            diet: vec![
                "Maintain a balanced diet".to_string(),
                "Stay hydrated".to_string(),
                "Include fruits and vegetables in your meals".to_string(),
            ],
            alternatives: Vec::new(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.disease == UNKNOWN_DISEASE
    }

    /// Confidence as a whole percentage, as shown to users.
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence * 100.0).round().clamp(0.0, 100.0) as u32
    }

    /// One-line summary persisted into a health record's notes.
    pub fn summary(&self) -> String {
        format!(
            "Disease prediction: {} ({}% confidence)",
            self.disease,
            self.confidence_percent()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_shape_uses_camel_case_fields() {
        let mut r = PredictionResult::unknown(0.01);
        r.alternatives.push(Alternative {
            disease: "Migraine".into(),
            probability: 0.4,
        });
        let v = serde_json::to_value(&r).unwrap();

        for key in [
            "disease",
            "confidence",
            "matchingSymptoms",
            "description",
            "precautions",
            "diet",
            "alternatives",
        ] {
            assert!(v.get(key).is_some(), "missing '{key}' in {v}");
        }
        assert_eq!(v["alternatives"][0]["disease"], serde_json::json!("Migraine"));
    }

    #[test]
    fn summary_rounds_to_whole_percent() {
        let mut r = PredictionResult::unknown(0.01);
        r.disease = "Common Cold".into();
        r.confidence = 0.8765;
        assert_eq!(r.summary(), "Disease prediction: Common Cold (88% confidence)");
    }

    #[test]
    fn sentinel_is_recognized() {
        let r = PredictionResult::unknown(0.01);
        assert!(r.is_unknown());
        assert!(r.matching_symptoms.is_empty());
        assert!(!r.precautions.is_empty());
    }
}
