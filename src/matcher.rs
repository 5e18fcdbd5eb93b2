//! # Symptom Matcher
//! Pure, testable logic that maps a symptom selection → `PredictionResult`.
//! No I/O, no randomness; reads only the shared knowledge base.
//!
//! Policy: every disease gets a heuristic confidence from how much of its
//! symptom profile was reported, how much of the report it explains, and how
//! severe the matched symptoms are. Diseases are ranked by confidence; ties
//! keep knowledge-base order.

use std::sync::Arc;

use tracing::debug;

use crate::config::ScoringConfig;
use crate::error::PredictError;
use crate::knowledge::{normalize_symptom, Disease, KnowledgeBase, SeveritySummary};
use crate::logging::{anon_hash, dev_logging_enabled};
use crate::prediction::{Alternative, PredictionResult};

/// Highest severity weight; normalizes `avg + max` into [0, 1].
const SEVERITY_SCALE: f64 = 5.0;

/// Per-disease intermediate score, kept public for explainability in tests.
#[derive(Debug, Clone, PartialEq)]
pub struct DiseaseScore<'a> {
    pub disease: &'a Disease,
    pub confidence: f64,
    pub matching: Vec<String>,
    pub disease_coverage: f64,
    pub selection_coverage: f64,
    pub severity_score: f64,
}

#[derive(Debug, Clone)]
pub struct SymptomMatcher {
    kb: Arc<KnowledgeBase>,
    cfg: ScoringConfig,
}

impl SymptomMatcher {
    pub fn new(kb: Arc<KnowledgeBase>, cfg: ScoringConfig) -> Self {
        Self {
            kb,
            cfg: cfg.sanitized(),
        }
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.kb
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.cfg
    }

    /// Rank every disease against `selected` and return the best match.
    ///
    /// Fails with `InvalidInput` when nothing usable was selected or when more
    /// than `max_symptoms` distinct symptoms were sent. Unknown symptoms are not
    /// errors; they simply never match.
    pub fn predict<S: AsRef<str>>(&self, selected: &[S]) -> Result<PredictionResult, PredictError> {
        let selected = self.normalize_selection(selected)?;

        let mut ranked = self.rank(&selected);
        if ranked.first().map_or(true, |s| s.confidence <= 0.0) {
            debug!(target: "healthtrack::matcher", selected = selected.len(), "no disease overlaps the selection");
            return Ok(PredictionResult::unknown(self.cfg.min_confidence));
        }

        let alternatives = ranked
            .iter()
            .skip(1)
            .filter(|s| s.confidence > 0.0)
            .take(self.cfg.alternatives)
            .map(|s| Alternative {
                disease: s.disease.name.clone(),
                probability: s.confidence,
            })
            .collect();

        let best = ranked.swap_remove(0);
        if dev_logging_enabled() {
            debug!(
                target: "healthtrack::matcher",
                id = %anon_hash(&selected.join(",")),
                disease = %best.disease.name,
                confidence = best.confidence,
                "prediction"
            );
        }

        Ok(PredictionResult {
            disease: best.disease.name.clone(),
            confidence: best.confidence,
            matching_symptoms: best.matching,
            description: best.disease.description.clone(),
            precautions: self.kb.precautions_for(&best.disease.name),
            diet: best.disease.diet.clone(),
            alternatives,
        })
    }

    /// Score every disease and sort by confidence, descending and stable.
    pub fn rank<'a>(&'a self, selected: &[String]) -> Vec<DiseaseScore<'a>> {
        let mut scores: Vec<DiseaseScore<'a>> = self
            .kb
            .diseases()
            .iter()
            .map(|d| self.score_disease(d, selected))
            .collect();
        scores.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        scores
    }

    /// Confidence of one disease for an already-normalized, distinct selection.
    pub fn score_disease<'a>(&self, disease: &'a Disease, selected: &[String]) -> DiseaseScore<'a> {
        let c = &self.cfg;

        let matching: Vec<String> = selected
            .iter()
            .filter(|s| disease.symptoms.contains(s))
            .cloned()
            .collect();
        let match_count = matching.len() as f64;

        let disease_coverage = match_count / disease.symptoms.len().max(1) as f64;
        let selection_coverage = match_count / selected.len().max(1) as f64;

        let (total, max) = matching.iter().fold((0u32, 0u8), |(t, m), s| {
            let w = self.kb.severity_of(s);
            (t + w as u32, m.max(w))
        });
        let avg = if matching.is_empty() {
            0.0
        } else {
            total as f64 / match_count
        };
        let severity_score = (avg + max as f64) / (2.0 * SEVERITY_SCALE);

        let confidence = if matching.is_empty() {
            0.0
        } else {
            let coverage = c.disease_coverage_weight * disease_coverage
                + (1.0 - c.disease_coverage_weight) * selection_coverage;
            let weighted =
                c.coverage_weight * coverage + (1.0 - c.coverage_weight) * severity_score;

            let floored = weighted.max(c.match_floor);
            let scale = 1.0 + c.match_bonus * disease_coverage;
            (floored * scale).min(c.max_confidence).max(c.min_confidence)
        };

        DiseaseScore {
            disease,
            confidence,
            matching,
            disease_coverage,
            selection_coverage,
            severity_score,
        }
    }

    /// Severity of the selection exactly as `predict` sees it: normalized and
    /// deduplicated, with unlisted symptoms at the default weight.
    pub fn severity_summary<S: AsRef<str>>(&self, selected: &[S]) -> Result<SeveritySummary, PredictError> {
        let selected = self.normalize_selection(selected)?;
        Ok(self.kb.severity_summary(&selected))
    }

    /// Normalize, drop blanks, dedup (first occurrence wins) and bound the size.
    fn normalize_selection<S: AsRef<str>>(&self, selected: &[S]) -> Result<Vec<String>, PredictError> {
        let mut out: Vec<String> = Vec::with_capacity(selected.len());
        for s in selected.iter().map(|s| normalize_symptom(s.as_ref())) {
            if !s.is_empty() && !out.contains(&s) {
                out.push(s);
            }
        }

        if out.is_empty() {
            return Err(PredictError::InvalidInput(
                "Please select at least one symptom".to_string(),
            ));
        }
        if out.len() > self.cfg.max_symptoms {
            return Err(PredictError::InvalidInput(format!(
                "You can select up to {} symptoms",
                self.cfg.max_symptoms
            )));
        }
        Ok(out)
    }
}
