//! # Knowledge Base
//!
//! Static disease table and symptom severities consumed by the matcher.
//!
//! - Loads from a TOML file (`[[diseases]]` tables + `[severity]` map).
//! - Falls back to the built-in `default_seed()` when the file is missing or broken.
//! - All symptom names are normalized (trimmed, lower-case, `_`/`-` as spaces)
//!   and deduplicated at load time, so lookups never re-normalize the table side.
//! - Immutable after construction; share it behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};
use tracing::{info, warn};

/// Used whenever a disease carries no precautions of its own.
pub const GENERIC_PRECAUTIONS: [&str; 4] = [
    "Consult a healthcare professional",
    "Get adequate rest",
    "Stay hydrated",
    "Follow prescribed medications",
];

const DEFAULT_SEVERITY: u8 = 1;
const MIN_SEVERITY: u8 = 1;
const MAX_SEVERITY: u8 = 5;

/// One row of the disease table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disease {
    pub name: String,
    /// Ordered, normalized, distinct.
    pub symptoms: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub precautions: Vec<String>,
    #[serde(default, alias = "dietRecommendations")]
    pub diet: Vec<String>,
}

/// Overall severity bucket of a symptom selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeverityLevel {
    Mild,
    Moderate,
    Severe,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeveritySummary {
    pub average: f64,
    pub max: u8,
    pub level: SeverityLevel,
}

/// A vocabulary entry as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomInfo {
    pub name: String,
    pub severity: u8,
    pub category: &'static str,
}

/// File shape of `config/knowledge.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
struct KnowledgeFile {
    #[serde(default)]
    diseases: Vec<Disease>,
    #[serde(default)]
    severity: HashMap<String, i64>,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    diseases: Vec<Disease>,
    severity: HashMap<String, u8>,
}

impl KnowledgeBase {
    /// Build from raw parts, normalizing and deduplicating everything.
    /// Later diseases with an already-seen name are dropped.
    pub fn new(diseases: Vec<Disease>, severity: HashMap<String, i64>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::with_capacity(diseases.len());
        for mut d in diseases {
            d.name = d.name.trim().to_string();
            if d.name.is_empty() || !seen.insert(d.name.to_lowercase()) {
                continue;
            }
            let mut symptoms: Vec<String> = Vec::with_capacity(d.symptoms.len());
            for s in d.symptoms.iter().map(|s| normalize_symptom(s)) {
                if !s.is_empty() && !symptoms.contains(&s) {
                    symptoms.push(s);
                }
            }
            if symptoms.is_empty() {
                warn!(target: "healthtrack::knowledge", disease = %d.name, "disease without symptoms skipped");
                continue;
            }
            d.symptoms = symptoms;
            out.push(d);
        }

        let severity = severity
            .into_iter()
            .filter_map(|(k, v)| {
                let k = normalize_symptom(&k);
                (!k.is_empty()).then(|| (k, v.clamp(MIN_SEVERITY as i64, MAX_SEVERITY as i64) as u8))
            })
            .collect();

        Self {
            diseases: out,
            severity,
        }
    }

    /// Load from a TOML file. Falls back to `default_seed()` on any error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let kb = fs::read_to_string(path)
            .map_err(anyhow::Error::from)
            .and_then(|s| Self::from_toml_str(&s));
        match kb {
            Ok(kb) if !kb.diseases.is_empty() => {
                info!(
                    target: "healthtrack::knowledge",
                    path = %path.display(),
                    diseases = kb.diseases.len(),
                    severities = kb.severity.len(),
                    "knowledge base loaded"
                );
                kb
            }
            Ok(_) => {
                warn!(target: "healthtrack::knowledge", path = %path.display(), "knowledge file has no diseases, using built-in seed");
                Self::default_seed()
            }
            Err(e) => {
                warn!(target: "healthtrack::knowledge", path = %path.display(), error = %e, "knowledge file unusable, using built-in seed");
                Self::default_seed()
            }
        }
    }

    /// Load from a TOML string.
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let file: KnowledgeFile = toml::from_str(s)?;
        Ok(Self::new(file.diseases, file.severity))
    }

    pub fn diseases(&self) -> &[Disease] {
        &self.diseases
    }

    pub fn disease_names(&self) -> Vec<&str> {
        self.diseases.iter().map(|d| d.name.as_str()).collect()
    }

    /// Case-insensitive lookup by name.
    pub fn disease(&self, name: &str) -> Option<&Disease> {
        let name = name.trim();
        self.diseases
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Precautions for a disease, or the generic list when unknown or empty.
    pub fn precautions_for(&self, name: &str) -> Vec<String> {
        match self.disease(name) {
            Some(d) if !d.precautions.is_empty() => d.precautions.clone(),
            _ => GENERIC_PRECAUTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Severity weight of an already-normalized symptom (1 when unknown).
    pub fn severity_of(&self, symptom: &str) -> u8 {
        self.severity
            .get(symptom)
            .copied()
            .unwrap_or(DEFAULT_SEVERITY)
    }

    /// Aggregate severity of a selection.
    pub fn severity_summary<S: AsRef<str>>(&self, symptoms: &[S]) -> SeveritySummary {
        let weights: Vec<u8> = symptoms
            .iter()
            .map(|s| normalize_symptom(s.as_ref()))
            .filter(|s| !s.is_empty())
            .map(|s| self.severity_of(&s))
            .collect();

        let max = weights.iter().copied().max().unwrap_or(0);
        let average = if weights.is_empty() {
            0.0
        } else {
            weights.iter().map(|&w| w as f64).sum::<f64>() / weights.len() as f64
        };

        let level = if average > 5.0 || max >= 7 {
            SeverityLevel::Severe
        } else if average > 3.0 || max >= 5 {
            SeverityLevel::Moderate
        } else {
            SeverityLevel::Mild
        };

        SeveritySummary {
            average,
            max,
            level,
        }
    }

    /// Sorted, distinct vocabulary: every disease symptom plus every severity key.
    pub fn symptoms(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .diseases
            .iter()
            .flat_map(|d| d.symptoms.iter().cloned())
            .chain(self.severity.keys().cloned())
            .collect();
        all.sort();
        all.dedup();
        all
    }

    pub fn symptom_infos(&self) -> Vec<SymptomInfo> {
        self.symptoms()
            .into_iter()
            .map(|name| SymptomInfo {
                severity: self.severity_of(&name),
                category: category_of(&name),
                name,
            })
            .collect()
    }

    /// Symptoms ordered by how many diseases list them; ties alphabetical.
    pub fn common_symptoms(&self, limit: usize) -> Vec<String> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for d in &self.diseases {
            for s in &d.symptoms {
                *counts.entry(s.as_str()).or_default() += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(s, _)| s.to_string())
            .collect()
    }

    /// Vocabulary search: substring hits first (alphabetical), then close
    /// spellings ranked by Jaro-Winkler similarity.
    pub fn search(&self, query: &str, limit: usize) -> Vec<String> {
        let q = normalize_symptom(query);
        let vocab = self.symptoms();
        if q.is_empty() {
            return vocab.into_iter().take(limit).collect();
        }

        let (mut hits, rest): (Vec<String>, Vec<String>) =
            vocab.into_iter().partition(|s| s.contains(&q));

        let mut fuzzy: Vec<(f64, String)> = rest
            .into_iter()
            .map(|s| (strsim::jaro_winkler(&q, &s), s))
            .filter(|(score, _)| *score >= FUZZY_MIN_SIMILARITY)
            .collect();
        fuzzy.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        hits.extend(fuzzy.into_iter().map(|(_, s)| s));
        hits.truncate(limit);
        hits
    }

    /// Built-in table with the five reference diseases and thirty severities.
    pub fn default_seed() -> Self {
        fn disease(
            name: &str,
            symptoms: &[&str],
            description: &str,
            precautions: &[&str],
            diet: &[&str],
        ) -> Disease {
            let own = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
            Disease {
                name: name.to_string(),
                symptoms: own(symptoms),
                description: description.to_string(),
                precautions: own(precautions),
                diet: own(diet),
            }
        }

        let diseases = vec![
            disease(
                "Common Cold",
                &["cough", "sore throat", "runny nose", "sneezing", "fever", "headache"],
                "A viral infection of the upper respiratory tract.",
                &[
                    "Get plenty of rest",
                    "Stay hydrated",
                    "Use over-the-counter medications for symptom relief",
                    "Practice good hygiene to prevent spread",
                ],
                &[
                    "Drink warm fluids like tea or soup",
                    "Eat vitamin C-rich foods",
                    "Include garlic and ginger in your diet",
                    "Stay hydrated with water and electrolyte drinks",
                ],
            ),
            disease(
                "Influenza (Flu)",
                &["fever", "chills", "muscle aches", "fatigue", "cough", "headache"],
                "A contagious respiratory illness caused by influenza viruses.",
                &[
                    "Get vaccinated annually",
                    "Stay home when sick",
                    "Cover your mouth when coughing or sneezing",
                    "Wash hands frequently",
                ],
                &[
                    "Drink plenty of fluids",
                    "Eat easily digestible foods",
                    "Include immune-boosting foods",
                    "Avoid alcohol and caffeine",
                ],
            ),
            disease(
                "Allergic Rhinitis",
                &["sneezing", "runny nose", "itchy eyes", "nasal congestion", "postnasal drip"],
                "An allergic response to airborne allergens.",
                &[
                    "Identify and avoid allergens",
                    "Use air purifiers",
                    "Keep windows closed during high pollen seasons",
                    "Wash bedding regularly",
                ],
                &[
                    "Include anti-inflammatory foods",
                    "Eat local honey",
                    "Stay hydrated",
                    "Avoid dairy if it worsens symptoms",
                ],
            ),
            disease(
                "Gastroenteritis",
                &["diarrhea", "nausea", "vomiting", "abdominal pain", "fever", "dehydration"],
                "Inflammation of the stomach and intestines, usually due to infection.",
                &[
                    "Practice good hygiene",
                    "Stay hydrated",
                    "Rest and avoid strenuous activity",
                    "Wash hands frequently",
                ],
                &[
                    "Follow BRAT diet (bananas, rice, applesauce, toast)",
                    "Drink clear fluids",
                    "Avoid dairy and fatty foods",
                    "Eat small, frequent meals",
                ],
            ),
            disease(
                "Migraine",
                &["severe headache", "nausea", "sensitivity to light", "sensitivity to sound", "aura"],
                "A neurological condition characterized by intense, debilitating headaches.",
                &[
                    "Identify and avoid triggers",
                    "Maintain regular sleep schedule",
                    "Manage stress",
                    "Stay hydrated",
                ],
                &[
                    "Eat regular meals",
                    "Stay hydrated",
                    "Avoid trigger foods",
                    "Include magnesium-rich foods",
                ],
            ),
        ];

        let mut severity = HashMap::new();
        for (k, v) in [
            ("fever", 5),
            ("cough", 4),
            ("sore throat", 3),
            ("runny nose", 2),
            ("sneezing", 2),
            ("headache", 3),
            ("chills", 3),
            ("muscle aches", 4),
            ("fatigue", 3),
            ("itchy eyes", 2),
            ("nasal congestion", 2),
            ("postnasal drip", 2),
            ("diarrhea", 4),
            ("nausea", 4),
            ("vomiting", 5),
            ("abdominal pain", 4),
            ("dehydration", 5),
            ("severe headache", 5),
            ("sensitivity to light", 3),
            ("sensitivity to sound", 3),
            ("aura", 4),
            ("dizziness", 3),
            ("chest pain", 5),
            ("shortness of breath", 5),
            ("wheezing", 4),
            ("loss of appetite", 3),
            ("weight loss", 4),
            ("joint pain", 4),
            ("rash", 3),
            ("itching", 2),
        ] {
            severity.insert(k.to_string(), v);
        }

        Self::new(diseases, severity)
    }
}

const FUZZY_MIN_SIMILARITY: f64 = 0.85;

/// Normalize a symptom name: trim, lower-case, `_`/`-` as spaces, collapse whitespace.
pub fn normalize_symptom(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display category of a symptom; `"Other"` when uncategorized.
pub fn category_of(symptom: &str) -> &'static str {
    const CATEGORIES: [(&str, &[&str]); 8] = [
        (
            "Pain & Discomfort",
            &[
                "headache", "severe headache", "chest pain", "abdominal pain", "back pain",
                "joint pain", "neck pain", "knee pain", "muscle pain", "muscle aches",
                "belly pain", "stomach pain",
            ],
        ),
        (
            "Digestive Issues",
            &[
                "vomiting", "nausea", "diarrhea", "diarrhoea", "indigestion", "constipation",
                "stomach bleeding", "acidity", "loss of appetite", "dehydration",
            ],
        ),
        (
            "Respiratory",
            &[
                "cough", "breathlessness", "shortness of breath", "wheezing", "runny nose",
                "sneezing", "sore throat", "phlegm", "congestion", "nasal congestion",
                "postnasal drip", "sinus pressure", "mucoid sputum",
            ],
        ),
        (
            "Fever & Infection",
            &["fever", "high fever", "mild fever", "chills", "sweating", "shivering"],
        ),
        (
            "Skin & Appearance",
            &[
                "yellowish skin", "skin rash", "rash", "itching", "swelling",
                "red spots over body", "dischromic patches",
            ],
        ),
        (
            "Vision & Eyes",
            &[
                "blurred and distorted vision", "redness of eyes", "watering from eyes",
                "visual disturbances", "itchy eyes", "sensitivity to light", "aura",
            ],
        ),
        (
            "Neurological",
            &[
                "dizziness", "lethargy", "fatigue", "weakness", "restlessness",
                "loss of balance", "unsteadiness", "sensitivity to sound",
            ],
        ),
        (
            "General Symptoms",
            &[
                "weight loss", "weight gain", "swelled lymph nodes", "malaise",
                "weakness in limbs", "excessive hunger",
            ],
        ),
    ];

    let s = normalize_symptom(symptom);
    CATEGORIES
        .iter()
        .find(|(_, members)| members.contains(&s.as_str()))
        .map(|(name, _)| *name)
        .unwrap_or("Other")
}
