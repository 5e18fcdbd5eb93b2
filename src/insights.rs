// src/insights.rs
//! Aggregates over one user's health records: vitals averages, weight trend,
//! check-up cadence, recurring symptoms, saved predictions and the textual
//! insights built from them.
//!
//! Pure; callers pass the records in.

use std::collections::HashMap;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::records::HealthRecord;

static NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number regex"));
static BP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d+(?:\.\d+)?)\s*/\s*(\d+(?:\.\d+)?)\s*$").expect("bp regex"));
static PREDICTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Disease prediction: (.+?) \((\d+)% confidence\)").expect("prediction regex")
});

const TOP_SYMPTOMS: usize = 3;
const RECENT_PREDICTIONS: usize = 5;
/// Weight change (kg) beyond which the trend is flagged.
const WEIGHT_DELTA_KG: f64 = 2.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub record_count: usize,
    pub avg_heart_rate: Option<f64>,
    /// Rounded `"systolic/diastolic"`.
    pub avg_blood_pressure: Option<String>,
    pub avg_temperature: Option<f64>,
    pub avg_weight: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightTrend {
    /// Last minus first weight, kg.
    pub change: f64,
    pub days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckupFrequency {
    pub days: i64,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymptomCount {
    pub symptom: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPrediction {
    pub date: NaiveDate,
    pub disease: String,
    pub confidence_percent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub title: &'static str,
    pub description: String,
    pub recommendation: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInsights {
    pub metrics: HealthMetrics,
    pub weight_trend: Option<WeightTrend>,
    pub checkup_frequency: Option<CheckupFrequency>,
    pub common_symptoms: Vec<SymptomCount>,
    pub recent_predictions: Vec<SavedPrediction>,
    pub insights: Vec<Insight>,
}

/// First number in a free-text vital (`"72 bpm"` → 72). `"-"` and blanks yield `None`.
fn parse_number(s: Option<&str>) -> Option<f64> {
    NUMBER_RE
        .find(s?)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_bp(s: Option<&str>) -> Option<(f64, f64)> {
    let caps = BP_RE.captures(s?)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Averages over the records where each vital parses.
pub fn metrics(records: &[HealthRecord]) -> HealthMetrics {
    let bp: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| parse_bp(r.blood_pressure.as_deref()))
        .collect();
    let avg_blood_pressure = mean(bp.iter().map(|b| b.0))
        .zip(mean(bp.iter().map(|b| b.1)))
        .map(|(sys, dia)| format!("{}/{}", sys.round(), dia.round()));

    HealthMetrics {
        record_count: records.len(),
        avg_heart_rate: mean(records.iter().filter_map(|r| parse_number(r.heart_rate.as_deref()))),
        avg_blood_pressure,
        avg_temperature: mean(records.iter().filter_map(|r| parse_number(r.temperature.as_deref()))),
        avg_weight: mean(records.iter().filter_map(|r| parse_number(r.weight.as_deref()))),
    }
}

/// Change between the earliest and latest records that carry a weight.
pub fn weight_trend(records: &[HealthRecord]) -> Option<WeightTrend> {
    let mut weighed: Vec<(NaiveDate, f64)> = records
        .iter()
        .filter_map(|r| parse_number(r.weight.as_deref()).map(|w| (r.date, w)))
        .collect();
    if weighed.len() < 2 {
        return None;
    }
    weighed.sort_by_key(|(d, _)| *d);
    let (first_day, first) = weighed[0];
    let (last_day, last) = weighed[weighed.len() - 1];
    Some(WeightTrend {
        change: last - first,
        days: (last_day - first_day).num_days(),
    })
}

/// Span between the first and last record dates.
pub fn checkup_frequency(records: &[HealthRecord]) -> Option<CheckupFrequency> {
    let first = records.iter().map(|r| r.date).min()?;
    let last = records.iter().map(|r| r.date).max()?;
    let days = (last - first).num_days();
    let recommendation = if days > 30 {
        "Consider more frequent health check-ups for better monitoring."
    } else if days < 7 {
        "You are monitoring your health frequently. Keep up the good work!"
    } else {
        "Your check-up frequency is appropriate. Continue regular monitoring."
    };
    Some(CheckupFrequency { days, recommendation })
}

/// Most frequent comma-separated symptoms, ties broken alphabetically.
pub fn common_symptoms(records: &[HealthRecord]) -> Vec<SymptomCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in records.iter().filter_map(|r| r.symptoms.as_deref()) {
        for s in text.split(',').map(|s| s.trim().to_lowercase()) {
            if !s.is_empty() && s != "-" {
                *counts.entry(s).or_default() += 1;
            }
        }
    }
    let mut out: Vec<SymptomCount> = counts
        .into_iter()
        .map(|(symptom, count)| SymptomCount { symptom, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.symptom.cmp(&b.symptom)));
    out.truncate(TOP_SYMPTOMS);
    out
}

/// Predictions saved into record notes, newest first.
pub fn recent_predictions(records: &[HealthRecord]) -> Vec<SavedPrediction> {
    let mut out: Vec<(chrono::DateTime<chrono::Utc>, SavedPrediction)> = records
        .iter()
        .filter_map(|r| {
            let caps = PREDICTION_RE.captures(r.notes.as_deref()?)?;
            Some((
                r.created_at,
                SavedPrediction {
                    date: r.date,
                    disease: caps[1].to_string(),
                    confidence_percent: caps[2].parse().ok()?,
                },
            ))
        })
        .collect();
    out.sort_by(|a, b| b.1.date.cmp(&a.1.date).then_with(|| b.0.cmp(&a.0)));
    out.into_iter()
        .take(RECENT_PREDICTIONS)
        .map(|(_, p)| p)
        .collect()
}

fn heart_rate_insight(avg: f64) -> Insight {
    if avg > 100.0 {
        Insight {
            kind: InsightKind::Warning,
            title: "Elevated Heart Rate",
            description: format!("Your average heart rate of {avg:.0} BPM is above the normal range."),
            recommendation: "Consider consulting a healthcare provider and practicing stress-reduction techniques.",
        }
    } else if avg < 60.0 {
        Insight {
            kind: InsightKind::Warning,
            title: "Low Heart Rate",
            description: format!("Your average heart rate of {avg:.0} BPM is below the normal range."),
            recommendation: "Ensure you are eating well and consult a healthcare provider if symptoms persist.",
        }
    } else {
        Insight {
            kind: InsightKind::Success,
            title: "Healthy Heart Rate",
            description: format!("Your average heart rate of {avg:.0} BPM is within the normal range."),
            recommendation: "Maintain regular exercise and a healthy lifestyle.",
        }
    }
}

fn blood_pressure_insight(avg: &str) -> Option<Insight> {
    let (sys, dia) = parse_bp(Some(avg))?;
    Some(if sys > 140.0 || dia > 90.0 {
        Insight {
            kind: InsightKind::Warning,
            title: "High Blood Pressure",
            description: format!("Your average blood pressure of {avg} is above the normal range."),
            recommendation: "Consider reducing salt intake and consulting a healthcare provider.",
        }
    } else if sys < 90.0 || dia < 60.0 {
        Insight {
            kind: InsightKind::Warning,
            title: "Low Blood Pressure",
            description: format!("Your average blood pressure of {avg} is below the normal range."),
            recommendation: "Stay hydrated and consult a healthcare provider if symptoms persist.",
        }
    } else {
        Insight {
            kind: InsightKind::Success,
            title: "Healthy Blood Pressure",
            description: format!("Your average blood pressure of {avg} is within the normal range."),
            recommendation: "Maintain a balanced diet and regular exercise.",
        }
    })
}

fn weight_insight(trend: &WeightTrend) -> Insight {
    if trend.change > WEIGHT_DELTA_KG {
        Insight {
            kind: InsightKind::Warning,
            title: "Significant Weight Gain",
            description: format!(
                "Your weight has increased by {:.1} kg over the last {} days.",
                trend.change, trend.days
            ),
            recommendation: "Consider reviewing your diet and exercise routine.",
        }
    } else if trend.change < -WEIGHT_DELTA_KG {
        Insight {
            kind: InsightKind::Warning,
            title: "Significant Weight Loss",
            description: format!(
                "Your weight has decreased by {:.1} kg over the last {} days.",
                trend.change.abs(),
                trend.days
            ),
            recommendation: "Ensure you're maintaining a balanced diet and consult a healthcare provider if unintended.",
        }
    } else {
        Insight {
            kind: InsightKind::Success,
            title: "Stable Weight",
            description: "Your weight has remained stable over the recorded period.".to_string(),
            recommendation: "Continue maintaining a healthy lifestyle.",
        }
    }
}

pub fn analyze(records: &[HealthRecord]) -> HealthInsights {
    let metrics = metrics(records);
    let weight_trend = weight_trend(records);

    let mut insights = Vec::new();
    if let Some(hr) = metrics.avg_heart_rate.filter(|hr| *hr > 0.0) {
        insights.push(heart_rate_insight(hr));
    }
    if let Some(i) = metrics.avg_blood_pressure.as_deref().and_then(blood_pressure_insight) {
        insights.push(i);
    }
    if let Some(t) = &weight_trend {
        insights.push(weight_insight(t));
    }

    HealthInsights {
        checkup_frequency: checkup_frequency(records),
        common_symptoms: common_symptoms(records),
        recent_predictions: recent_predictions(records),
        metrics,
        weight_trend,
        insights,
    }
}
