// src/records.rs
//! Health records: create, list, update, delete, and the summary record kept
//! when a prediction is saved.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::metrics;
use crate::prediction::PredictionResult;
use crate::store::{edit, Store};
use crate::users::optional_string;

/// Keys a record update may touch.
pub const UPDATABLE_FIELDS: [&str; 8] = [
    "date",
    "recordType",
    "bloodPressure",
    "heartRate",
    "temperature",
    "weight",
    "symptoms",
    "notes",
];

/// Placeholder stored for vitals that a prediction summary does not carry.
const NO_VALUE: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Routine,
    Monthly,
}

impl RecordType {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routine" => Some(RecordType::Routine),
            "monthly" => Some(RecordType::Monthly),
            _ => None,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordType::Routine => "routine",
            RecordType::Monthly => "monthly",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub date: NaiveDate,
    pub record_type: RecordType,
    #[serde(default)]
    pub blood_pressure: Option<String>,
    #[serde(default)]
    pub heart_rate: Option<String>,
    #[serde(default)]
    pub temperature: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    /// Comma-separated free text.
    #[serde(default)]
    pub symptoms: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl HealthRecord {
    fn blank(user_id: Uuid, date: NaiveDate, record_type: RecordType) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            date,
            record_type,
            blood_pressure: None,
            heart_rate: None,
            temperature: None,
            weight: None,
            symptoms: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    /// Build a record from a JSON body. `date` and `recordType` are required;
    /// unknown keys are ignored.
    pub fn from_json(user_id: Uuid, body: &Value) -> Result<Self, AppError> {
        let obj = body
            .as_object()
            .ok_or_else(|| AppError::invalid("Invalid health record"))?;

        let date = match obj.get("date") {
            Some(v) => parse_date(v)?,
            None => return Err(AppError::invalid("Date is required")),
        };
        let record_type = match obj.get("recordType") {
            Some(v) => parse_record_type(v)?,
            None => return Err(AppError::invalid("Record type is required")),
        };

        let mut record = Self::blank(user_id, date, record_type);
        let vitals: Map<String, Value> = obj
            .iter()
            .filter(|(k, _)| UPDATABLE_FIELDS.contains(&k.as_str()))
            .filter(|(k, _)| !matches!(k.as_str(), "date" | "recordType"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        record.apply(&vitals)?;
        Ok(record)
    }

    /// Summary record persisted when a user saves a prediction.
    pub fn from_prediction<S: AsRef<str>>(
        user_id: Uuid,
        symptoms: &[S],
        result: &PredictionResult,
        today: NaiveDate,
    ) -> Self {
        let joined = symptoms
            .iter()
            .map(|s| s.as_ref().trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(", ");

        let mut record = Self::blank(user_id, today, RecordType::Routine);
        record.blood_pressure = Some(NO_VALUE.to_string());
        record.heart_rate = Some(NO_VALUE.to_string());
        record.temperature = Some(NO_VALUE.to_string());
        record.weight = Some(NO_VALUE.to_string());
        record.symptoms = Some(joined);
        record.notes = Some(result.summary());
        record
    }

    /// Apply a JSON object of changes. Any key outside `UPDATABLE_FIELDS`
    /// rejects the whole update and leaves the record untouched.
    pub fn apply_update(&mut self, body: &Value) -> Result<(), AppError> {
        let obj = body
            .as_object()
            .ok_or_else(|| AppError::invalid("Invalid updates"))?;
        if !obj.keys().all(|k| UPDATABLE_FIELDS.contains(&k.as_str())) {
            return Err(AppError::invalid("Invalid updates"));
        }
        let mut next = self.clone();
        next.apply(obj)?;
        *self = next;
        Ok(())
    }

    fn apply(&mut self, obj: &Map<String, Value>) -> Result<(), AppError> {
        for (key, value) in obj {
            match key.as_str() {
                "date" => self.date = parse_date(value)?,
                "recordType" => self.record_type = parse_record_type(value)?,
                "bloodPressure" => self.blood_pressure = optional_string(value)?,
                "heartRate" => self.heart_rate = optional_string(value)?,
                "temperature" => self.temperature = optional_string(value)?,
                "weight" => self.weight = optional_string(value)?,
                "symptoms" => self.symptoms = optional_string(value)?,
                "notes" => self.notes = optional_string(value)?,
                _ => {}
            }
        }
        Ok(())
    }
}

fn parse_date(v: &Value) -> Result<NaiveDate, AppError> {
    v.as_str()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        .ok_or_else(|| AppError::invalid("Date must be YYYY-MM-DD"))
}

fn parse_record_type(v: &Value) -> Result<RecordType, AppError> {
    v.as_str()
        .and_then(RecordType::parse)
        .ok_or_else(|| AppError::invalid("Record type must be 'routine' or 'monthly'"))
}

/// Newest date first; same-day records newest-created first.
pub fn sort_newest_first(records: &mut [HealthRecord]) {
    records.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| b.created_at.cmp(&a.created_at))
    });
}

pub async fn list(store: &dyn Store, user_id: Uuid) -> Result<Vec<HealthRecord>, AppError> {
    let mut records = store.records_for(user_id).await?;
    sort_newest_first(&mut records);
    Ok(records)
}

pub async fn create(store: &dyn Store, user_id: Uuid, body: &Value) -> Result<HealthRecord, AppError> {
    let record = HealthRecord::from_json(user_id, body)?;
    insert(store, record).await
}

pub(crate) async fn insert(store: &dyn Store, record: HealthRecord) -> Result<HealthRecord, AppError> {
    store.insert_record(record.clone()).await?;
    info!(
        target: "healthtrack::records",
        id = %record.id,
        date = %record.date,
        kind = %record.record_type,
        "record created"
    );
    metrics::record_records("create");
    Ok(record)
}

pub async fn update(store: &dyn Store, user_id: Uuid, id: Uuid, body: &Value) -> Result<HealthRecord, AppError> {
    if !body
        .as_object()
        .is_some_and(|o| o.keys().all(|k| UPDATABLE_FIELDS.contains(&k.as_str())))
    {
        return Err(AppError::invalid("Invalid updates"));
    }

    let record = store
        .modify_record(user_id, id, edit(|r: &mut HealthRecord| r.apply_update(body)))
        .await?
        .ok_or_else(|| AppError::not_found("Record not found"))?;
    info!(target: "healthtrack::records", id = %id, "record updated");
    metrics::record_records("update");
    Ok(record)
}

pub async fn delete(store: &dyn Store, user_id: Uuid, id: Uuid) -> Result<(), AppError> {
    if !store.delete_record(user_id, id).await? {
        return Err(AppError::not_found("Record not found"));
    }
    info!(target: "healthtrack::records", id = %id, "record deleted");
    metrics::record_records("delete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn create_requires_date_and_type() {
        let uid = Uuid::new_v4();
        assert!(HealthRecord::from_json(uid, &json!({"recordType": "routine"})).is_err());
        assert!(HealthRecord::from_json(uid, &json!({"date": "2024-01-01"})).is_err());
        assert!(HealthRecord::from_json(uid, &json!({"date": "01/02/2024", "recordType": "routine"})).is_err());
        assert!(HealthRecord::from_json(uid, &json!({"date": "2024-01-01", "recordType": "weekly"})).is_err());
    }

    #[test]
    fn create_accepts_numbers_and_ignores_extra_keys() {
        let uid = Uuid::new_v4();
        let r = HealthRecord::from_json(
            uid,
            &json!({
                "date": "2024-01-05",
                "recordType": "Monthly",
                "heartRate": 72,
                "bloodPressure": "120/80",
                "userId": Uuid::new_v4(),
                "color": "blue"
            }),
        )
        .unwrap();
        assert_eq!(r.user_id, uid);
        assert_eq!(r.record_type, RecordType::Monthly);
        assert_eq!(r.heart_rate.as_deref(), Some("72"));
        assert_eq!(r.blood_pressure.as_deref(), Some("120/80"));
    }

    #[test]
    fn serialized_record_uses_camel_case() {
        let r = HealthRecord::from_json(Uuid::new_v4(), &json!({"date": "2024-01-05", "recordType": "routine"}))
            .unwrap();
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v["date"], json!("2024-01-05"));
        assert_eq!(v["recordType"], json!("routine"));
        assert!(v.get("userId").is_some());
        assert!(v.get("createdAt").is_some());
    }

    #[test]
    fn update_with_unknown_key_changes_nothing() {
        let mut r = HealthRecord::from_json(Uuid::new_v4(), &json!({"date": "2024-01-05", "recordType": "routine"}))
            .unwrap();
        let before = r.clone();
        let err = r.apply_update(&json!({"weight": "70", "userId": "x"})).unwrap_err();
        assert_eq!(err.to_string(), "Invalid updates");
        assert_eq!(r, before);

        // a bad value in an allowed key also leaves the record as it was
        assert!(r.apply_update(&json!({"weight": "70", "date": "soon"})).is_err());
        assert_eq!(r, before);
    }

    #[test]
    fn prediction_summary_record() {
        let mut result = PredictionResult::unknown(0.01);
        result.disease = "Influenza (Flu)".into();
        result.confidence = 0.734;
        let r = HealthRecord::from_prediction(Uuid::new_v4(), &["fever", " chills "], &result, day("2024-02-02"));
        assert_eq!(r.record_type, RecordType::Routine);
        assert_eq!(r.date, day("2024-02-02"));
        assert_eq!(r.heart_rate.as_deref(), Some("-"));
        assert_eq!(r.symptoms.as_deref(), Some("fever, chills"));
        assert_eq!(
            r.notes.as_deref(),
            Some("Disease prediction: Influenza (Flu) (73% confidence)")
        );
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let store = MemoryStore::new();
        let uid = Uuid::new_v4();
        for d in ["2024-01-02", "2024-03-01", "2023-12-31"] {
            create(&store, uid, &json!({"date": d, "recordType": "routine"}))
                .await
                .unwrap();
        }
        let dates: Vec<String> = list(&store, uid)
            .await
            .unwrap()
            .iter()
            .map(|r| r.date.to_string())
            .collect();
        assert_eq!(dates, vec!["2024-03-01", "2024-01-02", "2023-12-31"]);
    }

    #[tokio::test]
    async fn other_users_records_are_not_found() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let intruder = Uuid::new_v4();
        let r = create(&store, owner, &json!({"date": "2024-01-02", "recordType": "routine"}))
            .await
            .unwrap();

        let e = update(&store, intruder, r.id, &json!({"notes": "mine now"}))
            .await
            .unwrap_err();
        assert!(matches!(e, AppError::NotFound(_)));
        assert!(matches!(delete(&store, intruder, r.id).await, Err(AppError::NotFound(_))));

        let updated = update(&store, owner, r.id, &json!({"notes": "fine"})).await.unwrap();
        assert_eq!(updated.notes.as_deref(), Some("fine"));
        delete(&store, owner, r.id).await.unwrap();
        assert!(list(&store, owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_updates_to_different_fields_both_stick() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let uid = Uuid::new_v4();
        let r = create(store.as_ref(), uid, &json!({"date": "2024-01-02", "recordType": "routine"}))
            .await
            .unwrap();
        let rid = r.id;

        let tasks: Vec<_> = [json!({"weight": "70"}), json!({"notes": "after run"})]
            .into_iter()
            .map(|body| {
                let store = store.clone();
                tokio::spawn(async move { update(store.as_ref(), uid, rid, &body).await })
            })
            .collect();
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        let stored = store.record(uid, rid).await.unwrap().unwrap();
        assert_eq!(stored.weight.as_deref(), Some("70"));
        assert_eq!(stored.notes.as_deref(), Some("after run"));
    }
}
