// src/store.rs
//! Document store for user accounts and health records.
//!
//! Documents are opaque to the store apart from their ids, owners and the two
//! unique user fields. `MemoryStore` keeps everything in memory and, when a
//! snapshot path is configured, rewrites a JSON snapshot after every mutation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AppError, StoreError};
use crate::records::HealthRecord;
use crate::users::User;

/// Change applied to a stored document while the store holds its write lock.
/// An `Err` leaves the document untouched and surfaces as `StoreError::Rejected`.
pub type Edit<'a, T> = Box<dyn FnOnce(&mut T) -> Result<(), AppError> + Send + 'a>;

pub fn edit<'a, T>(f: impl FnOnce(&mut T) -> Result<(), AppError> + Send + 'a) -> Edit<'a, T> {
    Box::new(f)
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new user. Fails with `Duplicate` on a taken username or email.
    async fn insert_user(&self, user: User) -> Result<(), StoreError>;
    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
    /// Apply `edit` to the current version of a user and return the result.
    /// `None` when the id is unknown.
    async fn modify_user(&self, id: Uuid, edit: Edit<'_, User>) -> Result<Option<User>, StoreError>;
    /// Delete a user and every record they own. Returns the number of records removed.
    async fn delete_user(&self, id: Uuid) -> Result<usize, StoreError>;

    async fn records_for(&self, user_id: Uuid) -> Result<Vec<HealthRecord>, StoreError>;
    async fn insert_record(&self, record: HealthRecord) -> Result<(), StoreError>;
    /// Fetch a record only if it belongs to `user_id`.
    async fn record(&self, user_id: Uuid, id: Uuid) -> Result<Option<HealthRecord>, StoreError>;
    /// Apply `edit` to the current version of a record owned by `user_id`.
    async fn modify_record(
        &self,
        user_id: Uuid,
        id: Uuid,
        edit: Edit<'_, HealthRecord>,
    ) -> Result<Option<HealthRecord>, StoreError>;
    /// Delete a record owned by `user_id`. Returns `false` when not found.
    async fn delete_record(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    users: Vec<User>,
    #[serde(default)]
    records: Vec<HealthRecord>,
}

#[derive(Debug, Default, Clone)]
struct Collections {
    users: HashMap<Uuid, User>,
    records: HashMap<Uuid, HealthRecord>,
}

impl Collections {
    fn to_snapshot(&self) -> Snapshot {
        let mut users: Vec<User> = self.users.values().cloned().collect();
        users.sort_by_key(|u| (u.join_date, u.id));
        let mut records: Vec<HealthRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Snapshot { users, records }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    /// Purely in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a JSON snapshot. A missing file starts empty.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let mut cols = Collections::default();

        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let snap: Snapshot = serde_json::from_slice(&bytes)?;
                cols.users = snap.users.into_iter().map(|u| (u.id, u)).collect();
                cols.records = snap.records.into_iter().map(|r| (r.id, r)).collect();
                info!(
                    target: "healthtrack::store",
                    path = %path.display(),
                    users = cols.users.len(),
                    records = cols.records.len(),
                    "snapshot loaded"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(target: "healthtrack::store", path = %path.display(), "no snapshot yet, starting empty");
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            inner: RwLock::new(cols),
            snapshot: Some(path),
        })
    }

    /// Write the snapshot atomically (tmp file + rename).
    async fn persist(&self, cols: &Collections) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(&cols.to_snapshot())?;
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        debug!(target: "healthtrack::store", bytes = bytes.len(), "snapshot written");
        Ok(())
    }

    /// Persist `next` and only then make it the live state. On a failed write
    /// memory keeps the last persisted collections.
    async fn commit(&self, live: &mut Collections, next: Collections) -> Result<(), StoreError> {
        if let Err(e) = self.persist(&next).await {
            warn!(target: "healthtrack::store", error = %e, "snapshot write failed, mutation discarded");
            return Err(e);
        }
        *live = next;
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: User) -> Result<(), StoreError> {
        let mut cols = self.inner.write().await;
        if cols.users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate { field: "username" });
        }
        if cols
            .users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Duplicate { field: "email" });
        }
        let mut next = cols.clone();
        next.users.insert(user.id, user);
        self.commit(&mut cols, next).await
    }

    async fn user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn modify_user(&self, id: Uuid, edit: Edit<'_, User>) -> Result<Option<User>, StoreError> {
        let mut cols = self.inner.write().await;
        let Some(mut user) = cols.users.get(&id).cloned() else {
            return Ok(None);
        };
        edit(&mut user).map_err(|e| StoreError::Rejected(Box::new(e)))?;

        let mut next = cols.clone();
        next.users.insert(id, user.clone());
        self.commit(&mut cols, next).await?;
        Ok(Some(user))
    }

    async fn delete_user(&self, id: Uuid) -> Result<usize, StoreError> {
        let mut cols = self.inner.write().await;
        if !cols.users.contains_key(&id) {
            return Ok(0);
        }
        let mut next = cols.clone();
        next.users.remove(&id);
        next.records.retain(|_, r| r.user_id != id);
        let removed = cols.records.len() - next.records.len();
        self.commit(&mut cols, next).await?;
        Ok(removed)
    }

    async fn records_for(&self, user_id: Uuid) -> Result<Vec<HealthRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .records
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_record(&self, record: HealthRecord) -> Result<(), StoreError> {
        let mut cols = self.inner.write().await;
        let mut next = cols.clone();
        next.records.insert(record.id, record);
        self.commit(&mut cols, next).await
    }

    async fn record(&self, user_id: Uuid, id: Uuid) -> Result<Option<HealthRecord>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .records
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .cloned())
    }

    async fn modify_record(
        &self,
        user_id: Uuid,
        id: Uuid,
        edit: Edit<'_, HealthRecord>,
    ) -> Result<Option<HealthRecord>, StoreError> {
        let mut cols = self.inner.write().await;
        let Some(mut record) = cols.records.get(&id).filter(|r| r.user_id == user_id).cloned() else {
            return Ok(None);
        };
        edit(&mut record).map_err(|e| StoreError::Rejected(Box::new(e)))?;
        // owner and id are fixed whatever the edit did
        record.id = id;
        record.user_id = user_id;

        let mut next = cols.clone();
        next.records.insert(id, record.clone());
        self.commit(&mut cols, next).await?;
        Ok(Some(record))
    }

    async fn delete_record(&self, user_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut cols = self.inner.write().await;
        let owned = cols.records.get(&id).is_some_and(|r| r.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        let mut next = cols.clone();
        next.records.remove(&id);
        self.commit(&mut cols, next).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordType;
    use chrono::{NaiveDate, Utc};

    fn user(name: &str, email: &str) -> User {
        User::new(name, email, "hash")
    }

    fn record(owner: Uuid) -> HealthRecord {
        HealthRecord {
            id: Uuid::new_v4(),
            user_id: owner,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            record_type: RecordType::Routine,
            blood_pressure: Some("120/80".into()),
            heart_rate: Some("72".into()),
            temperature: None,
            weight: None,
            symptoms: None,
            notes: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_username_and_email_are_rejected() {
        let s = MemoryStore::new();
        s.insert_user(user("ann", "ann@example.com")).await.unwrap();

        let err = s.insert_user(user("ann", "other@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "username" }));

        let err = s.insert_user(user("bob", "ANN@example.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { field: "email" }));
    }

    #[tokio::test]
    async fn records_are_scoped_to_their_owner() {
        let s = MemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let r = record(a);
        let id = r.id;
        s.insert_record(r).await.unwrap();

        assert!(s.record(a, id).await.unwrap().is_some());
        assert!(s.record(b, id).await.unwrap().is_none());
        assert!(!s.delete_record(b, id).await.unwrap());
        assert!(s.delete_record(a, id).await.unwrap());
        assert!(s.records_for(a).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_a_user_cascades_to_records() {
        let s = MemoryStore::new();
        let u = user("ann", "ann@example.com");
        let uid = u.id;
        s.insert_user(u).await.unwrap();
        s.insert_record(record(uid)).await.unwrap();
        s.insert_record(record(uid)).await.unwrap();
        s.insert_record(record(Uuid::new_v4())).await.unwrap();

        assert_eq!(s.delete_user(uid).await.unwrap(), 2);
        assert!(s.user(uid).await.unwrap().is_none());
        assert_eq!(s.delete_user(uid).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let dir = std::env::temp_dir().join(format!("healthtrack_store_{}", Uuid::new_v4()));
        let path = dir.join("data.json");

        let u = user("ann", "ann@example.com");
        let uid = u.id;
        {
            let s = MemoryStore::open(&path).await.unwrap();
            s.insert_user(u).await.unwrap();
            s.insert_record(record(uid)).await.unwrap();
        }

        let reopened = MemoryStore::open(&path).await.unwrap();
        assert_eq!(
            reopened.user_by_username("ann").await.unwrap().map(|u| u.id),
            Some(uid)
        );
        assert_eq!(reopened.records_for(uid).await.unwrap().len(), 1);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn failed_snapshot_write_leaves_memory_unchanged() {
        let dir = std::env::temp_dir().join(format!("healthtrack_store_{}", Uuid::new_v4()));
        let path = dir.join("data.json");
        let s = MemoryStore::open(&path).await.unwrap();

        let kept = user("ann", "ann@example.com");
        let kept_id = kept.id;
        s.insert_user(kept).await.unwrap();
        let rec = record(kept_id);
        let rec_id = rec.id;
        s.insert_record(rec).await.unwrap();

        // a non-empty directory where the snapshot lives makes the rename fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(path.join("blocker")).unwrap();

        let bob = user("bob", "bob@example.com");
        let bob_id = bob.id;
        let err = s.insert_user(bob.clone()).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)), "got {err:?}");
        assert!(s.user(bob_id).await.unwrap().is_none());
        assert!(s.user_by_username("bob").await.unwrap().is_none());

        // retrying reports the write failure again, not a duplicate
        let err = s.insert_user(bob).await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)), "got {err:?}");

        assert!(s.delete_record(kept_id, rec_id).await.is_err());
        assert!(s.record(kept_id, rec_id).await.unwrap().is_some());

        assert!(s.delete_user(kept_id).await.is_err());
        assert!(s.user(kept_id).await.unwrap().is_some());
        assert_eq!(s.records_for(kept_id).await.unwrap().len(), 1);

        let rename = edit(|u: &mut User| {
            u.full_name = Some("Ann".into());
            Ok(())
        });
        assert!(s.modify_user(kept_id, rename).await.is_err());
        assert!(s.user(kept_id).await.unwrap().unwrap().full_name.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn edits_apply_to_the_current_document() {
        let s = MemoryStore::new();
        let u = user("ann", "ann@example.com");
        let uid = u.id;
        s.insert_user(u).await.unwrap();

        s.modify_user(uid, edit(|u: &mut User| {
            u.password_hash = "new-hash".into();
            Ok(())
        }))
        .await
        .unwrap();
        let after = s
            .modify_user(uid, edit(|u: &mut User| {
                u.full_name = Some("Ann Lee".into());
                Ok(())
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.password_hash, "new-hash");
        assert_eq!(after.full_name.as_deref(), Some("Ann Lee"));

        let err = s
            .modify_user(uid, edit(|u: &mut User| {
                u.age = Some("1".into());
                Err(AppError::invalid("Invalid updates"))
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected(_)));
        assert!(s.user(uid).await.unwrap().unwrap().age.is_none());

        assert!(s
            .modify_user(Uuid::new_v4(), edit(|_: &mut User| Ok(())))
            .await
            .unwrap()
            .is_none());

        let r = record(uid);
        let rid = r.id;
        s.insert_record(r).await.unwrap();
        assert!(s
            .modify_record(Uuid::new_v4(), rid, edit(|_: &mut HealthRecord| Ok(())))
            .await
            .unwrap()
            .is_none());
        let updated = s
            .modify_record(uid, rid, edit(|r: &mut HealthRecord| {
                r.weight = Some("70".into());
                Ok(())
            }))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.weight.as_deref(), Some("70"));
        assert_eq!(updated.heart_rate.as_deref(), Some("72"));
    }
}
