// src/users.rs
//! User accounts: registration, login, profile management, password change,
//! account deletion and data export.
//!
//! Operations take the store and `Auth` explicitly; handlers in `api` are thin
//! wrappers around them.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Auth;
use crate::error::{AppError, StoreError};
use crate::logging::anon_hash;
use crate::metrics;
use crate::records::{self, HealthRecord};
use crate::store::{edit, Store};

pub const TEST_USERNAME: &str = "testuser";
pub const TEST_EMAIL: &str = "test@example.com";
pub const TEST_PASSWORD: &str = "password123";
const TEST_FULL_NAME: &str = "Test User";

const MIN_PASSWORD_LEN: usize = 6;

/// Keys accepted by a profile update.
const PROFILE_FIELDS: [&str; 7] = [
    "fullName",
    "age",
    "gender",
    "height",
    "weight",
    "medicalHistory",
    "allergies",
];

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"));

/// Stored account document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default = "default_gender")]
    pub gender: String,
    #[serde(default)]
    pub height: Option<String>,
    #[serde(default)]
    pub weight: Option<String>,
    #[serde(default)]
    pub medical_history: Option<String>,
    #[serde(default)]
    pub allergies: Option<String>,
    pub join_date: DateTime<Utc>,
}

fn default_gender() -> String {
    "male".to_string()
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash: password_hash.into(),
            full_name: None,
            age: None,
            gender: default_gender(),
            height: None,
            weight: None,
            medical_history: None,
            allergies: None,
            join_date: Utc::now(),
        }
    }

    pub fn view(&self) -> UserView {
        UserView {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            age: self.age.clone(),
            gender: self.gender.clone(),
            height: self.height.clone(),
            weight: self.weight.clone(),
            medical_history: self.medical_history.clone(),
            allergies: self.allergies.clone(),
            join_date: self.join_date,
        }
    }

    /// Apply a JSON object of profile changes. Any key outside the allowed
    /// profile fields rejects the whole update; `null` clears a field.
    pub fn apply_profile_update(&mut self, body: &Value) -> Result<(), AppError> {
        let obj = body
            .as_object()
            .ok_or_else(|| AppError::invalid("Invalid updates"))?;
        if !obj.keys().all(|k| PROFILE_FIELDS.contains(&k.as_str())) {
            return Err(AppError::invalid("Invalid updates"));
        }

        for (key, value) in obj {
            let value = optional_string(value)?;
            match key.as_str() {
                "fullName" => self.full_name = value,
                "age" => self.age = value,
                "gender" => self.gender = value.unwrap_or_else(default_gender),
                "height" => self.height = value,
                "weight" => self.weight = value,
                "medicalHistory" => self.medical_history = value,
                "allergies" => self.allergies = value,
                _ => {}
            }
        }
        Ok(())
    }
}

/// Accepts strings, numbers and `null`; anything else is an invalid update.
pub(crate) fn optional_string(v: &Value) -> Result<Option<String>, AppError> {
    match v {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Number(n) => Ok(Some(n.to_string())),
        _ => Err(AppError::invalid("Invalid updates")),
    }
}

/// Account as returned to clients (never includes the password hash).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<String>,
    pub gender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    pub join_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub token: String,
    pub user: UserView,
}

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteAccountRequest {
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserExport {
    pub user: UserView,
    pub health_records: Vec<HealthRecord>,
    pub exported_at: DateTime<Utc>,
}

/// Dev-only test account info. The password is the well-known test password.
#[derive(Debug, Clone, Serialize)]
pub struct TestUserInfo {
    pub message: String,
    pub username: String,
    pub password: String,
    pub note: String,
}

fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::invalid(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn session(auth: &Auth, user: &User) -> Result<Session, AppError> {
    Ok(Session {
        message: None,
        token: auth.issue_token(user.id)?,
        user: user.view(),
    })
}

pub async fn register(store: &dyn Store, auth: &Auth, req: RegisterRequest) -> Result<Session, AppError> {
    let username = req.username.trim();
    let email = req.email.trim();
    if username.is_empty() {
        return Err(AppError::invalid("Username is required"));
    }
    if !EMAIL_RE.is_match(email) {
        return Err(AppError::invalid("Please enter a valid email address"));
    }
    validate_password(&req.password)?;

    let user = User::new(username, email, auth.hash_password(&req.password)?);
    if let Err(e) = store.insert_user(user.clone()).await {
        if matches!(e, StoreError::Duplicate { .. }) {
            metrics::record_auth("register", "duplicate");
        }
        return Err(e.into());
    }

    info!(target: "healthtrack::users", user = %anon_hash(username), "user registered");
    metrics::record_auth("register", "ok");
    session(auth, &user)
}

pub async fn login(store: &dyn Store, auth: &Auth, req: LoginRequest) -> Result<Session, AppError> {
    let who = anon_hash(&req.username);
    let Some(user) = store.user_by_username(req.username.trim()).await? else {
        info!(target: "healthtrack::users", user = %who, "login failed: unknown user");
        metrics::record_auth("login", "unknown_user");
        return Err(AppError::invalid("User not found"));
    };

    if !auth.verify_password(&user.password_hash, &req.password) {
        info!(target: "healthtrack::users", user = %who, "login failed: wrong password");
        metrics::record_auth("login", "bad_password");
        return Err(AppError::invalid("Incorrect password"));
    }

    info!(target: "healthtrack::users", user = %who, "login ok");
    metrics::record_auth("login", "ok");
    session(auth, &user)
}

/// Apply a profile update to the stored account, not to a caller's snapshot.
pub async fn update_profile(store: &dyn Store, user_id: Uuid, body: &Value) -> Result<UserView, AppError> {
    let updated = store
        .modify_user(user_id, edit(|u: &mut User| u.apply_profile_update(body)))
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(updated.view())
}

pub async fn change_password(
    store: &dyn Store,
    auth: &Auth,
    user_id: Uuid,
    req: ChangePasswordRequest,
) -> Result<Message, AppError> {
    let new_hash = auth.hash_password(&req.new_password)?;
    let current = req.current_password.as_str();
    let new_password = req.new_password.as_str();

    let result = store
        .modify_user(
            user_id,
            edit(move |u: &mut User| {
                if !auth.verify_password(&u.password_hash, current) {
                    return Err(AppError::invalid("Current password is incorrect"));
                }
                validate_password(new_password)?;
                u.password_hash = new_hash;
                Ok(())
            }),
        )
        .await;

    match result {
        Ok(Some(_)) => {
            metrics::record_auth("change_password", "ok");
            Ok(Message::new("Password updated successfully"))
        }
        Ok(None) => Err(AppError::Unauthorized),
        Err(e) => {
            if matches!(e, StoreError::Rejected(_)) {
                metrics::record_auth("change_password", "rejected");
            }
            Err(e.into())
        }
    }
}

pub async fn delete_account(
    store: &dyn Store,
    auth: &Auth,
    user_id: Uuid,
    req: DeleteAccountRequest,
) -> Result<Message, AppError> {
    let user = store.user(user_id).await?.ok_or(AppError::Unauthorized)?;
    if !auth.verify_password(&user.password_hash, &req.password) {
        metrics::record_auth("delete_account", "bad_password");
        return Err(AppError::invalid("Password is incorrect"));
    }
    let removed = store.delete_user(user.id).await?;
    info!(
        target: "healthtrack::users",
        user = %anon_hash(&user.username),
        records = removed,
        "account deleted"
    );
    metrics::record_auth("delete_account", "ok");
    Ok(Message::new("Account deleted successfully"))
}

pub async fn export(store: &dyn Store, user: &User) -> Result<UserExport, AppError> {
    Ok(UserExport {
        user: user.view(),
        health_records: records::list(store, user.id).await?,
        exported_at: Utc::now(),
    })
}

/// Create the well-known test account if it does not exist yet.
pub async fn create_test_user(store: &dyn Store, auth: &Auth) -> Result<TestUserInfo, AppError> {
    let mut user = User::new(TEST_USERNAME, TEST_EMAIL, auth.hash_password(TEST_PASSWORD)?);
    user.full_name = Some(TEST_FULL_NAME.to_string());

    let message = match store.insert_user(user).await {
        Ok(()) => "Test user created successfully",
        Err(StoreError::Duplicate { .. }) => "Test user already exists",
        Err(e) => return Err(e.into()),
    };
    warn!(target: "healthtrack::users", "dev route used: create-test-user");

    Ok(TestUserInfo {
        message: message.to_string(),
        username: TEST_USERNAME.to_string(),
        password: TEST_PASSWORD.to_string(),
        note: "Use these credentials to login".to_string(),
    })
}

/// Issue a session for the test account without a password.
pub async fn emergency_login(store: &dyn Store, auth: &Auth) -> Result<Session, AppError> {
    let user = store.user_by_username(TEST_USERNAME).await?.ok_or_else(|| {
        AppError::not_found("Test user not found. Create it first with /api/users/create-test-user")
    })?;
    warn!(target: "healthtrack::users", "dev route used: emergency-login");
    let mut s = session(auth, &user)?;
    s.message = Some("Emergency login successful".to_string());
    Ok(s)
}
