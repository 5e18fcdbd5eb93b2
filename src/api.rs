// src/api.rs
//! HTTP surface: the axum router and its handlers.
//!
//! Handlers stay thin; validation and persistence live in `users`, `records`
//! and `insights`, scoring in `matcher`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{Auth, AuthUser};
use crate::config::{AppConfig, DEFAULT_TOKEN_SECRET};
use crate::error::AppError;
use crate::insights::{self, HealthInsights};
use crate::knowledge::{Disease, KnowledgeBase, SeveritySummary, SymptomInfo};
use crate::matcher::SymptomMatcher;
use crate::metrics::{self, Metrics};
use crate::prediction::PredictionResult;
use crate::records::{self, HealthRecord};
use crate::store::{MemoryStore, Store};
use crate::users::{
    self, ChangePasswordRequest, DeleteAccountRequest, LoginRequest, Message, RegisterRequest,
    Session, TestUserInfo, UserExport, UserView,
};

const DEFAULT_LIST_LIMIT: usize = 10;

/// Shared handles passed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub matcher: Arc<SymptomMatcher>,
    pub store: Arc<dyn Store>,
    pub auth: Arc<Auth>,
}

impl AppState {
    /// Knowledge base from the configured file (or the built-in seed) and a
    /// store snapshotted to `server.data_path` when set.
    pub async fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn Store> = match &config.server.data_path {
            Some(path) => Arc::new(MemoryStore::open(path).await?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_store(config, store))
    }

    /// Volatile state; nothing touches the filesystem except an optional knowledge file.
    pub fn in_memory(config: AppConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    fn with_store(config: AppConfig, store: Arc<dyn Store>) -> Self {
        let kb = match &config.knowledge.path {
            Some(path) => KnowledgeBase::load_from_file(path),
            None => KnowledgeBase::default_seed(),
        };
        if config.auth.token_secret == DEFAULT_TOKEN_SECRET {
            warn!(target: "healthtrack::api", "using the built-in token secret; set JWT_SECRET");
        }

        Self {
            matcher: Arc::new(SymptomMatcher::new(Arc::new(kb), config.scoring)),
            auth: Arc::new(Auth::new(&config.auth)),
            store,
            config: Arc::new(config),
        }
    }

    fn knowledge(&self) -> &KnowledgeBase {
        self.matcher.knowledge()
    }
}

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let metrics = Metrics::init(state.knowledge().diseases().len());
    let dev_routes = state.config.server.dev_routes;
    let static_dir = state.config.server.static_dir.clone();

    let mut api = Router::new()
        .route("/health", get(|| async { "OK" }))
        // prediction
        .route("/api/predict", post(predict))
        .route("/api/predict/save", post(save_prediction))
        // vocabulary
        .route("/api/symptoms", get(list_symptoms))
        .route("/api/symptoms/common", get(common_symptoms))
        .route("/api/symptoms/search", get(search_symptoms))
        .route("/api/diseases", get(list_diseases))
        .route("/api/diseases/{name}", get(disease_info))
        // users
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/profile", get(profile).put(update_profile))
        .route("/api/users/change-password", post(change_password))
        .route("/api/users/export", get(export))
        .route("/api/users", axum::routing::delete(delete_account))
        // records
        .route("/api/health-records", get(list_records).post(create_record))
        .route("/api/health-records/insights", get(record_insights))
        .route("/api/health-records/{id}", put(update_record).delete(delete_record));

    if dev_routes {
        warn!(target: "healthtrack::api", "dev routes enabled");
        api = api
            .route("/api/users/create-test-user", get(create_test_user))
            .route("/api/users/emergency-login", get(emergency_login));
    }

    let mut app = api
        .layer(CorsLayer::very_permissive())
        .with_state(state)
        .merge(metrics.router());

    if let Some(dir) = static_dir {
        info!(target: "healthtrack::api", dir = %dir.display(), "serving static files");
        app = app.fallback_service(ServeDir::new(dir));
    }
    app
}

// ---------- prediction ----------

#[derive(Debug, Deserialize)]
struct PredictRequest {
    #[serde(alias = "selectedSymptoms")]
    symptoms: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PredictResponse {
    #[serde(flatten)]
    result: PredictionResult,
    severity: SeveritySummary,
}

#[derive(Debug, Serialize)]
struct SavedPredictionResponse {
    message: &'static str,
    record: HealthRecord,
    prediction: PredictionResult,
}

/// Run the matcher and record its outcome and latency.
fn run_prediction(state: &AppState, symptoms: &[String]) -> Result<PredictionResult, AppError> {
    let started = Instant::now();
    let outcome = state.matcher.predict(symptoms);
    let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

    match outcome {
        Ok(r) => {
            metrics::record_prediction(if r.is_unknown() { "unknown" } else { "ok" }, elapsed_ms);
            Ok(r)
        }
        Err(e) => {
            metrics::record_prediction("invalid", elapsed_ms);
            Err(e.into())
        }
    }
}

async fn predict(
    State(state): State<AppState>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, AppError> {
    let result = run_prediction(&state, &req.symptoms)?;
    let severity = state.matcher.severity_summary(&req.symptoms)?;
    Ok(Json(PredictResponse { result, severity }))
}

async fn save_prediction(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<PredictRequest>,
) -> Result<(StatusCode, Json<SavedPredictionResponse>), AppError> {
    let prediction = run_prediction(&state, &req.symptoms)?;
    if prediction.is_unknown() {
        return Err(AppError::invalid("No prediction to save"));
    }

    let record = HealthRecord::from_prediction(user.id, &req.symptoms, &prediction, Utc::now().date_naive());
    let record = records::insert(state.store.as_ref(), record).await?;
    Ok((
        StatusCode::CREATED,
        Json(SavedPredictionResponse {
            message: "Prediction saved to health records",
            record,
            prediction,
        }),
    ))
}

// ---------- vocabulary ----------

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    q: String,
    limit: Option<usize>,
}

async fn list_symptoms(State(state): State<AppState>) -> Json<Vec<SymptomInfo>> {
    Json(state.knowledge().symptom_infos())
}

async fn common_symptoms(State(state): State<AppState>, Query(q): Query<LimitQuery>) -> Json<Vec<String>> {
    Json(
        state
            .knowledge()
            .common_symptoms(q.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
    )
}

async fn search_symptoms(State(state): State<AppState>, Query(q): Query<SearchQuery>) -> Json<Vec<String>> {
    Json(
        state
            .knowledge()
            .search(&q.q, q.limit.unwrap_or(DEFAULT_LIST_LIMIT)),
    )
}

async fn list_diseases(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(
        state
            .knowledge()
            .disease_names()
            .into_iter()
            .map(str::to_string)
            .collect(),
    )
}

async fn disease_info(State(state): State<AppState>, Path(name): Path<String>) -> Result<Json<Disease>, AppError> {
    state
        .knowledge()
        .disease(&name)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found("Disease not found"))
}

// ---------- users ----------

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = users::register(state.store.as_ref(), &state.auth, req).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Result<Json<Session>, AppError> {
    users::login(state.store.as_ref(), &state.auth, req).await.map(Json)
}

async fn profile(AuthUser(user): AuthUser) -> Json<UserView> {
    Json(user.view())
}

async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<Value>,
) -> Result<Json<UserView>, AppError> {
    users::update_profile(state.store.as_ref(), user.id, &body).await.map(Json)
}

async fn change_password(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<Message>, AppError> {
    users::change_password(state.store.as_ref(), &state.auth, user.id, req)
        .await
        .map(Json)
}

async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<DeleteAccountRequest>,
) -> Result<Json<Message>, AppError> {
    users::delete_account(state.store.as_ref(), &state.auth, user.id, req)
        .await
        .map(Json)
}

async fn export(State(state): State<AppState>, AuthUser(user): AuthUser) -> Result<Json<UserExport>, AppError> {
    users::export(state.store.as_ref(), &user).await.map(Json)
}

async fn create_test_user(State(state): State<AppState>) -> Result<Json<TestUserInfo>, AppError> {
    users::create_test_user(state.store.as_ref(), &state.auth)
        .await
        .map(Json)
}

async fn emergency_login(State(state): State<AppState>) -> Result<Json<Session>, AppError> {
    users::emergency_login(state.store.as_ref(), &state.auth)
        .await
        .map(Json)
}

// ---------- health records ----------

/// Ids that are not UUIDs cannot name a record.
fn record_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::not_found("Record not found"))
}

async fn list_records(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<Vec<HealthRecord>>, AppError> {
    records::list(state.store.as_ref(), user.id).await.map(Json)
}

async fn create_record(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(body): Json<Value>,
) -> Result<(StatusCode, Json<HealthRecord>), AppError> {
    let record = records::create(state.store.as_ref(), user.id, &body).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<HealthRecord>, AppError> {
    records::update(state.store.as_ref(), user.id, record_id(&id)?, &body)
        .await
        .map(Json)
}

async fn delete_record(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Message>, AppError> {
    records::delete(state.store.as_ref(), user.id, record_id(&id)?).await?;
    Ok(Json(Message::new("Record deleted successfully")))
}

async fn record_insights(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<Json<HealthInsights>, AppError> {
    let records = records::list(state.store.as_ref(), user.id).await?;
    Ok(Json(insights::analyze(&records)))
}
