// src/config.rs
//! Service configuration: TOML file plus environment overrides.
//!
//! Resolution order for every value: env var → `config/healthtrack.toml` → default.
//! A missing config file is not an error; a malformed one is.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// --- env defaults & names ---
pub const DEFAULT_CONFIG_PATH: &str = "config/healthtrack.toml";
pub const DEFAULT_TOKEN_SECRET: &str = "health-track-secret-key";

pub const ENV_CONFIG_PATH: &str = "HEALTHTRACK_CONFIG_PATH";
pub const ENV_TOKEN_SECRET: &str = "JWT_SECRET";
pub const ENV_DATA_PATH: &str = "HEALTHTRACK_DATA_PATH";
pub const ENV_DEV_ROUTES: &str = "HEALTHTRACK_DEV_ROUTES";
pub const ENV_KNOWLEDGE_PATH: &str = "HEALTHTRACK_KNOWLEDGE_PATH";
pub const ENV_MAX_SYMPTOMS: &str = "HEALTHTRACK_MAX_SYMPTOMS";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// Directory served as static files (the browser UI). Ignored when absent.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    /// Enables `/api/users/create-test-user` and `/api/users/emergency-login`.
    #[serde(default)]
    pub dev_routes: bool,
    /// JSON snapshot of the document store. In-memory only when `None`.
    #[serde(default)]
    pub data_path: Option<PathBuf>,
}

fn default_token_secret() -> String {
    DEFAULT_TOKEN_SECRET.to_string()
}
fn default_token_ttl_days() -> u32 {
    30
}
fn default_hash_rounds() -> u32 {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_token_secret")]
    pub token_secret: String,
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: u32,
    /// HMAC-SHA256 stretching rounds for password hashes.
    #[serde(default = "default_hash_rounds")]
    pub hash_rounds: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: default_token_secret(),
            token_ttl_days: default_token_ttl_days(),
            hash_rounds: default_hash_rounds(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeConfig {
    /// TOML knowledge base. The built-in seed is used when `None` or unreadable.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Tuning constants of the symptom matcher. Defaults reproduce the shipped heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Weight of disease coverage inside the coverage score (selection gets `1 - w`).
    pub disease_coverage_weight: f64,
    /// Weight of the coverage score inside the weighted score (severity gets `1 - w`).
    pub coverage_weight: f64,
    /// Minimum confidence for any disease with at least one match.
    pub match_floor: f64,
    /// Bonus factor: `scale = 1 + match_bonus * diseaseCoverage`.
    pub match_bonus: f64,
    /// Absolute floor of any non-zero confidence.
    pub min_confidence: f64,
    /// Upper cap applied after the bonus.
    pub max_confidence: f64,
    /// Largest accepted number of distinct selected symptoms.
    pub max_symptoms: usize,
    /// Number of runner-up diseases reported as alternatives.
    pub alternatives: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            disease_coverage_weight: 0.7,
            coverage_weight: 0.7,
            match_floor: 0.30,
            match_bonus: 0.5,
            min_confidence: 0.01,
            max_confidence: 1.0,
            max_symptoms: 10,
            alternatives: 3,
        }
    }
}

impl ScoringConfig {
    /// Replace out-of-range values with their defaults and keep the bounds ordered.
    pub fn sanitized(mut self) -> Self {
        let d = Self::default();
        let unit = |x: f64| x.is_finite() && (0.0..=1.0).contains(&x);

        if !unit(self.disease_coverage_weight) {
            self.disease_coverage_weight = d.disease_coverage_weight;
        }
        if !unit(self.coverage_weight) {
            self.coverage_weight = d.coverage_weight;
        }
        if !unit(self.match_floor) {
            self.match_floor = d.match_floor;
        }
        if !self.match_bonus.is_finite() || self.match_bonus < 0.0 {
            self.match_bonus = d.match_bonus;
        }
        if !unit(self.min_confidence) {
            self.min_confidence = d.min_confidence;
        }
        if !self.max_confidence.is_finite() {
            self.max_confidence = d.max_confidence;
        }
        self.max_confidence = self.max_confidence.clamp(d.min_confidence, 1.0);
        if self.min_confidence > self.max_confidence {
            std::mem::swap(&mut self.min_confidence, &mut self.max_confidence);
        }
        if self.max_symptoms == 0 {
            self.max_symptoms = d.max_symptoms;
        }
        self
    }
}

impl AppConfig {
    /// Load from `$HEALTHTRACK_CONFIG_PATH` or `config/healthtrack.toml`, then apply env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = if path.exists() {
            Self::from_path(&path)?
        } else {
            warn!(target: "healthtrack::config", path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        cfg.apply_env();
        cfg.scoring = cfg.scoring.sanitized();

        info!(
            target: "healthtrack::config",
            dev_routes = cfg.server.dev_routes,
            persistent = cfg.server.data_path.is_some(),
            max_symptoms = cfg.scoring.max_symptoms,
            "configuration loaded"
        );
        Ok(cfg)
    }

    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        let mut cfg: AppConfig = toml::from_str(s)?;
        cfg.scoring = cfg.scoring.sanitized();
        Ok(cfg)
    }

    /// Env overrides. Unparsable numeric values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(secret) = std::env::var(ENV_TOKEN_SECRET) {
            if !secret.trim().is_empty() {
                self.auth.token_secret = secret;
            }
        }
        if let Ok(p) = std::env::var(ENV_DATA_PATH) {
            self.server.data_path = non_empty_path(p);
        }
        if let Ok(p) = std::env::var(ENV_KNOWLEDGE_PATH) {
            self.knowledge.path = non_empty_path(p);
        }
        if let Some(on) = parse_flag(std::env::var(ENV_DEV_ROUTES).ok()) {
            self.server.dev_routes = on;
        }
        if let Some(n) = parse_usize(std::env::var(ENV_MAX_SYMPTOMS).ok()) {
            self.scoring.max_symptoms = n;
        }
    }
}

fn non_empty_path(raw: String) -> Option<PathBuf> {
    let t = raw.trim();
    (!t.is_empty()).then(|| PathBuf::from(t))
}

fn parse_flag(raw: Option<String>) -> Option<bool> {
    match raw?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_usize(raw: Option<String>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
}
