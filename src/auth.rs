// src/auth.rs
//! Password hashing, signed session tokens, and the `AuthUser` extractor.
//!
//! Password hashes: `hs256$<rounds>$<salt>$<hex digest>`, where the digest is
//! HMAC-SHA256 keyed by the salt and chained `rounds` times over the password.
//!
//! Session tokens: `v1.<user id>.<expiry unix secs>.<hex HMAC-SHA256>` with the
//! MAC computed over everything before the last dot.

use anyhow::anyhow;
use axum::{extract::FromRequestParts, http::request::Parts};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;
use uuid::Uuid;

use crate::api::AppState;
use crate::config::AuthConfig;
use crate::error::AppError;
use crate::users::User;

type HmacSha256 = Hmac<Sha256>;

const HASH_SCHEME: &str = "hs256";
const TOKEN_VERSION: &str = "v1";

/// Hashing and token signing, built once from `AuthConfig`.
#[derive(Clone)]
pub struct Auth {
    secret: Vec<u8>,
    token_ttl: Duration,
    hash_rounds: u32,
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Auth")
            .field("token_ttl", &self.token_ttl)
            .field("hash_rounds", &self.hash_rounds)
            .finish_non_exhaustive()
    }
}

impl Auth {
    pub fn new(cfg: &AuthConfig) -> Self {
        Self {
            secret: cfg.token_secret.as_bytes().to_vec(),
            token_ttl: Duration::days(cfg.token_ttl_days.max(1) as i64),
            hash_rounds: cfg.hash_rounds.max(1),
        }
    }

    /// Salted, stretched hash of `password`.
    pub fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = stretch(salt.as_bytes(), password.as_bytes(), self.hash_rounds)?
            .finalize()
            .into_bytes();
        Ok(format!(
            "{HASH_SCHEME}${}${salt}${}",
            self.hash_rounds,
            to_hex(&digest)
        ))
    }

    /// Check `password` against a stored hash. Malformed hashes never verify.
    pub fn verify_password(&self, stored: &str, password: &str) -> bool {
        let mut parts = stored.split('$');
        let (Some(HASH_SCHEME), Some(rounds), Some(salt), Some(hex), None) = (
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
            parts.next(),
        ) else {
            return false;
        };
        let (Ok(rounds), Some(expected)) = (rounds.parse::<u32>(), from_hex(hex)) else {
            return false;
        };
        stretch(salt.as_bytes(), password.as_bytes(), rounds.max(1))
            .is_ok_and(|mac| mac.verify_slice(&expected).is_ok())
    }

    pub fn issue_token(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.issue_token_at(user_id, Utc::now())
    }

    pub fn issue_token_at(&self, user_id: Uuid, now: DateTime<Utc>) -> anyhow::Result<String> {
        let exp = (now + self.token_ttl).timestamp();
        let payload = format!("{TOKEN_VERSION}.{user_id}.{exp}");
        let sig = self.sign(payload.as_bytes())?;
        Ok(format!("{payload}.{}", to_hex(&sig)))
    }

    /// User id carried by a valid, unexpired token.
    pub fn verify_token(&self, token: &str, now: DateTime<Utc>) -> Option<Uuid> {
        let (payload, sig_hex) = token.trim().rsplit_once('.')?;
        let sig = from_hex(sig_hex)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&sig).ok()?;

        let mut parts = payload.split('.');
        let (Some(TOKEN_VERSION), Some(id), Some(exp), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return None;
        };
        let exp: i64 = exp.parse().ok()?;
        if exp <= now.timestamp() {
            debug!(target: "healthtrack::auth", "expired token rejected");
            return None;
        }
        Uuid::parse_str(id).ok()
    }

    fn sign(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| anyhow!("hmac key: {e}"))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Chain `rounds` salted MACs over the password. The last round is returned
/// unfinalized so callers either emit the digest or compare it with `verify_slice`.
fn stretch(salt: &[u8], password: &[u8], rounds: u32) -> anyhow::Result<HmacSha256> {
    let round = |block: &[u8]| -> anyhow::Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(salt).map_err(|e| anyhow!("hmac key: {e}"))?;
        mac.update(block);
        mac.update(password);
        Ok(mac)
    };

    let mut block = password.to_vec();
    for _ in 1..rounds {
        block = round(&block)?.finalize().into_bytes().to_vec();
    }
    round(&block)
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// The authenticated account behind a `Bearer` token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AppError::Unauthorized)?;

        let user_id = state
            .auth
            .verify_token(token, Utc::now())
            .ok_or(AppError::Unauthorized)?;

        state
            .store
            .user(user_id)
            .await?
            .map(AuthUser)
            .ok_or(AppError::Unauthorized)
    }
}
