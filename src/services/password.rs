// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Argon2id password hashing for email + password accounts.

use anyhow::anyhow;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use password_hash::{PasswordHash, SaltString};
use std::sync::OnceLock;

/// Fixed salt for the stand-in hash checked when an account has no password.
const DUMMY_SALT: &[u8] = b"learnpoints-no-account";

static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();

/// Hash a password into a PHC string.
///
/// CPU-heavy; callers on the async runtime go through [`hash_password_blocking`].
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| anyhow!("salt generation failed: {e}"))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| anyhow!(e.to_string()))?;

    let phc = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!(e.to_string()))?
        .to_string();
    Ok(phc)
}

/// Check a password against a stored PHC string. Malformed hashes never match.
pub fn verify_password(hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// PHC string with default Argon2 parameters that no real password produced.
fn dummy_hash() -> Option<&'static str> {
    DUMMY_HASH
        .get_or_init(|| {
            let salt = SaltString::encode_b64(DUMMY_SALT).ok()?;
            Argon2::default()
                .hash_password(b"no-account-has-this-password", &salt)
                .ok()
                .map(|hash| hash.to_string())
        })
        .as_deref()
}

/// Run a full verification that always fails.
///
/// Used for unknown emails and password-less accounts so they cost the
/// same Argon2 work as a wrong password.
pub fn verify_dummy(password: &str) -> bool {
    if let Some(hash) = dummy_hash() {
        let _ = verify_password(hash, password);
    }
    false
}

pub async fn hash_password_blocking(password: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password)).await?
}

pub async fn verify_password_blocking(hash: String, password: String) -> anyhow::Result<bool> {
    Ok(tokio::task::spawn_blocking(move || verify_password(&hash, &password)).await?)
}

pub async fn verify_dummy_blocking(password: String) -> anyhow::Result<bool> {
    Ok(tokio::task::spawn_blocking(move || verify_dummy(&password)).await?)
}
