//! Stateless confirmation codes.
//!
//! A code is `<issued-at, hex>-<truncated HMAC-SHA256, base64url>`. The MAC
//! covers the user id, email, confirmation generation and issue time, so
//! nothing is stored server side. Bumping the generation when a code is
//! exchanged invalidates every code issued before it; changing the email
//! does the same.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::user::User;

/// HMAC output length kept in the code (20 base64 characters).
const MAC_LENGTH: usize = 15;

/// The user state a code is bound to.
#[derive(Debug, Clone, Copy)]
pub struct CodeSubject<'a> {
    pub user_id: i64,
    pub email: &'a str,
    pub generation: i64,
}

impl<'a> From<&'a User> for CodeSubject<'a> {
    fn from(user: &'a User) -> Self {
        Self {
            user_id: user.id,
            email: &user.email,
            generation: user.confirmation_generation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeError {
    Malformed,
    Mismatch,
    Expired,
}

impl std::fmt::Display for CodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeError::Malformed => write!(f, "malformed confirmation code"),
            CodeError::Mismatch => write!(f, "confirmation code does not match"),
            CodeError::Expired => write!(f, "confirmation code has expired"),
        }
    }
}

impl std::error::Error for CodeError {}

/// Issues and verifies confirmation codes with a server secret.
#[derive(Clone)]
pub struct ConfirmationCodes {
    key: Vec<u8>,
    ttl_seconds: u64,
}

impl ConfirmationCodes {
    pub fn new(secret: &str, ttl_seconds: u64) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
            ttl_seconds,
        }
    }

    pub fn issue(&self, subject: CodeSubject<'_>) -> String {
        self.issue_at(subject, now())
    }

    pub fn verify(&self, subject: CodeSubject<'_>, code: &str) -> Result<(), CodeError> {
        self.verify_at(subject, code, now())
    }

    fn issue_at(&self, subject: CodeSubject<'_>, issued_at: u64) -> String {
        let tag = self.mac(subject, issued_at).finalize().into_bytes();
        format!("{:x}-{}", issued_at, URL_SAFE_NO_PAD.encode(&tag[..MAC_LENGTH]))
    }

    fn verify_at(&self, subject: CodeSubject<'_>, code: &str, now: u64) -> Result<(), CodeError> {
        // The timestamp is hex, so the first '-' always ends it even though
        // the base64url part may contain '-' too.
        let (ts_part, tag_part) = code.trim().split_once('-').ok_or(CodeError::Malformed)?;
        let issued_at = u64::from_str_radix(ts_part, 16).map_err(|_| CodeError::Malformed)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag_part)
            .map_err(|_| CodeError::Malformed)?;
        if tag.len() != MAC_LENGTH {
            return Err(CodeError::Malformed);
        }

        // Constant-time comparison against the truncated MAC.
        self.mac(subject, issued_at)
            .verify_truncated_left(&tag)
            .map_err(|_| CodeError::Mismatch)?;

        if issued_at > now || now - issued_at > self.ttl_seconds {
            return Err(CodeError::Expired);
        }

        Ok(())
    }

    fn mac(&self, subject: CodeSubject<'_>, issued_at: u64) -> Hmac<Sha256> {
        // HMAC accepts keys of any length.
        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.key)
            .unwrap_or_else(|_| unreachable!("HMAC-SHA256 accepts any key length"));
        mac.update(
            format!(
                "{}:{}:{}:{}",
                subject.user_id, subject.email, subject.generation, issued_at
            )
            .as_bytes(),
        );
        mac
    }
}

fn now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
