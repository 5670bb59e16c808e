//! Stateless confirmation tokens.
//!
//! A token is `base64url(payload) "." base64url(tag)` where the payload is
//! `email:issued_at_millis:nonce` and the tag is HMAC-SHA256 over the payload
//! bytes. Nothing is stored server-side; verification only needs the signing
//! key and the current time. The nonce makes two tokens for the same email and
//! millisecond differ.

use anyhow::{anyhow, Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretSlice, SecretString};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TTL_SECONDS: u64 = 24 * 60 * 60;
const NONCE_LENGTH: usize = 16;
/// Tokens stamped further than this into the future are rejected.
const MAX_CLOCK_SKEW_MILLIS: i64 = 5 * 60 * 1000;
pub const MIN_SECRET_LENGTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TokenConfig {
    ttl: Duration,
}

impl TokenConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: u64) -> Self {
        self.ttl = Duration::from_secs(seconds.max(1));
        self
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenVerdict {
    Valid { email: String },
    /// Authentic but older than the TTL. The email is kept so callers can offer
    /// to register again.
    Expired { email: String },
    Malformed,
}

pub struct TokenCodec {
    key: SecretSlice<u8>,
    config: TokenConfig,
}

impl TokenCodec {
    /// Build a codec from the shared signing secret.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than [`MIN_SECRET_LENGTH`] bytes.
    pub fn new(secret: &SecretString, config: TokenConfig) -> Result<Self> {
        let bytes = secret.expose_secret().as_bytes();
        if bytes.len() < MIN_SECRET_LENGTH {
            return Err(anyhow!(
                "token secret must be at least {MIN_SECRET_LENGTH} bytes"
            ));
        }
        Ok(Self {
            key: SecretSlice::from(bytes.to_vec()),
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Issue a token for an already-normalized email.
    ///
    /// # Errors
    /// Returns an error if the OS random source fails.
    pub fn issue(&self, email: &str, issued_at: DateTime<Utc>) -> Result<String> {
        let mut nonce = [0u8; NONCE_LENGTH];
        OsRng
            .try_fill_bytes(&mut nonce)
            .context("failed to generate token nonce")?;
        let nonce = Base64UrlUnpadded::encode_string(&nonce);

        let payload = format!("{email}:{}:{nonce}", issued_at.timestamp_millis());
        self.seal(&payload)
    }

    /// Decode and check a token at `now`. Never consults external state.
    #[must_use]
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> TokenVerdict {
        let Some((payload_b64, tag_b64)) = token.trim().split_once('.') else {
            return TokenVerdict::Malformed;
        };
        let (Ok(payload), Ok(tag)) = (
            Base64UrlUnpadded::decode_vec(payload_b64),
            Base64UrlUnpadded::decode_vec(tag_b64),
        ) else {
            return TokenVerdict::Malformed;
        };

        let Ok(mut mac) = HmacSha256::new_from_slice(self.key.expose_secret()) else {
            return TokenVerdict::Malformed;
        };
        mac.update(&payload);
        if mac.verify_slice(&tag).is_err() {
            return TokenVerdict::Malformed;
        }

        let Ok(payload) = String::from_utf8(payload) else {
            return TokenVerdict::Malformed;
        };
        let Some((email, issued_at_millis)) = parse_payload(&payload) else {
            return TokenVerdict::Malformed;
        };

        let age = now.timestamp_millis().saturating_sub(issued_at_millis);
        if age < -MAX_CLOCK_SKEW_MILLIS {
            TokenVerdict::Malformed
        } else if age < self.config.ttl_millis() {
            TokenVerdict::Valid { email }
        } else {
            TokenVerdict::Expired { email }
        }
    }

    fn seal(&self, payload: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret())
            .map_err(|err| anyhow!("invalid token key: {err}"))?;
        mac.update(payload.as_bytes());
        let tag = mac.finalize().into_bytes();

        Ok(format!(
            "{}.{}",
            Base64UrlUnpadded::encode_string(payload.as_bytes()),
            Base64UrlUnpadded::encode_string(&tag)
        ))
    }
}

/// Split `email:issued_at:nonce` from the right so the local part may contain ':'.
fn parse_payload(payload: &str) -> Option<(String, i64)> {
    let mut fields = payload.rsplitn(3, ':');
    let nonce = fields.next()?;
    let issued_at = fields.next()?;
    let email = fields.next()?;

    if nonce.is_empty() || email.is_empty() {
        return None;
    }
    let issued_at = issued_at.parse::<i64>().ok()?;
    Some((email.to_string(), issued_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn codec() -> Result<TokenCodec> {
        TokenCodec::new(
            &SecretString::from("0123456789abcdef0123456789abcdef"),
            TokenConfig::new(),
        )
    }

    fn t0() -> Result<DateTime<Utc>> {
        DateTime::from_timestamp(1_700_000_000, 0).context("invalid timestamp")
    }

    #[test]
    fn rejects_short_secret() {
        let result = TokenCodec::new(&SecretString::from("short"), TokenConfig::new());
        assert!(result.is_err());
    }

    #[test]
    fn round_trip_within_window() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        let token = codec.issue("a@b.com", t0)?;

        for offset in [
            ChronoDuration::zero(),
            ChronoDuration::seconds(1),
            ChronoDuration::hours(12),
            ChronoDuration::hours(24) - ChronoDuration::milliseconds(1),
        ] {
            assert_eq!(
                codec.verify(&token, t0 + offset),
                TokenVerdict::Valid {
                    email: "a@b.com".to_string()
                }
            );
        }
        Ok(())
    }

    #[test]
    fn expiry_boundary() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        let token = codec.issue("a@b.com", t0)?;

        let before = t0 + ChronoDuration::hours(23) + ChronoDuration::minutes(59);
        let after = t0 + ChronoDuration::hours(24) + ChronoDuration::minutes(1);
        assert!(matches!(
            codec.verify(&token, before),
            TokenVerdict::Valid { .. }
        ));
        assert_eq!(
            codec.verify(&token, after),
            TokenVerdict::Expired {
                email: "a@b.com".to_string()
            }
        );
        assert!(matches!(
            codec.verify(&token, t0 + ChronoDuration::hours(24)),
            TokenVerdict::Expired { .. }
        ));
        Ok(())
    }

    #[test]
    fn tokens_for_same_email_differ() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        assert_ne!(codec.issue("a@b.com", t0)?, codec.issue("a@b.com", t0)?);
        Ok(())
    }

    #[test]
    fn email_with_colon_survives() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        let token = codec.issue("odd:local@b.com", t0)?;
        assert_eq!(
            codec.verify(&token, t0),
            TokenVerdict::Valid {
                email: "odd:local@b.com".to_string()
            }
        );
        Ok(())
    }

    #[test]
    fn garbage_is_malformed() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        for token in ["", ".", "no-dot-here", "!!!.???", "abc.def.ghi"] {
            assert_eq!(codec.verify(token, t0), TokenVerdict::Malformed, "{token}");
        }
        Ok(())
    }

    #[test]
    fn unsigned_legacy_token_is_malformed() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        let legacy = Base64UrlUnpadded::encode_string(
            format!("a@b.com:{}:k3j4h5", t0.timestamp_millis()).as_bytes(),
        );
        assert_eq!(codec.verify(&legacy, t0), TokenVerdict::Malformed);
        Ok(())
    }

    #[test]
    fn forged_email_is_malformed() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        let token = codec.issue("a@b.com", t0)?;
        let (_, tag) = token.split_once('.').context("token has no tag")?;

        let forged_payload = Base64UrlUnpadded::encode_string(
            format!("victim@b.com:{}:abcdef", t0.timestamp_millis()).as_bytes(),
        );
        let forged = format!("{forged_payload}.{tag}");
        assert_eq!(codec.verify(&forged, t0), TokenVerdict::Malformed);
        Ok(())
    }

    #[test]
    fn other_key_is_malformed() -> Result<()> {
        let t0 = t0()?;
        let token = codec()?.issue("a@b.com", t0)?;
        let other = TokenCodec::new(
            &SecretString::from("ffffffffffffffffffffffffffffffff"),
            TokenConfig::new(),
        )?;
        assert_eq!(other.verify(&token, t0), TokenVerdict::Malformed);
        Ok(())
    }

    #[test]
    fn signed_but_wrong_shape_is_malformed() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        for payload in [
            "a@b.com:1700000000000".to_string(),
            "a@b.com:not-a-number:nonce".to_string(),
            ":1700000000000:nonce".to_string(),
            "a@b.com:1700000000000:".to_string(),
        ] {
            let token = codec.seal(&payload)?;
            assert_eq!(codec.verify(&token, t0), TokenVerdict::Malformed, "{payload}");
        }
        Ok(())
    }

    #[test]
    fn far_future_issue_time_is_malformed() -> Result<()> {
        let codec = codec()?;
        let t0 = t0()?;
        let token = codec.issue("a@b.com", t0 + ChronoDuration::hours(1))?;
        assert_eq!(codec.verify(&token, t0), TokenVerdict::Malformed);

        let skewed = codec.issue("a@b.com", t0 + ChronoDuration::minutes(1))?;
        assert!(matches!(
            codec.verify(&skewed, t0),
            TokenVerdict::Valid { .. }
        ));
        Ok(())
    }

    #[test]
    fn custom_ttl_applies() -> Result<()> {
        let codec = TokenCodec::new(
            &SecretString::from("0123456789abcdef0123456789abcdef"),
            TokenConfig::new().with_ttl_seconds(60),
        )?;
        let t0 = t0()?;
        let token = codec.issue("a@b.com", t0)?;
        assert!(matches!(
            codec.verify(&token, t0 + ChronoDuration::seconds(59)),
            TokenVerdict::Valid { .. }
        ));
        assert!(matches!(
            codec.verify(&token, t0 + ChronoDuration::seconds(60)),
            TokenVerdict::Expired { .. }
        ));
        Ok(())
    }
}
