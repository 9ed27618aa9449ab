//! Bearer tokens
//!
//! Format: `<userId>.<expiresAtMillis>.<hex hmac-sha256>` where the MAC covers
//! `<userId>.<expiresAtMillis>` under a server secret.

use std::time::Duration;

use cipherpost_core::{Timestamp, UserId};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Issues and verifies bearer tokens
pub struct TokenIssuer {
    secret: Zeroizing<Vec<u8>>,
    ttl: Duration,
}

impl TokenIssuer {
    /// Create an issuer from a server secret
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            secret: Zeroizing::new(secret.as_ref().to_vec()),
            ttl,
        }
    }

    /// Token lifetime
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|_| AuthError::InvalidToken)
    }

    /// Issue a token for `user`, valid from `now` for the configured lifetime
    pub fn issue(&self, user: UserId, now: Timestamp) -> Result<String, AuthError> {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let expires = now.as_millis().saturating_add(ttl_ms);
        let claims = format!("{user}.{expires}");

        let mut mac = self.mac()?;
        mac.update(claims.as_bytes());
        Ok(format!("{claims}.{}", hex::encode(mac.finalize().into_bytes())))
    }

    /// Verify a token and return the user it was issued to
    pub fn verify(&self, token: &str, now: Timestamp) -> Result<UserId, AuthError> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(user), Some(expires), Some(tag)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthError::InvalidToken);
        };

        let user: UserId = user.parse().map_err(|_| AuthError::InvalidToken)?;
        let expires: i64 = expires.parse().map_err(|_| AuthError::InvalidToken)?;
        let tag = hex::decode(tag).map_err(|_| AuthError::InvalidToken)?;

        let mut mac = self.mac()?;
        mac.update(format!("{user}.{expires}").as_bytes());
        mac.verify_slice(&tag).map_err(|_| AuthError::InvalidToken)?;

        if now.as_millis() >= expires {
            return Err(AuthError::TokenExpired);
        }
        Ok(user)
    }

    /// Verify an `Authorization` header value (`Bearer <token>`)
    pub fn verify_header(&self, header: Option<&str>, now: Timestamp) -> Result<UserId, AuthError> {
        let header = header.map(str::trim).filter(|h| !h.is_empty());
        let Some(header) = header else {
            return Err(AuthError::MissingToken);
        };
        let token = header
            .strip_prefix("Bearer ")
            .or_else(|| header.strip_prefix("bearer "))
            .map(str::trim)
            .unwrap_or_default();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        self.verify(token, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(b"test-secret", Duration::from_secs(60))
    }

    #[test]
    fn test_issue_verify() {
        let issuer = issuer();
        let now = Timestamp::from_millis(1_000);
        let token = issuer.issue(UserId::new(7), now).unwrap();

        assert!(token.starts_with("7.61000."));
        assert_eq!(issuer.verify(&token, now).unwrap(), UserId::new(7));
    }

    #[test]
    fn test_expired() {
        let issuer = issuer();
        let token = issuer.issue(UserId::new(7), Timestamp::from_millis(0)).unwrap();
        assert_eq!(
            issuer.verify(&token, Timestamp::from_millis(60_000)),
            Err(AuthError::TokenExpired)
        );
    }

    #[test]
    fn test_forged_claims_rejected() {
        let issuer = issuer();
        let now = Timestamp::from_millis(0);
        let token = issuer.issue(UserId::new(7), now).unwrap();
        let forged = token.replacen("7.", "8.", 1);
        assert_eq!(issuer.verify(&forged, now), Err(AuthError::InvalidToken));

        let other = TokenIssuer::new(b"other-secret", Duration::from_secs(60));
        assert_eq!(other.verify(&token, now), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_malformed_rejected() {
        let issuer = issuer();
        let now = Timestamp::now();
        for token in ["", "abc", "1.2", "x.2.00", "1.y.00", "1.2.zz"] {
            assert_eq!(issuer.verify(token, now), Err(AuthError::InvalidToken), "{token}");
        }
    }

    #[test]
    fn test_header_parsing() {
        let issuer = issuer();
        let now = Timestamp::from_millis(0);
        let token = issuer.issue(UserId::new(3), now).unwrap();

        assert_eq!(issuer.verify_header(None, now), Err(AuthError::MissingToken));
        assert_eq!(issuer.verify_header(Some("Bearer "), now), Err(AuthError::MissingToken));
        assert_eq!(
            issuer.verify_header(Some(&format!("Bearer {token}")), now),
            Ok(UserId::new(3))
        );
        assert_eq!(
            issuer.verify_header(Some("Bearer nonsense"), now),
            Err(AuthError::InvalidToken)
        );
    }
}
