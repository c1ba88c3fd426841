// SPDX-FileCopyrightText: 2024 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Minting and decoding of access and refresh tokens (HS256 JWTs).
//!
//! Domain checks on top of the raw JWT (token type, user existence and
//! active flag) live in the auth service; this module only handles the
//! cryptographic envelope.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use cachet_common::identifiers::UserId;

use crate::settings::AuthSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User id, stringified.
    pub sub: String,
    pub jti: Uuid,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Option<UserId> {
        self.sub.parse().ok().map(UserId::new)
    }
}

/// Decode-level failures; the caller maps these onto its own error space.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenDecodeError {
    #[error("malformed token")]
    Malformed,
    #[error("token expired")]
    Expired,
}

#[derive(Debug, Error)]
#[error("failed to encode token")]
pub struct TokenEncodeError(#[from] jsonwebtoken::errors::Error);

/// A freshly minted refresh token together with the identifiers the service
/// persists for later revocation.
#[derive(Debug, Clone)]
pub struct MintedRefreshToken {
    pub token: String,
    pub jti: Uuid,
    pub expires_at: chrono::DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(settings: &AuthSettings) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(settings.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.jwt_secret.as_bytes()),
            access_ttl: Duration::seconds(settings.access_token_ttl_seconds),
            refresh_ttl: Duration::seconds(settings.refresh_token_ttl_seconds),
        }
    }

    pub fn mint_access(&self, user_id: UserId) -> Result<String, TokenEncodeError> {
        let (token, _) = self.mint(user_id, TokenType::Access, self.access_ttl)?;
        Ok(token)
    }

    pub fn mint_refresh(&self, user_id: UserId) -> Result<MintedRefreshToken, TokenEncodeError> {
        let (token, claims) = self.mint(user_id, TokenType::Refresh, self.refresh_ttl)?;
        Ok(MintedRefreshToken {
            token,
            jti: claims.jti,
            expires_at: chrono::DateTime::from_timestamp(claims.exp, 0)
                .unwrap_or_else(Utc::now),
        })
    }

    fn mint(
        &self,
        user_id: UserId,
        token_type: TokenType,
        ttl: Duration,
    ) -> Result<(String, Claims), TokenEncodeError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4(),
            token_type,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        let token = jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, claims))
    }

    pub fn decode(&self, token: &str) -> Result<Claims, TokenDecodeError> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|error| match error.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenDecodeError::Expired,
                _ => TokenDecodeError::Malformed,
            })
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&AuthSettings {
            jwt_secret: "test-secret".to_owned(),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 3600,
            secure_cookies: false,
            validate_password_strength: false,
        })
    }

    #[test]
    fn access_token_round_trips() {
        let issuer = issuer();
        let token = issuer.mint_access(UserId::new(42)).unwrap();
        let claims = issuer.decode(&token).unwrap();
        assert_eq!(claims.user_id(), Some(UserId::new(42)));
        assert_eq!(claims.token_type, TokenType::Access);
    }

    #[test]
    fn refresh_token_carries_jti() {
        let issuer = issuer();
        let minted = issuer.mint_refresh(UserId::new(7)).unwrap();
        let claims = issuer.decode(&minted.token).unwrap();
        assert_eq!(claims.jti, minted.jti);
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert_eq!(claims.exp, minted.expires_at.timestamp());
    }

    #[test]
    fn garbage_is_malformed() {
        assert_eq!(
            issuer().decode("not-a-token"),
            Err(TokenDecodeError::Malformed)
        );
    }

    #[test]
    fn tokens_from_another_secret_are_rejected() {
        let other = TokenIssuer::new(&AuthSettings {
            jwt_secret: "other-secret".to_owned(),
            access_token_ttl_seconds: 900,
            refresh_token_ttl_seconds: 3600,
            secure_cookies: false,
            validate_password_strength: false,
        });
        let token = other.mint_access(UserId::new(1)).unwrap();
        assert_eq!(issuer().decode(&token), Err(TokenDecodeError::Malformed));
    }
}
