// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! User accounts and credentials.
//!
//! Issues short-lived access tokens backed by revocable refresh tokens and
//! resolves presented access tokens to an active user identity. Passwords
//! are hashed with Argon2id; tokens are HS256 JWTs.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use thiserror::Error;

use cachet_common::{
    identifiers::UserId,
    material::{MaterialError, MlKemPublicKey},
};

use crate::{
    errors::{is_unique_violation, ErrorKind, StorageError},
    service::{BackendService, ServiceCreationError},
    settings::Settings,
};

mod refresh_token;
mod tokens;
mod user_record;

pub use refresh_token::RefreshTokenRecord;
pub use tokens::{Claims, TokenIssuer, TokenType};
pub use user_record::UserRecord;

use tokens::{TokenDecodeError, TokenEncodeError};

/// The identity attached to a session after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
    pub username: String,
}

/// Credentials handed out on register and login.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub refresh_expires_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad request payload; the message is shown to the client.
    #[error("{0}")]
    InvalidRequest(String),
    #[error("Username already exists")]
    UsernameTaken,
    #[error("Invalid username or password")]
    InvalidCredentials,
    #[error("Refresh token not found")]
    MissingRefreshToken,
    #[error("Invalid refresh token")]
    InvalidRefreshToken,
    #[error("Token has been revoked")]
    RefreshTokenRevoked,
    #[error("Failed to issue tokens")]
    TokenIssuance(#[from] TokenEncodeError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::InvalidRequest(_) => ErrorKind::Validation,
            AuthError::UsernameTaken => ErrorKind::Conflict,
            AuthError::InvalidCredentials
            | AuthError::MissingRefreshToken
            | AuthError::InvalidRefreshToken
            | AuthError::RefreshTokenRevoked => ErrorKind::Unauthenticated,
            AuthError::TokenIssuance(_) | AuthError::Storage(_) => ErrorKind::StorageFailure,
        }
    }
}

/// Why an access token did not resolve to an active user.
#[derive(Debug, Error)]
pub enum AccessTokenError {
    #[error("malformed access token")]
    Malformed,
    #[error("wrong token type")]
    WrongType,
    #[error("access token expired")]
    Expired,
    #[error("unknown user")]
    UserUnknown,
    #[error("user is disabled")]
    UserDisabled,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub username: String,
    pub password: String,
    pub public_key: String,
}

#[derive(Clone, Debug)]
pub struct AuthService {
    db_pool: PgPool,
    tokens: TokenIssuer,
    validate_password_strength: bool,
}

#[async_trait]
impl BackendService for AuthService {
    async fn initialize(
        db_pool: PgPool,
        settings: &Settings,
    ) -> Result<Self, ServiceCreationError> {
        Ok(Self {
            db_pool,
            tokens: TokenIssuer::new(&settings.auth),
            validate_password_strength: settings.auth.validate_password_strength,
        })
    }
}

impl AuthService {
    /// Register a new account and log it in.
    #[tracing::instrument(skip_all, fields(username = %request.username))]
    pub async fn register(
        &self,
        request: RegistrationRequest,
    ) -> Result<(UserRecord, SessionTokens), AuthError> {
        let username = request.username.trim();
        validate_username(username)?;
        validate_password(&request.password, self.validate_password_strength)?;
        let public_key = MlKemPublicKey::try_from(request.public_key.trim().to_owned())
            .map_err(invalid_material)?;

        let password_hash = hash_password(&request.password)?;
        let user =
            UserRecord::store_new(&self.db_pool, username, &password_hash, &public_key)
                .await
                .map_err(|error| {
                    if is_unique_violation(&error) {
                        AuthError::UsernameTaken
                    } else {
                        AuthError::Storage(error.into())
                    }
                })?;

        let session = self.issue_tokens(user.id).await?;
        tracing::info!(user_id = %user.id, "registered new user");
        Ok((user, session))
    }

    /// Verify a password and hand out fresh credentials.
    #[tracing::instrument(skip_all, fields(username = %username))]
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(UserRecord, SessionTokens), AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidRequest(
                "Username and password are required".to_owned(),
            ));
        }
        let user = UserRecord::load_by_username(&self.db_pool, username.trim())
            .await?
            .filter(|user| user.is_active)
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&user.password_hash, password) {
            return Err(AuthError::InvalidCredentials);
        }
        let session = self.issue_tokens(user.id).await?;
        Ok((user, session))
    }

    /// Exchange a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AuthError> {
        let claims = self
            .tokens
            .decode(refresh_token)
            .map_err(|_| AuthError::InvalidRefreshToken)?;
        if claims.token_type != TokenType::Refresh {
            return Err(AuthError::InvalidRefreshToken);
        }
        let user_id = claims.user_id().ok_or(AuthError::InvalidRefreshToken)?;

        let record = RefreshTokenRecord::load(&self.db_pool, claims.jti).await?;
        match record {
            Some(record) if !record.revoked => {
                Ok(self.tokens.mint_access(user_id)?)
            }
            _ => Err(AuthError::RefreshTokenRevoked),
        }
    }

    /// Revoke the presented refresh token. Invalid tokens are ignored: the
    /// client is logging out either way.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        if let Ok(claims) = self.tokens.decode(refresh_token) {
            if claims.token_type == TokenType::Refresh {
                RefreshTokenRecord::revoke(&self.db_pool, claims.jti).await?;
            }
        }
        Ok(())
    }

    /// Resolve an access token to an active user identity. This is the
    /// gatekeeper of the realtime handshake and the HTTP user endpoints.
    pub async fn verify_access_token(
        &self,
        token: &str,
    ) -> Result<AuthenticatedUser, AccessTokenError> {
        let claims = self.tokens.decode(token).map_err(|error| match error {
            TokenDecodeError::Expired => AccessTokenError::Expired,
            TokenDecodeError::Malformed => AccessTokenError::Malformed,
        })?;
        if claims.token_type != TokenType::Access {
            return Err(AccessTokenError::WrongType);
        }
        let user_id = claims.user_id().ok_or(AccessTokenError::Malformed)?;
        let user = UserRecord::load(&self.db_pool, user_id)
            .await?
            .ok_or(AccessTokenError::UserUnknown)?;
        if !user.is_active {
            return Err(AccessTokenError::UserDisabled);
        }
        Ok(AuthenticatedUser {
            user_id: user.id,
            username: user.username,
        })
    }

    pub async fn user(&self, user_id: UserId) -> Result<Option<UserRecord>, StorageError> {
        UserRecord::load(&self.db_pool, user_id).await
    }

    pub async fn user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StorageError> {
        UserRecord::load_by_username(&self.db_pool, username).await
    }

    pub async fn search_users(
        &self,
        query: &str,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<UserRecord>, i64), StorageError> {
        UserRecord::search(&self.db_pool, query, offset, limit).await
    }

    async fn issue_tokens(&self, user_id: UserId) -> Result<SessionTokens, AuthError> {
        let access_token = self.tokens.mint_access(user_id)?;
        let refresh = self.tokens.mint_refresh(user_id)?;
        RefreshTokenRecord::store(&self.db_pool, refresh.jti, user_id, refresh.expires_at)
            .await?;
        Ok(SessionTokens {
            access_token,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        })
    }
}

fn invalid_material(error: MaterialError) -> AuthError {
    AuthError::InvalidRequest(error.to_string())
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    if username.len() < 3 || username.len() > 80 {
        return Err(AuthError::InvalidRequest(
            "Username must be between 3 and 80 characters".to_owned(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(AuthError::InvalidRequest(
            "Username can only contain letters, numbers, _ and -".to_owned(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str, strength: bool) -> Result<(), AuthError> {
    if password.len() < 8 {
        return Err(AuthError::InvalidRequest(
            "Password must be at least 8 characters long".to_owned(),
        ));
    }
    if strength {
        if !password.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(AuthError::InvalidRequest(
                "Password must contain at least one uppercase letter".to_owned(),
            ));
        }
        if !password.chars().any(|c| c.is_ascii_lowercase()) {
            return Err(AuthError::InvalidRequest(
                "Password must contain at least one lowercase letter".to_owned(),
            ));
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            return Err(AuthError::InvalidRequest(
                "Password must contain at least one digit".to_owned(),
            ));
        }
    }
    Ok(())
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt: [u8; 16] = rand::random();
    let config = argon2::Config {
        variant: argon2::Variant::Argon2id,
        ..argon2::Config::default()
    };
    argon2::hash_encoded(password.as_bytes(), &salt, &config).map_err(|error| {
        tracing::error!(%error, "password hashing failed");
        AuthError::InvalidRequest("Failed to process password".to_owned())
    })
}

fn verify_password(password_hash: &str, password: &str) -> bool {
    argon2::verify_encoded(password_hash, password.as_bytes()).unwrap_or(false)
}
