// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Registration, login and refresh-token handling.
//!
//! Access tokens travel in the JSON response; refresh tokens only ever live
//! in an HTTP-only cookie.

use actix_web::{
    cookie::{time::Duration as CookieDuration, Cookie, SameSite},
    web::{Data, Json},
    HttpRequest, HttpResponse,
};
use serde::Deserialize;
use serde_json::json;

use cachet_backend::{
    auth_service::{AuthError, AuthService, RegistrationRequest, SessionTokens, UserRecord},
    errors::ErrorKind,
    settings::Settings,
};

const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Deserialize)]
pub(crate) struct RegisterPayload {
    username: String,
    password: String,
    public_key: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginPayload {
    username: String,
    password: String,
}

#[tracing::instrument(name = "Register user", skip_all)]
pub(crate) async fn register(
    payload: Json<RegisterPayload>,
    auth_service: Data<AuthService>,
    settings: Data<Settings>,
) -> HttpResponse {
    let payload = payload.into_inner();
    let request = RegistrationRequest {
        username: payload.username,
        password: payload.password,
        public_key: payload.public_key,
    };
    match auth_service.register(request).await {
        Ok((user, tokens)) => {
            session_response(201, "User registered successfully", &user, &tokens, &settings)
        }
        Err(error) => auth_error_response(error),
    }
}

#[tracing::instrument(name = "Login user", skip_all)]
pub(crate) async fn login(
    payload: Json<LoginPayload>,
    auth_service: Data<AuthService>,
    settings: Data<Settings>,
) -> HttpResponse {
    match auth_service
        .login(&payload.username, &payload.password)
        .await
    {
        Ok((user, tokens)) => session_response(200, "Login successful", &user, &tokens, &settings),
        Err(error) => auth_error_response(error),
    }
}

#[tracing::instrument(name = "Refresh access token", skip_all)]
pub(crate) async fn refresh(req: HttpRequest, auth_service: Data<AuthService>) -> HttpResponse {
    let Some(cookie) = req.cookie(REFRESH_COOKIE) else {
        return auth_error_response(AuthError::MissingRefreshToken);
    };
    match auth_service.refresh(cookie.value()).await {
        Ok(access_token) => HttpResponse::Ok().json(json!({ "access_token": access_token })),
        Err(error) => auth_error_response(error),
    }
}

#[tracing::instrument(name = "Logout user", skip_all)]
pub(crate) async fn logout(
    req: HttpRequest,
    auth_service: Data<AuthService>,
    settings: Data<Settings>,
) -> HttpResponse {
    if let Some(cookie) = req.cookie(REFRESH_COOKIE) {
        // The token may be invalid or already revoked; the cookie is cleared
        // either way.
        if let Err(error) = auth_service.logout(cookie.value()).await {
            tracing::warn!(%error, "failed to revoke refresh token");
        }
    }
    HttpResponse::Ok()
        .cookie(clear_refresh_cookie(&settings))
        .json(json!({ "message": "Logout successful" }))
}

fn session_response(
    status: u16,
    message: &str,
    user: &UserRecord,
    tokens: &SessionTokens,
    settings: &Settings,
) -> HttpResponse {
    let body = json!({
        "message": message,
        "user": user.payload(),
        "access_token": tokens.access_token,
    });
    let mut response = match status {
        201 => HttpResponse::Created(),
        _ => HttpResponse::Ok(),
    };
    response
        .cookie(refresh_cookie(&tokens.refresh_token, settings))
        .json(body)
}

fn refresh_cookie(token: &str, settings: &Settings) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, token.to_owned())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.auth.secure_cookies)
        .max_age(CookieDuration::seconds(
            settings.auth.refresh_token_ttl_seconds,
        ))
        .finish()
}

fn clear_refresh_cookie(settings: &Settings) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(settings.auth.secure_cookies)
        .max_age(CookieDuration::ZERO)
        .finish()
}

fn auth_error_response(error: AuthError) -> HttpResponse {
    let kind = error.kind();
    match kind {
        ErrorKind::Validation | ErrorKind::Conflict => {
            HttpResponse::BadRequest().json(json!({ "error": error.to_string() }))
        }
        ErrorKind::Unauthenticated => {
            HttpResponse::Unauthorized().json(json!({ "error": error.to_string() }))
        }
        _ => {
            tracing::error!(%error, "auth endpoint failed");
            HttpResponse::InternalServerError().json(json!({ "error": "Internal server error" }))
        }
    }
}
