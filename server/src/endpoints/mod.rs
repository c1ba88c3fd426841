// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

pub(crate) mod auth;
pub(crate) mod users;

use actix_web::{http::header, HttpRequest, HttpResponse};

/// Health check endpoint
pub const ENDPOINT_HEALTH_CHECK: &str = "/health_check";

/// Websocket endpoint
pub const ENDPOINT_WS: &str = "/ws";

pub(crate) async fn health_check() -> HttpResponse {
    HttpResponse::Ok().finish()
}

/// Pull the access token out of an `Authorization: Bearer <token>` header.
pub(crate) fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    Some(value.strip_prefix("Bearer ").unwrap_or(value))
}
