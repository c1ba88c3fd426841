// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Username search and public-key lookup, both access-token protected.

use actix_web::{
    web::{Data, Path, Query},
    HttpRequest, HttpResponse,
};
use serde::Deserialize;
use serde_json::json;

use cachet_backend::auth_service::{AuthService, UserRecord};
use cachet_common::{identifiers::UserId, SEARCH_PAGE_LIMIT, SEARCH_QUERY_MIN_LEN};

use super::bearer_token;

#[derive(Debug, Deserialize)]
pub(crate) struct SearchQuery {
    query: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[tracing::instrument(name = "Search users", skip_all)]
pub(crate) async fn search_users(
    req: HttpRequest,
    query: Query<SearchQuery>,
    auth_service: Data<AuthService>,
) -> HttpResponse {
    if let Some(response) = require_access_token(&req, &auth_service).await {
        return response;
    }

    let needle = query.query.as_deref().unwrap_or("").trim().to_owned();
    if needle.is_empty() {
        return HttpResponse::BadRequest().json(json!({ "error": "Query parameter is required" }));
    }
    if needle.chars().count() < SEARCH_QUERY_MIN_LEN {
        return HttpResponse::BadRequest()
            .json(json!({ "error": "Query must be at least 2 characters long" }));
    }

    let page = query.page.unwrap_or(1).max(1);
    let per_page = match query.per_page.unwrap_or(10) {
        limit if (1..=SEARCH_PAGE_LIMIT).contains(&limit) => limit,
        _ => 10,
    };

    match auth_service
        .search_users(&needle, (page - 1) * per_page, per_page)
        .await
    {
        Ok((users, total_count)) => {
            let total_pages = (total_count + per_page - 1) / per_page;
            HttpResponse::Ok().json(json!({
                "users": users.iter().map(user_summary).collect::<Vec<_>>(),
                "pagination": {
                    "page": page,
                    "per_page": per_page,
                    "total_count": total_count,
                    "total_pages": total_pages,
                    "has_next": page < total_pages,
                    "has_prev": page > 1,
                },
            }))
        }
        Err(error) => {
            tracing::error!(%error, "user search failed");
            HttpResponse::InternalServerError().json(json!({ "error": "Internal server error" }))
        }
    }
}

/// Public-key lookup by user id or, failing an integer parse, by username.
#[tracing::instrument(name = "Get public key", skip_all)]
pub(crate) async fn public_key(
    req: HttpRequest,
    path: Path<String>,
    auth_service: Data<AuthService>,
) -> HttpResponse {
    if let Some(response) = require_access_token(&req, &auth_service).await {
        return response;
    }

    let selector = path.into_inner();
    let user = match selector.parse::<i64>() {
        Ok(id) => auth_service.user(UserId::new(id)).await,
        Err(_) => auth_service.user_by_username(&selector).await,
    };
    match user {
        Ok(Some(user)) => HttpResponse::Ok().json(user_summary(&user)),
        Ok(None) => HttpResponse::NotFound().json(json!({ "error": "User not found" })),
        Err(error) => {
            tracing::error!(%error, "public key lookup failed");
            HttpResponse::InternalServerError().json(json!({ "error": "Internal server error" }))
        }
    }
}

fn user_summary(user: &UserRecord) -> serde_json::Value {
    json!({
        "user_id": user.id,
        "username": user.username,
        "public_key": user.public_key,
    })
}

/// Returns the rejection response when the request carries no valid access
/// token.
async fn require_access_token(
    req: &HttpRequest,
    auth_service: &AuthService,
) -> Option<HttpResponse> {
    let Some(token) = bearer_token(req) else {
        return Some(
            HttpResponse::Unauthorized().json(json!({ "error": "Missing access token" })),
        );
    };
    match auth_service.verify_access_token(token).await {
        Ok(_) => None,
        Err(error) => {
            tracing::warn!(%error, "rejected access token");
            Some(HttpResponse::Unauthorized().json(json!({ "error": "Invalid access token" })))
        }
    }
}
