// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The realtime session gateway.
//!
//! A client opens a websocket with an access token in the handshake; the
//! upgrade is refused outright when the token does not resolve to an active
//! user. Afterwards every inbound frame is a JSON `{event, data}` envelope,
//! handled to completion in order, and every outbound event is pushed
//! through the dispatcher.

mod handlers;
mod session;

use actix_web::{
    web::{Data, Payload, Query},
    HttpRequest, HttpResponse,
};
use actix_web_actors::ws;
use serde::Deserialize;

use cachet_backend::{auth_service::AuthService, rooms::RoomService};

use crate::{dispatch::EventDispatcher, endpoints::bearer_token, registry::SessionRegistry};

use session::ClientSession;

#[derive(Debug, Deserialize)]
pub(crate) struct ConnectQuery {
    token: Option<String>,
}

/// Upgrade a HTTP connection to a websocket connection. The token comes
/// either from the `Authorization` header or from a `token` query
/// parameter; token-validation failures disconnect without an explanatory
/// event.
#[tracing::instrument(name = "Upgrade connection to web socket", skip_all)]
pub(crate) async fn upgrade_connection(
    req: HttpRequest,
    stream: Payload,
    query: Query<ConnectQuery>,
    auth_service: Data<AuthService>,
    room_service: Data<RoomService>,
    registry: Data<SessionRegistry>,
    dispatch: Data<EventDispatcher>,
) -> actix_web::Result<HttpResponse> {
    let header_token = bearer_token(&req).map(str::to_owned);
    let query_token = query
        .into_inner()
        .token
        .map(|token| token.strip_prefix("Bearer ").unwrap_or(&token).to_owned());
    let Some(token) = header_token.or(query_token) else {
        tracing::warn!("websocket handshake without token");
        return Ok(HttpResponse::Unauthorized().finish());
    };

    let user = match auth_service.verify_access_token(&token).await {
        Ok(user) => user,
        Err(error) => {
            tracing::warn!(%error, "websocket handshake rejected");
            return Ok(HttpResponse::Unauthorized().finish());
        }
    };

    let session = ClientSession::new(
        user,
        room_service.get_ref().clone(),
        registry.get_ref().clone(),
        dispatch.get_ref().clone(),
    );
    ws::start(session, &req, stream)
}
