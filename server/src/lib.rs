// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Cachet server.
//!
//! actix-web application in front of the backend services: HTTP endpoints
//! for auth and user lookup, and the websocket gateway that carries the
//! realtime protocol.

pub mod configurations;
pub mod dispatch;
pub mod endpoints;
pub mod gateway;
pub mod registry;
pub mod telemetry;

use std::net::TcpListener;

use actix_cors::Cors;
use actix_web::{
    dev::Server,
    web::{self, Data},
    App, HttpServer,
};
use cachet_backend::{auth_service::AuthService, rooms::RoomService, settings::Settings};
use tracing_actix_web::TracingLogger;

use crate::{
    dispatch::EventDispatcher,
    endpoints::{health_check, ENDPOINT_HEALTH_CHECK, ENDPOINT_WS},
    registry::SessionRegistry,
};

/// Configure and run the server application.
pub fn run(
    listener: TcpListener,
    auth_service: AuthService,
    room_service: RoomService,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    // The registry and dispatcher live for the whole process; every worker
    // shares the same maps.
    let registry = SessionRegistry::default();
    let dispatch = EventDispatcher::default();

    let auth_service_data = Data::new(auth_service);
    let room_service_data = Data::new(room_service);
    let registry_data = Data::new(registry);
    let dispatch_data = Data::new(dispatch);
    let settings_data = Data::new(settings.clone());

    tracing::info!(
        "Starting server, listening on {}:{}",
        listener
            .local_addr()
            .expect("Could not get local address")
            .ip(),
        listener
            .local_addr()
            .expect("Could not get local address")
            .port()
    );

    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(build_cors(&settings.application.cors_origins))
            .app_data(auth_service_data.clone())
            .app_data(room_service_data.clone())
            .app_data(registry_data.clone())
            .app_data(dispatch_data.clone())
            .app_data(settings_data.clone())
            .route(ENDPOINT_HEALTH_CHECK, web::get().to(health_check))
            .service(
                web::scope("/api/auth")
                    .route("/register", web::post().to(endpoints::auth::register))
                    .route("/login", web::post().to(endpoints::auth::login))
                    .route("/refresh", web::post().to(endpoints::auth::refresh))
                    .route("/logout", web::post().to(endpoints::auth::logout)),
            )
            .service(
                web::scope("/api/users")
                    .route("/search", web::get().to(endpoints::users::search_users))
                    .route(
                        "/{user}/public-key",
                        web::get().to(endpoints::users::public_key),
                    ),
            )
            .route(ENDPOINT_WS, web::get().to(gateway::upgrade_connection))
    })
    .listen(listener)?
    .run();
    Ok(server)
}

fn build_cors(origins: &[String]) -> Cors {
    if origins.is_empty() || origins.iter().any(|origin| origin == "*") {
        return Cors::permissive();
    }
    let mut cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .supports_credentials();
    for origin in origins {
        cors = cors.allowed_origin(origin);
    }
    cors
}
