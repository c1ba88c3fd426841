// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::net::TcpListener;

use cachet_backend::{auth_service::AuthService, rooms::RoomService, service::BackendService};
use cachet_server::{
    configurations::get_configuration,
    run,
    telemetry::{get_subscriber, init_subscriber},
};
use tracing::info;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load configuration
    let configuration = get_configuration("server/").expect("Could not load configuration.");

    // Configure logging/trace subscription
    let default_filter = if configuration.application.debug {
        "debug"
    } else {
        "info"
    };
    let subscriber = get_subscriber(
        "cachet-server".into(),
        default_filter.into(),
        std::io::stdout,
    );
    init_subscriber(subscriber);

    // Port binding
    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(address)?;

    info!(
        host = %configuration.database.host,
        "Connecting to postgres server",
    );

    // Try again for 10 times each second in case the postgres server is
    // coming up.
    let mut counter = 0;
    let mut auth_result = AuthService::new(&configuration).await;
    while let Err(e) = auth_result {
        info!("Failed to connect to postgres server: {}", e);
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        counter += 1;
        if counter > 10 {
            panic!("Database not ready after 10 seconds.");
        }
        auth_result = AuthService::new(&configuration).await;
    }
    let auth_service = auth_result.unwrap();

    let room_service = RoomService::new(&configuration)
        .await
        .expect("Failed to connect to database.");

    // Start the server
    run(listener, auth_service, room_service, configuration)?.await
}
