// SPDX-FileCopyrightText: 2024 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use serde::Deserialize;

use cachet_common::DEFAULT_PORT_HTTP;

/// Configuration for the server.
#[derive(Deserialize, Clone, Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub auth: AuthSettings,
}

/// Configuration for the application.
#[derive(Deserialize, Clone, Debug)]
pub struct ApplicationSettings {
    #[serde(default = "default_port")]
    pub port: u16,
    pub host: String,
    #[serde(default)]
    pub debug: bool,
    /// Origins allowed to talk to the HTTP API. Empty or `["*"]` means any.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_port() -> u16 {
    DEFAULT_PORT_HTTP
}

/// Configuration for the database.
#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseSettings {
    pub username: String,
    pub password: String,
    pub port: u16,
    pub host: String,
    pub name: String,
    pub cacertpath: Option<String>,
}

/// Configuration for credential issuance.
#[derive(Deserialize, Clone, Debug)]
pub struct AuthSettings {
    /// HMAC secret for access and refresh tokens.
    pub jwt_secret: String,
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_seconds: i64,
    #[serde(default = "default_refresh_token_ttl")]
    pub refresh_token_ttl_seconds: i64,
    /// Set the `Secure` attribute on the refresh-token cookie.
    #[serde(default)]
    pub secure_cookies: bool,
    /// Require upper/lower/digit in passwords on top of the length minimum.
    #[serde(default)]
    pub validate_password_strength: bool,
}

fn default_access_token_ttl() -> i64 {
    15 * 60
}

fn default_refresh_token_ttl() -> i64 {
    30 * 24 * 60 * 60
}

impl DatabaseSettings {
    /// Add the TLS mode to the connection string if the CA certificate path
    /// is set.
    fn add_tls_mode(&self, mut connection_string: String) -> String {
        if let Some(ref ca_cert_path) = self.cacertpath {
            connection_string.push_str(&format!("?sslmode=verify-ca&sslrootcert={ca_cert_path}"));
        } else {
            tracing::warn!(
                "No CA certificate path set for database connection. TLS will not be enabled."
            );
        }
        connection_string
    }

    /// Compose the base connection string without the database name.
    fn base_connection_string(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}",
            self.username, self.password, self.host, self.port
        )
    }

    /// Get the connection string for the database.
    pub fn connection_string(&self) -> String {
        let mut connection_string = self.base_connection_string();
        connection_string.push('/');
        connection_string.push_str(&self.name);
        self.add_tls_mode(connection_string)
    }

    /// Get the connection string for the database without the database name.
    pub fn connection_string_without_database(&self) -> String {
        let connection_string = self.base_connection_string();
        self.add_tls_mode(connection_string)
    }
}
