//! Connection configuration.

use std::time::Duration;

use crate::error::ConnectError;

/// Configuration handed to a [`Driver`](crate::Driver) when establishing a
/// physical connection.
///
/// Pool-level settings (pool size, checkout timeout, statement limit) live in
/// the pool's own configuration; this type only describes how to reach the
/// database.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Server hostname or IP address.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// Database name.
    pub database: Option<String>,

    /// Username for authentication.
    pub username: String,

    /// Password for authentication.
    pub password: String,

    /// Application name (shown in server-side session views).
    pub application_name: String,

    /// Connection establishment timeout.
    pub connect_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: None,
            username: String::new(),
            password: String::new(),
            application_name: "dbpool".to_string(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl ConnectConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a connection string into configuration.
    ///
    /// Supports `key=value;` style connection strings:
    /// ```text
    /// host=db.internal;port=5432;database=app;user=svc;password=secret;
    /// ```
    ///
    /// Unknown keys are ignored for forward compatibility.
    pub fn from_connection_string(conn_str: &str) -> Result<Self, ConnectError> {
        let mut config = Self::default();

        for part in conn_str.split(';') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| ConnectError::Config(format!("invalid key-value: {part}")))?;

            let key = key.trim().to_lowercase();
            let value = value.trim();

            match key.as_str() {
                "host" | "server" => {
                    // Handle host:port form
                    if let Some((host, port)) = value.split_once(':') {
                        config.host = host.to_string();
                        config.port = port
                            .parse()
                            .map_err(|_| ConnectError::Config(format!("invalid port: {port}")))?;
                    } else {
                        config.host = value.to_string();
                    }
                }
                "port" => {
                    config.port = value
                        .parse()
                        .map_err(|_| ConnectError::Config(format!("invalid port: {value}")))?;
                }
                "database" | "dbname" => {
                    config.database = Some(value.to_string());
                }
                "user" | "username" => {
                    config.username = value.to_string();
                }
                "password" => {
                    config.password = value.to_string();
                }
                "application_name" | "app" => {
                    config.application_name = value.to_string();
                }
                "connect_timeout" => {
                    let secs: u64 = value
                        .parse()
                        .map_err(|_| ConnectError::Config(format!("invalid timeout: {value}")))?;
                    config.connect_timeout = Duration::from_secs(secs);
                }
                _ => {
                    tracing::debug!(
                        key = key,
                        value = value,
                        "ignoring unknown connection string option"
                    );
                }
            }
        }

        Ok(config)
    }

    /// Set the server host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the server port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the database name.
    #[must_use]
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    /// Set the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set the application name.
    #[must_use]
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = name.into();
        self
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
