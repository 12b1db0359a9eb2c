//! Server configuration from environment variables

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on (PORT, default 8000)
    pub port: u16,
    /// Password required to create a session (ADMIN_PASSWORD)
    pub admin_password: String,
}

const DEFAULT_ADMIN_PASSWORD: &str = "change-me";

impl ServerConfig {
    /// Load server config from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8000);

        let admin_password = std::env::var("ADMIN_PASSWORD")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| {
                tracing::warn!(
                    "ADMIN_PASSWORD not set - using the default session-creation password!"
                );
                DEFAULT_ADMIN_PASSWORD.to_string()
            });

        Self {
            port,
            admin_password,
        }
    }

    /// Validate the session-creation password
    pub fn validate_admin(&self, password: &str) -> bool {
        password == self.admin_password
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}
