/// Server configuration loaded from environment variables.
///
/// All fields except the admin token have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long background jobs get to stop after shutdown (default: `5`).
    pub shutdown_timeout_secs: u64,
    /// Bearer token required on every `/api/v1` route.
    pub admin_api_token: String,
    /// Postgres connection string. Without it all state is kept in memory.
    pub database_url: Option<String>,
    /// Key for CSRF token signatures (default: the audit HMAC secret).
    pub csrf_secret: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                 | Default                    |
    /// |-------------------------|----------------------------|
    /// | `HOST`                  | `0.0.0.0`                  |
    /// | `PORT`                  | `3000`                     |
    /// | `CORS_ORIGINS`          | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `5`                        |
    /// | `ADMIN_API_TOKEN`       | required                   |
    /// | `DATABASE_URL`          | unset (in-memory stores)   |
    /// | `CSRF_SECRET`           | unset                      |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let shutdown_timeout_secs: u64 = std::env::var("SHUTDOWN_TIMEOUT_SECS")
            .unwrap_or_else(|_| "5".into())
            .parse()
            .expect("SHUTDOWN_TIMEOUT_SECS must be a valid u64");

        let admin_api_token = std::env::var("ADMIN_API_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .expect("ADMIN_API_TOKEN must be set");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs,
            admin_api_token,
            database_url: std::env::var("DATABASE_URL").ok(),
            csrf_secret: std::env::var("CSRF_SECRET").ok(),
        }
    }
}
