use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the strategy server; command and login paths are joined onto it.
    pub base_url: String,
    pub strategy_kind: String,
    pub http_timeout_ms: u64,
    /// 0 disables the dispatcher-level timeout.
    pub command_timeout_ms: u64,
    pub journal_path: Option<String>,
    pub fetch_login: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("DASHBOARD_BASE").unwrap_or_else(|_| "http://localhost:5000/".to_string()),
            strategy_kind: std::env::var("STRATEGY_KIND").unwrap_or_else(|_| "sample".to_string()),
            http_timeout_ms: std::env::var("HTTP_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(10_000),
            command_timeout_ms: std::env::var("COMMAND_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()).unwrap_or(15_000),
            journal_path: std::env::var("JOURNAL_PATH").ok().filter(|p| !p.is_empty()),
            fetch_login: std::env::var("FETCH_LOGIN").map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes")).unwrap_or(false),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        if self.command_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.command_timeout_ms))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/".to_string(),
            strategy_kind: "sample".to_string(),
            http_timeout_ms: 10_000,
            command_timeout_ms: 15_000,
            journal_path: None,
            fetch_login: false,
        }
    }
}

pub fn now_ts() -> u64 {
    chrono::Utc::now().timestamp() as u64
}
