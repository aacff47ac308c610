use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Timeouts applied to every source-database session.
#[derive(Debug, Clone)]
pub struct InspectorSettings {
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
}

impl Default for InspectorSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            statement_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    /// Where the catalog itself is stored (SQLite or PostgreSQL URL).
    pub database_url: String,
    pub inspector: InspectorSettings,
}

impl Settings {
    /// Read `CATALOG_*` variables from the environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = InspectorSettings::default();
        let secs = |key: &str, default: Duration| {
            get(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|v| *v > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            database_url: get("CATALOG_DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "sqlite://catalog.db?mode=rwc".to_string()),
            inspector: InspectorSettings {
                connect_timeout: secs("CATALOG_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
                statement_timeout: secs(
                    "CATALOG_STATEMENT_TIMEOUT_SECS",
                    defaults.statement_timeout,
                ),
            },
        }
    }
}

static URL_PASSWORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<head>[A-Za-z][A-Za-z0-9+.-]*://[^:@/]*):[^@/]*@").unwrap());

/// Admin database URL fit for a log line: query string dropped, inline
/// password masked.
pub fn redact_db_url(url: &str) -> String {
    let without_query = url.split_once('?').map_or(url, |(base, _)| base);
    URL_PASSWORD
        .replace(without_query, "${head}:****@")
        .into_owned()
}
