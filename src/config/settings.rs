//! Application settings loaded from the environment.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Set of Telegram user IDs allowed to talk to the bot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminIds(BTreeSet<i64>);

impl AdminIds {
    /// Parses a comma-separated list such as `906038550,123456789`.
    ///
    /// Empty segments are skipped, so an empty string yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns an error if any segment is not an integer.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut ids = BTreeSet::new();

        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let id = part
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidAdminId(part.to_owned()))?;
            ids.insert(id);
        }

        Ok(Self(ids))
    }

    /// Checks if the given user ID is in the list.
    #[must_use]
    pub fn contains(&self, user_id: i64) -> bool {
        self.0.contains(&user_id)
    }

    /// Number of distinct IDs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if nobody is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the IDs in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<i64> for AdminIds {
    fn from_iter<T: IntoIterator<Item = i64>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for AdminIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

/// Bot configuration.
#[derive(Clone)]
pub struct Settings {
    /// Telegram Bot API token.
    pub bot_token: String,

    /// Users allowed to interact with the bot.
    pub admin_ids: AdminIds,

    /// Google spreadsheet identifier (taken from its URL).
    pub spreadsheet_id: String,

    /// Path to the service-account key file.
    pub credentials_file: PathBuf,

    /// Path to the SQLite cache database.
    pub cache_db_path: PathBuf,

    /// Seconds between cache syncs.
    pub cache_sync_interval_secs: u64,
}

fn default_credentials_file() -> PathBuf {
    PathBuf::from("credentials.json")
}

fn default_cache_db_path() -> PathBuf {
    PathBuf::from("data/cache.db")
}

const fn default_cache_sync_interval() -> u64 {
    300 // 5 minutes
}

impl Settings {
    /// Creates settings from process environment variables.
    ///
    /// Call `dotenvy` first if a `.env` file should be honoured.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates settings using an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let bot_token = non_empty("BOT_TOKEN").ok_or(ConfigError::MissingEnvVar("BOT_TOKEN"))?;

        let spreadsheet_id =
            non_empty("SPREADSHEET_ID").ok_or(ConfigError::MissingEnvVar("SPREADSHEET_ID"))?;

        let admin_ids = match lookup("ADMIN_IDS") {
            Some(raw) => AdminIds::parse(&raw)?,
            None => AdminIds::default(),
        };

        let credentials_file =
            non_empty("CREDENTIALS_FILE").map_or_else(default_credentials_file, PathBuf::from);

        let cache_db_path =
            non_empty("CACHE_DB_PATH").map_or_else(default_cache_db_path, PathBuf::from);

        let cache_sync_interval_secs = match non_empty("CACHE_SYNC_INTERVAL") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => return Err(ConfigError::InvalidSyncInterval(raw)),
            },
            None => default_cache_sync_interval(),
        };

        Ok(Self {
            bot_token: bot_token.trim().to_owned(),
            admin_ids,
            spreadsheet_id: spreadsheet_id.trim().to_owned(),
            credentials_file,
            cache_db_path,
            cache_sync_interval_secs,
        })
    }

    /// Cache sync interval as a `Duration`.
    #[must_use]
    pub const fn cache_sync_interval(&self) -> Duration {
        Duration::from_secs(self.cache_sync_interval_secs)
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("bot_token", &"<redacted>")
            .field("admin_ids", &self.admin_ids)
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("credentials_file", &self.credentials_file)
            .field("cache_db_path", &self.cache_db_path)
            .field("cache_sync_interval_secs", &self.cache_sync_interval_secs)
            .finish()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid admin ID in ADMIN_IDS: '{0}' (expected comma-separated integers)")]
    InvalidAdminId(String),

    #[error("Invalid CACHE_SYNC_INTERVAL: '{0}' (must be a positive number of seconds)")]
    InvalidSyncInterval(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_admin_ids_three_entries() {
        let ids = AdminIds::parse("906038550,123456789,555555555").unwrap();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains(906_038_550));
        assert!(ids.contains(123_456_789));
        assert!(ids.contains(555_555_555));
    }

    #[test]
    fn test_parse_admin_ids_duplicates_collapse() {
        let ids = AdminIds::parse("1,1,2").unwrap();
        assert_eq!(ids.len(), 2);
    }

    #[test]
    fn test_parse_admin_ids_empty() {
        assert!(AdminIds::parse("").unwrap().is_empty());
        assert!(AdminIds::parse(",").unwrap().is_empty());
    }

    #[test]
    fn test_parse_admin_ids_invalid() {
        let err = AdminIds::parse("906038550,abc").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAdminId(ref s) if s == "abc"));
    }

    #[test]
    fn test_admin_ids_display() {
        let ids = AdminIds::parse("2,1").unwrap();
        assert_eq!(ids.to_string(), "1,2");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("BOT_TOKEN", "123:abc"),
            ("SPREADSHEET_ID", "sheet-id"),
            ("ADMIN_IDS", "906038550"),
        ]))
        .unwrap();

        assert_eq!(settings.credentials_file, PathBuf::from("credentials.json"));
        assert_eq!(settings.cache_db_path, PathBuf::from("data/cache.db"));
        assert_eq!(settings.cache_sync_interval_secs, 300);
        assert!(settings.admin_ids.contains(906_038_550));
    }

    #[test]
    fn test_settings_overrides() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("BOT_TOKEN", "123:abc"),
            ("SPREADSHEET_ID", "sheet-id"),
            ("CREDENTIALS_FILE", "keys/sa.json"),
            ("CACHE_DB_PATH", "/tmp/cache.db"),
            ("CACHE_SYNC_INTERVAL", "60"),
        ]))
        .unwrap();

        assert_eq!(settings.credentials_file, PathBuf::from("keys/sa.json"));
        assert_eq!(settings.cache_db_path, PathBuf::from("/tmp/cache.db"));
        assert_eq!(settings.cache_sync_interval(), Duration::from_secs(60));
        assert!(settings.admin_ids.is_empty());
    }

    #[test]
    fn test_settings_missing_token() {
        let err = Settings::from_lookup(lookup_from(&[("SPREADSHEET_ID", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("BOT_TOKEN")));
    }

    #[test]
    fn test_settings_missing_spreadsheet() {
        let err = Settings::from_lookup(lookup_from(&[("BOT_TOKEN", "x")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("SPREADSHEET_ID")));
    }

    #[test]
    fn test_settings_zero_interval_rejected() {
        let err = Settings::from_lookup(lookup_from(&[
            ("BOT_TOKEN", "x"),
            ("SPREADSHEET_ID", "y"),
            ("CACHE_SYNC_INTERVAL", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSyncInterval(_)));
    }

    #[test]
    fn test_debug_redacts_token() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("BOT_TOKEN", "secret-token"),
            ("SPREADSHEET_ID", "y"),
        ]))
        .unwrap();
        assert!(!format!("{settings:?}").contains("secret-token"));
    }
}
