//! Application-level configuration loading: deployment secrets and tunable settings.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the secrets file.
const DEFAULT_SECRETS_PATH: &str = "config/secrets.toml";
/// Environment variable that overrides [`DEFAULT_SECRETS_PATH`].
const SECRETS_PATH_ENV: &str = "MISSION_CHAT_SECRETS_PATH";
/// Default location on disk where the server looks for the settings file.
const DEFAULT_SETTINGS_PATH: &str = "config/app.toml";
/// Environment variable that overrides [`DEFAULT_SETTINGS_PATH`].
const SETTINGS_PATH_ENV: &str = "MISSION_CHAT_CONFIG_PATH";
/// Database used when no `DATABASE_URL` is configured: a local SQLite file.
const DEFAULT_DATABASE_URL: &str = "sqlite://space_mission_chat.db";

/// Every secret key the deployment platform is expected to provide.
pub const SECRET_KEYS: [&str; 6] = [
    "OPENAI_API_KEY",
    "CHROMADB_API_KEY",
    "CHROMADB_TENANT",
    "CHROMADB_DATABASE",
    "AUTH_SECRET_KEY",
    "DATABASE_URL",
];

/// Deployment secrets injected by the hosting platform.
///
/// Each key is read from the secrets TOML file first and falls back to the
/// process environment, so both file-based and env-based platforms work.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    /// API key used for embeddings and chat completions.
    #[serde(rename = "OPENAI_API_KEY")]
    pub openai_api_key: Option<String>,
    /// ChromaDB Cloud API token.
    #[serde(rename = "CHROMADB_API_KEY")]
    pub chromadb_api_key: Option<String>,
    /// ChromaDB Cloud tenant identifier.
    #[serde(rename = "CHROMADB_TENANT")]
    pub chromadb_tenant: Option<String>,
    /// ChromaDB Cloud database name.
    #[serde(rename = "CHROMADB_DATABASE")]
    pub chromadb_database: Option<String>,
    /// Key used to sign session tokens.
    #[serde(rename = "AUTH_SECRET_KEY")]
    pub auth_secret_key: Option<String>,
    /// SQL connection string; SQLite by default, Postgres in production.
    #[serde(rename = "DATABASE_URL")]
    pub database_url: Option<String>,
}

impl Secrets {
    /// Load secrets from disk, then fill any missing key from the environment.
    pub fn load() -> Self {
        let path = resolve_path(SECRETS_PATH_ENV, DEFAULT_SECRETS_PATH);
        let from_file = match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Self>(&contents) {
                Ok(secrets) => {
                    info!(path = %path.display(), "loaded secrets file");
                    secrets
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse secrets file; relying on environment variables"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "secrets file not found; relying on environment variables"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read secrets file; relying on environment variables"
                );
                Self::default()
            }
        };

        from_file.merge_env()
    }

    /// The connection string to use, falling back to the local SQLite default.
    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string())
    }

    /// Names of the retrieval secrets that are still unset.
    ///
    /// The query engine needs all four; the rest of the service runs fine
    /// without them, so callers report the gap instead of failing startup.
    pub fn missing_retrieval_keys(&self) -> Vec<&'static str> {
        let pairs = [
            ("OPENAI_API_KEY", &self.openai_api_key),
            ("CHROMADB_API_KEY", &self.chromadb_api_key),
            ("CHROMADB_TENANT", &self.chromadb_tenant),
            ("CHROMADB_DATABASE", &self.chromadb_database),
        ];
        pairs
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect()
    }

    fn merge_env(mut self) -> Self {
        fn fill(slot: &mut Option<String>, var: &str) {
            if slot.is_none()
                && let Ok(value) = env::var(var)
                && !value.is_empty()
            {
                *slot = Some(value);
            }
        }

        fill(&mut self.openai_api_key, "OPENAI_API_KEY");
        fill(&mut self.chromadb_api_key, "CHROMADB_API_KEY");
        fill(&mut self.chromadb_tenant, "CHROMADB_TENANT");
        fill(&mut self.chromadb_database, "CHROMADB_DATABASE");
        fill(&mut self.auth_secret_key, "AUTH_SECRET_KEY");
        fill(&mut self.database_url, "DATABASE_URL");
        self
    }
}

/// Immutable runtime settings shared across the application.
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Log filter configuration.
    pub logger: LoggerSettings,
    /// Chat limits.
    pub chat: ChatSettings,
    /// Session token lifetime.
    pub auth: AuthSettings,
    /// Retrieval pipeline tuning.
    pub retrieval: RetrievalSettings,
    /// Connection pool tuning.
    pub database: DatabaseSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
}

/// `[logger]` section.
#[derive(Debug, Clone)]
pub struct LoggerSettings {
    /// Default tracing directive applied when `RUST_LOG` is unset.
    pub level: String,
}

/// `[chat]` section.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Questions-per-window allowance for guest sessions.
    pub guest_rate_limit: u32,
    /// Questions-per-window allowance for registered users.
    pub user_rate_limit: u32,
    /// Length of the fixed rate window, in seconds.
    pub rate_window_secs: u64,
    /// Default number of stored messages returned by the history listing.
    pub history_limit: u32,
}

/// `[auth]` section.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Session token lifetime in hours.
    pub session_ttl_hours: u64,
}

/// `[retrieval]` section: knobs of the answer pipeline.
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// Chat completion model asked to synthesize answers.
    pub llm_model: String,
    /// Embedding model; must match the model that indexed the collection.
    pub embedding_model: String,
    /// Sampling temperature passed to the completion request.
    pub temperature: f32,
    /// Number of chunks requested from the vector store.
    pub top_k: u32,
    /// Minimum relevance score a chunk must reach to be used.
    pub similarity_threshold: f32,
    /// Name of the ChromaDB collection holding the mission corpus.
    pub collection: String,
    /// OpenAI-compatible API base URL.
    pub openai_base_url: String,
    /// ChromaDB Cloud base URL.
    pub chroma_base_url: String,
}

/// `[database]` section.
#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Maximum number of pooled SQL connections.
    pub max_connections: u32,
}

/// `[server]` section.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// TCP port to bind when neither `PORT` nor `SERVER_PORT` is set.
    pub port: u16,
}

impl AppSettings {
    /// Load the settings file from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_path(SETTINGS_PATH_ENV, DEFAULT_SETTINGS_PATH);
        match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<RawSettings>(&contents) {
                Ok(raw) => {
                    let settings: Self = raw.into();
                    info!(path = %path.display(), "loaded settings file");
                    settings
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse settings file; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "settings file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read settings file; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Default tracing filter derived from the `[logger]` level.
    pub fn default_log_filter(&self) -> String {
        format!("{},tower_http=debug", self.logger.level)
    }
}

impl Default for AppSettings {
    fn default() -> Self {
        RawSettings::default().into()
    }
}

/// TOML representation of the settings file; every section is optional.
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    logger: Option<RawLogger>,
    chat: Option<RawChat>,
    auth: Option<RawAuth>,
    retrieval: Option<RawRetrieval>,
    database: Option<RawDatabase>,
    server: Option<RawServer>,
}

#[derive(Debug, Default, Deserialize)]
struct RawLogger {
    level: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawChat {
    guest_rate_limit: Option<u32>,
    user_rate_limit: Option<u32>,
    rate_window_secs: Option<u64>,
    history_limit: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuth {
    session_ttl_hours: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRetrieval {
    llm_model: Option<String>,
    embedding_model: Option<String>,
    temperature: Option<f32>,
    top_k: Option<u32>,
    similarity_threshold: Option<f32>,
    collection: Option<String>,
    openai_base_url: Option<String>,
    chroma_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawDatabase {
    max_connections: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RawServer {
    port: Option<u16>,
}

impl From<RawSettings> for AppSettings {
    fn from(raw: RawSettings) -> Self {
        let logger = raw.logger.unwrap_or_default();
        let chat = raw.chat.unwrap_or_default();
        let auth = raw.auth.unwrap_or_default();
        let retrieval = raw.retrieval.unwrap_or_default();
        let database = raw.database.unwrap_or_default();
        let server = raw.server.unwrap_or_default();

        Self {
            logger: LoggerSettings {
                level: logger.level.unwrap_or_else(|| "info".into()),
            },
            chat: ChatSettings {
                guest_rate_limit: chat.guest_rate_limit.unwrap_or(10),
                user_rate_limit: chat.user_rate_limit.unwrap_or(30),
                rate_window_secs: chat.rate_window_secs.unwrap_or(60),
                history_limit: chat.history_limit.unwrap_or(50),
            },
            auth: AuthSettings {
                session_ttl_hours: auth.session_ttl_hours.unwrap_or(24),
            },
            retrieval: RetrievalSettings {
                llm_model: retrieval.llm_model.unwrap_or_else(|| "o3".into()),
                embedding_model: retrieval
                    .embedding_model
                    .unwrap_or_else(|| "text-embedding-3-small".into()),
                temperature: retrieval.temperature.unwrap_or(0.1),
                top_k: retrieval.top_k.unwrap_or(5),
                similarity_threshold: retrieval.similarity_threshold.unwrap_or(0.35),
                collection: retrieval
                    .collection
                    .unwrap_or_else(|| "space_missions".into()),
                openai_base_url: retrieval
                    .openai_base_url
                    .unwrap_or_else(|| "https://api.openai.com".into()),
                chroma_base_url: retrieval
                    .chroma_base_url
                    .unwrap_or_else(|| "https://api.trychroma.com:8000".into()),
            },
            database: DatabaseSettings {
                max_connections: database.max_connections.unwrap_or(5),
            },
            server: ServerSettings {
                port: server.port.unwrap_or(8080),
            },
        }
    }
}

/// Resolve a configuration path taking the environment override into account.
fn resolve_path(env_var: &str, default: &str) -> PathBuf {
    env::var_os(env_var)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_match_documented_limits() {
        let settings = AppSettings::default();
        assert_eq!(settings.chat.guest_rate_limit, 10);
        assert_eq!(settings.chat.user_rate_limit, 30);
        assert_eq!(settings.chat.rate_window_secs, 60);
        assert_eq!(settings.retrieval.top_k, 5);
        assert!((settings.retrieval.similarity_threshold - 0.35).abs() < f32::EPSILON);
        assert!((settings.retrieval.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(settings.retrieval.llm_model, "o3");
    }

    #[test]
    fn partial_settings_file_keeps_defaults_for_missing_sections() {
        let raw: RawSettings = toml::from_str(
            r#"
            [logger]
            level = "debug"

            [chat]
            guest_rate_limit = 3
            "#,
        )
        .expect("valid settings TOML");
        let settings: AppSettings = raw.into();

        assert_eq!(settings.logger.level, "debug");
        assert_eq!(settings.default_log_filter(), "debug,tower_http=debug");
        assert_eq!(settings.chat.guest_rate_limit, 3);
        assert_eq!(settings.chat.user_rate_limit, 30);
        assert_eq!(settings.retrieval.collection, "space_missions");
    }

    #[test]
    fn missing_retrieval_keys_names_only_unset_secrets() {
        let mut secrets = Secrets::default();
        assert_eq!(
            secrets.missing_retrieval_keys(),
            vec![
                "OPENAI_API_KEY",
                "CHROMADB_API_KEY",
                "CHROMADB_TENANT",
                "CHROMADB_DATABASE",
            ],
        );

        secrets.openai_api_key = Some("sk-test".into());
        secrets.chromadb_tenant = Some("tenant".into());
        assert_eq!(
            secrets.missing_retrieval_keys(),
            vec!["CHROMADB_API_KEY", "CHROMADB_DATABASE"],
        );

        secrets.chromadb_api_key = Some("ck-test".into());
        secrets.chromadb_database = Some("missions".into());
        assert!(secrets.missing_retrieval_keys().is_empty());
    }

    #[test]
    fn secrets_template_lists_every_required_key() {
        let template = include_str!("../config/secrets.example.toml");
        let table: toml::Table = toml::from_str(template).expect("template must parse");
        for key in SECRET_KEYS {
            assert!(table.contains_key(key), "template is missing `{key}`");
        }
    }

    #[test]
    fn secrets_template_database_url_is_usable() {
        let template = include_str!("../config/secrets.example.toml");
        let secrets: Secrets = toml::from_str(template).expect("template must parse");
        let url = secrets.database_url();
        assert!(
            url.starts_with("sqlite:")
                || url.starts_with("postgres://")
                || url.starts_with("postgresql://"),
            "unsupported example DATABASE_URL `{url}`"
        );
    }
}
