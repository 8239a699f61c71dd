use std::{collections::HashMap, fmt, net::SocketAddr, path::Path, str::FromStr};

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} not found in env file")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    Postgres {
        url: String,
        timeout: u64,
        max_connections: u32,
    },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub environment: Environment,
    pub storage: StorageConfig,
    pub addr: SocketAddr,
    /// Answer `GET /api/people/{id}` misses with 404 instead of `null`.
    pub strict_not_found: bool,
    /// `RUST_LOG`-style directives, from any configuration layer.
    pub log_filter: Option<String>,
}

/// Variables of a dotenv file. A missing or unreadable file is empty.
fn env_file(path: &Path) -> HashMap<String, String> {
    match dotenv::from_path_iter(path) {
        Ok(iter) => iter.filter_map(Result::ok).collect(),
        Err(_) => HashMap::new(),
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Reads the configuration from the process environment, falling back to
    /// `.env.{APP_ENV}` and then `.env` in the working directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Path::new("."), |key| std::env::var(key).ok())
    }

    /// Layers `process`, then `{dir}/.env.{APP_ENV}`, then `{dir}/.env`.
    /// `APP_ENV` itself may come from the process or from `.env`.
    pub fn load_from(
        dir: &Path,
        process: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let base = env_file(&dir.join(".env"));
        let base_lookup = |key: &str| process(key).or_else(|| base.get(key).cloned());
        let environment = parse_or(&base_lookup, "APP_ENV", Environment::Development)?;
        let specific = env_file(&dir.join(format!(".env.{}", environment)));
        Self::from_lookup(|key| {
            process(key)
                .or_else(|| specific.get(key).cloned())
                .or_else(|| base.get(key).cloned())
        })
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = parse_or(&lookup, "APP_ENV", Environment::Development)?;
        let storage = match lookup("PEOPLE_STORAGE").as_deref().map(str::trim) {
            None | Some("postgres") => StorageConfig::Postgres {
                url: lookup("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                timeout: parse_or(&lookup, "DATABASE_TIMEOUT", 100)?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10)?,
            },
            Some("memory") => StorageConfig::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "PEOPLE_STORAGE",
                    value: other.to_string(),
                })
            }
        };
        let host: std::net::IpAddr = parse_or(&lookup, "HOST", [0, 0, 0, 0].into())?;
        let port: u16 = parse_or(&lookup, "PORT", 3000)?;
        Ok(Self {
            environment,
            storage,
            addr: SocketAddr::new(host, port),
            strict_not_found: parse_or(&lookup, "STRICT_NOT_FOUND", false)?,
            log_filter: lookup("RUST_LOG"),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, fs};

    use super::{AppConfig, ConfigError, Environment, StorageConfig};

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_with_database_url() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/people")]).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(
            config.storage,
            StorageConfig::Postgres {
                url: "postgres://localhost/people".to_string(),
                timeout: 100,
                max_connections: 10,
            }
        );
        assert_eq!(config.addr.to_string(), "0.0.0.0:3000");
        assert!(!config.strict_not_found);
    }

    #[test]
    fn test_postgres_requires_database_url() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_memory_storage_needs_no_database() {
        let config = config(&[
            ("PEOPLE_STORAGE", "memory"),
            ("APP_ENV", "Production"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("STRICT_NOT_FOUND", "true"),
        ])
        .unwrap();
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.addr.to_string(), "127.0.0.1:8080");
        assert!(config.strict_not_found);
    }

    #[test]
    fn test_invalid_values_are_reported() {
        assert_eq!(
            config(&[("PEOPLE_STORAGE", "memory"), ("PORT", "http")]),
            Err(ConfigError::Invalid {
                key: "PORT",
                value: "http".to_string()
            })
        );
        assert_eq!(
            config(&[("DATABASE_URL", "postgres://x"), ("DATABASE_TIMEOUT", "-1")]),
            Err(ConfigError::Invalid {
                key: "DATABASE_TIMEOUT",
                value: "-1".to_string()
            })
        );
        assert!(matches!(
            config(&[("PEOPLE_STORAGE", "sqlite")]),
            Err(ConfigError::Invalid {
                key: "PEOPLE_STORAGE",
                ..
            })
        ));
        assert!(matches!(
            config(&[("PEOPLE_STORAGE", "memory"), ("APP_ENV", "qa")]),
            Err(ConfigError::Invalid { key: "APP_ENV", .. })
        ));
    }

    #[test]
    fn test_app_env_from_dotenv_selects_environment_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".env"),
            "APP_ENV=production\nPEOPLE_STORAGE=memory\nPORT=1000\nRUST_LOG=people_api=trace\n",
        )
        .unwrap();
        fs::write(dir.path().join(".env.development"), "PORT=1111\n").unwrap();
        fs::write(
            dir.path().join(".env.production"),
            "PORT=2222\nSTRICT_NOT_FOUND=true\n",
        )
        .unwrap();

        let config = AppConfig::load_from(dir.path(), |_| None).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.storage, StorageConfig::Memory);
        assert_eq!(config.addr.port(), 2222);
        assert!(config.strict_not_found);
        assert_eq!(config.log_filter.as_deref(), Some("people_api=trace"));

        let config = AppConfig::load_from(dir.path(), |key| match key {
            "APP_ENV" => Some("development".to_string()),
            "STRICT_NOT_FOUND" => Some("false".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.addr.port(), 1111);
        assert!(!config.strict_not_found);
    }

    #[test]
    fn test_missing_env_files_fall_back_to_process() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path(), |key| match key {
            "DATABASE_URL" => Some("postgres://localhost/people".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.addr.port(), 3000);
        assert_eq!(config.log_filter, None);
    }
}
