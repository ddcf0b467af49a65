use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kawan", about = "Social graph, places and threaded posts")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to the database file (overrides config)
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Load the sample users, place and thread
    Seed,
    /// Register a user from sign-up params (JSON object on stdin)
    SignUp,
    /// List users following USERNAME
    Followers { username: String },
    /// List users USERNAME follows
    Followings { username: String },
    /// List users USERNAME has asked to follow
    Requests { username: String },
    /// USERNAME follows (or requests to follow) FRIEND
    Follow { username: String, friend: String },
    /// USERNAME accepts the pending request from REQUESTER
    Accept { username: String, requester: String },
    /// Show a post, its root and its replies
    Thread { post_id: String },
    /// Places within RADIUS meters of a point
    Nearby {
        #[arg(allow_negative_numbers = true)]
        longitude: f64,
        #[arg(allow_negative_numbers = true)]
        latitude: f64,
        #[arg(long, default_value_t = 1000.0)]
        radius: f64,
    },
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    pub pool_size: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub bcrypt_cost: u32,
    pub min_password_length: usize,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            pool_size: 8,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bcrypt_cost: bcrypt::DEFAULT_COST,
            min_password_length: 6,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli);
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref path) = cli.database {
            config.database.path = Some(path.clone());
        }

        if config.database.pool_size == 0 {
            anyhow::bail!(
                "database.pool_size must be at least 1 (in {})",
                config_path.display()
            );
        }

        // Resolve paths relative to data dir
        if config.database.path.is_none() {
            config.database.path = Some(data_dir.join("kawan.db"));
        }

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> PathBuf {
        cli.data_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".kawan")
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("kawan.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(data_dir: Option<PathBuf>, config: Option<PathBuf>) -> Cli {
        Cli {
            config,
            data_dir,
            database: None,
            command: Command::Migrate,
        }
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.auth.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(config.auth.min_password_length, 6);
        assert_eq!(config.log.filter, "info");
        assert!(config.database.path.is_none());
    }

    #[test]
    fn data_dir_uses_cli_override() {
        let cli = cli(Some(PathBuf::from("/tmp/test-kawan")), None);
        assert_eq!(Config::data_dir(&cli), PathBuf::from("/tmp/test-kawan"));
    }

    #[test]
    fn data_dir_defaults_to_dot_kawan() {
        let dir = Config::data_dir(&cli(None, None));
        assert!(dir.ends_with(".kawan"));
    }

    #[test]
    fn load_with_no_config_file_uses_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let config = Config::load(&cli(Some(tmp.path().to_path_buf()), None)).unwrap();
        assert_eq!(config.db_path(), tmp.path().join("kawan.db"));
        assert_eq!(config.database.pool_size, 8);
    }

    #[test]
    fn load_reads_toml_file() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
[database]
pool_size = 2

[auth]
bcrypt_cost = 4
min_password_length = 10

[log]
filter = "kawan=debug"
"#,
        )
        .unwrap();

        let config =
            Config::load(&cli(Some(tmp.path().to_path_buf()), Some(config_path))).unwrap();
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.auth.bcrypt_cost, 4);
        assert_eq!(config.auth.min_password_length, 10);
        assert_eq!(config.log.filter, "kawan=debug");
    }

    #[test]
    fn load_rejects_zero_pool_size() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[database]\npool_size = 0\n").unwrap();

        let err = Config::load(&cli(Some(tmp.path().to_path_buf()), Some(config_path)))
            .unwrap_err();
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn cli_database_beats_toml_value() {
        let tmp = tempfile::tempdir().unwrap();
        let config_path = tmp.path().join("config.toml");
        std::fs::write(&config_path, "[database]\npath = \"/srv/from-file.db\"\n").unwrap();

        let mut cli = cli(Some(tmp.path().to_path_buf()), Some(config_path));
        cli.database = Some(tmp.path().join("override.db"));
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.db_path(), tmp.path().join("override.db"));
    }

    #[test]
    fn parses_nearby_with_negative_latitude() {
        let cli = Cli::try_parse_from([
            "kawan",
            "nearby",
            "112.739898",
            "-7.259836",
            "--radius",
            "500",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Nearby {
                longitude: 112.739898,
                latitude: -7.259836,
                radius: 500.0
            }
        );
    }
}
