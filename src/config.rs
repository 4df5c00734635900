use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

use crate::challenge::DEFAULT_PAGE_SIZE;

#[derive(Parser, Debug)]
#[command(name = "get-after-it", about = "Group challenges with a live leaderboard")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Path to data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Path to the database file
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// History entries per page
    #[arg(long, global = true)]
    pub page_size: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Create an account and sign in
    #[command(name = "signup")]
    SignUp(SignUpArgs),
    #[command(name = "signin")]
    SignIn(SignInArgs),
    #[command(name = "signout")]
    SignOut,
    /// Show the signed-in account
    Whoami,
    #[command(subcommand)]
    Group(GroupCommand),
    #[command(subcommand)]
    Goal(GoalCommand),
    /// Log progress in the current group
    Log(LogArgs),
    /// Delete your progress entry for a date in the current group
    Delete {
        /// Defaults to today
        #[arg(long)]
        date: Option<String>,
    },
    /// Print the current group's leaderboard and history
    Board {
        /// History page, starting at 1
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Follow the current group live
    Watch,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct SignUpArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub password: String,
    #[arg(long)]
    pub name: Option<String>,
    #[arg(long)]
    pub photo_url: Option<String>,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct SignInArgs {
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub password: String,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum GroupCommand {
    /// Create a group and make it current
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Join with an invite code, or by id from search results
    Join {
        #[arg(required_unless_present = "id")]
        code: Option<String>,
        #[arg(long, conflicts_with = "code")]
        id: Option<String>,
    },
    /// Find groups by name prefix
    Search { term: String },
    /// List your groups
    List,
    /// Switch the current group
    Use { group_id: String },
    /// Show the current group
    Show,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum GoalCommand {
    /// Set the current group's goal (owner only)
    Set {
        challenge_type: String,
        target: f64,
        /// Count days logged instead of quantities
        #[arg(long)]
        daily: bool,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
    },
    /// Delete the goal and all progress (owner only)
    Reset {
        /// Required; there is no undo
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct LogArgs {
    /// Amount done; ignored for daily goals
    pub quantity: Option<f64>,
    /// Defaults to today
    #[arg(long)]
    pub date: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub history: HistoryConfig,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub session_hours: u64,
    pub bcrypt_cost: u32,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct HistoryConfig {
    pub page_size: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_hours: 720,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Config {
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let data_dir = Self::data_dir(cli)?;
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| data_dir.join("config.toml"));

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("reading {}", config_path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?
        } else {
            Config::default()
        };

        // CLI overrides
        if let Some(ref db) = cli.db {
            config.database.path = Some(db.clone());
        }
        if let Some(page_size) = cli.page_size {
            config.history.page_size = page_size;
        }
        if config.history.page_size == 0 {
            anyhow::bail!("history.page_size must be at least 1");
        }

        // Resolve paths relative to data dir
        config.database.path = Some(match config.database.path.take() {
            Some(path) if path.is_relative() => data_dir.join(path),
            Some(path) => path,
            None => data_dir.join("get-after-it.db"),
        });

        Ok(config)
    }

    pub fn data_dir(cli: &Cli) -> anyhow::Result<PathBuf> {
        match cli.data_dir.clone() {
            Some(dir) => Ok(dir),
            None => dirs::home_dir()
                .map(|home| home.join(".get-after-it"))
                .context("Could not determine home directory"),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(|| PathBuf::from("get-after-it.db"))
    }
}
