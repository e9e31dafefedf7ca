use std::fs;
use std::io;
use std::path::PathBuf;

pub const APP_DIR: &str = "grindcoach";
pub const DEFAULT_DB_NAME: &str = "grind.db";
pub const DEFAULT_PROBLEMS_NAME: &str = "problems.json";

pub const DB_ENV: &str = "GRIND_DB";
pub const PROBLEMS_ENV: &str = "GRIND_PROBLEMS";
pub const LOG_ENV: &str = "GRIND_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: PathBuf,
    pub problems_path: PathBuf,
}

impl Config {
    /// Resolve paths: explicit flag, then environment, then `<config_dir>/grindcoach/`.
    pub fn resolve<F>(
        db_flag: Option<PathBuf>,
        problems_flag: Option<PathBuf>,
        env: F,
        config_dir: Option<PathBuf>,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let app_dir = config_dir
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        let pick = |flag: Option<PathBuf>, var: &str, default: &str| {
            flag.or_else(|| env(var).filter(|v| !v.is_empty()).map(PathBuf::from))
                .unwrap_or_else(|| app_dir.join(default))
        };

        Self {
            db_path: pick(db_flag, DB_ENV, DEFAULT_DB_NAME),
            problems_path: pick(problems_flag, PROBLEMS_ENV, DEFAULT_PROBLEMS_NAME),
        }
    }

    pub fn from_env(db_flag: Option<PathBuf>, problems_flag: Option<PathBuf>) -> Self {
        Self::resolve(
            db_flag,
            problems_flag,
            |var| std::env::var(var).ok(),
            dirs::config_dir(),
        )
    }

    pub fn ensure_db_dir(&self) -> io::Result<()> {
        match self.db_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent),
            _ => Ok(()),
        }
    }
}
