use std::path::PathBuf;

const UPTIME_DB_PATH: &str = "UPTIME_DB_PATH";

/// SQLite path override from the environment
pub fn get_db_path() -> Option<PathBuf> {
    std::env::var(UPTIME_DB_PATH).ok().map(PathBuf::from)
}

const UPTIME_CONFIG: &str = "UPTIME_CONFIG";

/// Config file path from the environment, used when none is given on the command line
pub fn get_config_path() -> Option<String> {
    let config_from_env = std::env::var(UPTIME_CONFIG);
    config_from_env.ok().filter(|path| !path.is_empty())
}
