use anyhow::Result;
use std::env;
use std::path::PathBuf;

pub const CONFIG_FILE: &str = "primer.toml";
pub const LOG_FILE: &str = "primer.log";
pub const DAEMON_LOCK_FILE: &str = "primer-daemon.lock";

#[derive(Debug, Clone)]
pub struct PrimerPaths {
    pub primer_home: PathBuf,
    pub config_file: PathBuf,
    pub logs_dir: PathBuf,
    pub log_file: PathBuf,
    pub lock_file: PathBuf,
    pub primer_home_is_explicit: bool,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

fn primer_home_from_inputs(home: PathBuf, primer_home_env: Option<&str>) -> (PathBuf, bool) {
    match primer_home_env {
        Some(v) if !v.trim().is_empty() => (PathBuf::from(v.trim()), true),
        _ => (home.join(".quota-primer"), false),
    }
}

fn default_logs_dir(
    home: &std::path::Path,
    primer_home: &std::path::Path,
    explicit: bool,
) -> PathBuf {
    if cfg!(target_os = "macos") && !explicit {
        home.join("Library").join("Logs").join("quota-primer")
    } else {
        primer_home.join("logs")
    }
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(custom) = env_path("PRIMER_CONFIG_PATH") {
        return Some(custom);
    }
    if let Some(home) = env_path("PRIMER_HOME") {
        return Some(home.join(CONFIG_FILE));
    }
    let home = dirs::home_dir()?;
    Some(home.join(".quota-primer").join(CONFIG_FILE))
}

pub fn resolve_paths() -> Result<PrimerPaths> {
    let home = required_home_dir()?;
    let primer_home_env = env::var("PRIMER_HOME").ok();
    let (primer_home, is_explicit) =
        primer_home_from_inputs(home.clone(), primer_home_env.as_deref());

    let config_file = resolve_config_path().unwrap_or_else(|| primer_home.join(CONFIG_FILE));
    let logs_dir = env_path("PRIMER_LOGS_DIR")
        .unwrap_or_else(|| default_logs_dir(&home, &primer_home, is_explicit));
    let log_file = logs_dir.join(LOG_FILE);
    let lock_file = logs_dir.join(DAEMON_LOCK_FILE);

    Ok(PrimerPaths {
        primer_home,
        config_file,
        logs_dir,
        log_file,
        lock_file,
        primer_home_is_explicit: is_explicit,
    })
}

#[cfg(test)]
mod tests {
    use super::primer_home_from_inputs;
    use std::path::PathBuf;

    #[test]
    fn default_primer_home_is_hidden_dir_under_home() {
        let (primer_home, is_explicit) =
            primer_home_from_inputs(PathBuf::from("/home/alice"), None);
        assert_eq!(primer_home, PathBuf::from("/home/alice/.quota-primer"));
        assert!(!is_explicit);
    }

    #[test]
    fn explicit_primer_home_is_preserved() {
        let (primer_home, is_explicit) =
            primer_home_from_inputs(PathBuf::from("/home/alice"), Some("/srv/primer"));
        assert_eq!(primer_home, PathBuf::from("/srv/primer"));
        assert!(is_explicit);
    }

    #[test]
    fn blank_primer_home_falls_back_to_default() {
        let (primer_home, is_explicit) =
            primer_home_from_inputs(PathBuf::from("/home/alice"), Some("   "));
        assert_eq!(primer_home, PathBuf::from("/home/alice/.quota-primer"));
        assert!(!is_explicit);
    }
}
