// src/infra/paths.rs — XDG-compliant path management
//
// All paths respect the ENGRAM_HOME environment variable for isolation.
// When ENGRAM_HOME is set, config and data live under that directory.
// When unset, config uses ~/.engram/ and data uses XDG_DATA_HOME/engram.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::sync::OnceLock;

static PROJECT_DIRS: OnceLock<ProjectDirs> = OnceLock::new();

fn project_dirs() -> &'static ProjectDirs {
    PROJECT_DIRS.get_or_init(|| {
        ProjectDirs::from("", "", "engram").expect("Could not determine home directory")
    })
}

/// Returns the ENGRAM_HOME override, if set.
fn engram_home() -> Option<PathBuf> {
    std::env::var_os("ENGRAM_HOME").map(PathBuf::from)
}

/// Configuration directory: $ENGRAM_HOME/ or ~/.engram/
pub fn config_dir() -> PathBuf {
    if let Some(home) = engram_home() {
        return home;
    }
    dirs_home().join(".engram")
}

/// Data directory: $ENGRAM_HOME/data/ or XDG_DATA_HOME/engram
pub fn data_dir() -> PathBuf {
    if let Some(home) = engram_home() {
        return home.join("data");
    }
    project_dirs().data_local_dir().to_path_buf()
}

/// Home directory
pub fn dirs_home() -> PathBuf {
    directories::BaseDirs::new()
        .expect("Could not determine home directory")
        .home_dir()
        .to_path_buf()
}

/// Memory database path
pub fn db_path() -> PathBuf {
    data_dir().join("memory.db")
}

/// Config file path
pub fn config_file_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Ensure all required directories exist
pub async fn ensure_dirs() -> anyhow::Result<()> {
    let dirs = [config_dir(), data_dir()];

    for dir in &dirs {
        tokio::fs::create_dir_all(dir).await?;
    }

    Ok(())
}
