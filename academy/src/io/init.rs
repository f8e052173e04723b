//! Initialization helpers for `.academy/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::info;

use super::config::{AcademyConfig, write_config};

/// Canonical paths within `.academy/` for a root directory.
#[derive(Debug, Clone)]
pub struct AcademyPaths {
    pub root: PathBuf,
    pub academy_dir: PathBuf,
    pub config_path: PathBuf,
    pub progress_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl AcademyPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let academy_dir = root.join(".academy");
        Self {
            root,
            config_path: academy_dir.join("config.toml"),
            progress_path: academy_dir.join("progress.json"),
            gitignore_path: academy_dir.join(".gitignore"),
            academy_dir,
        }
    }
}

/// Create `.academy/` with a default config.
///
/// Fails if `.academy/` already exists unless `force` is set. Progress is
/// never touched; `--force` only rewrites the config.
pub fn init_academy(root: &Path, force: bool) -> Result<AcademyPaths> {
    let paths = AcademyPaths::new(root);
    if paths.academy_dir.exists() && !paths.academy_dir.is_dir() {
        return Err(anyhow!("academy init: .academy exists but is not a directory"));
    }
    if paths.academy_dir.exists() && !force {
        return Err(anyhow!(
            "academy init: .academy already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.academy_dir)
        .with_context(|| format!("create directory {}", paths.academy_dir.display()))?;
    write_config(&paths.config_path, &AcademyConfig::default())?;
    fs::write(&paths.gitignore_path, ACADEMY_GITIGNORE)
        .with_context(|| format!("write file {}", paths.gitignore_path.display()))?;

    info!(dir = %paths.academy_dir.display(), "initialized academy");
    Ok(paths)
}

const ACADEMY_GITIGNORE: &str = "progress.json\n";
