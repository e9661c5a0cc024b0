//! Locating and loading the state file
//!
//! Search order: `--file`, then `./converge.{toml,json}`, then
//! `~/.config/converge/converge.{toml,json}`. TOML wins when both formats
//! sit in the same directory.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};

use crate::schema::StateFile;

const FILE_STEM: &str = "converge";

/// Supported state file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
        }
    }

    /// Format implied by a file extension; anything but `.json` is TOML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// Get the converge config directory (~/.config/converge)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("converge"))
}

/// Find `converge.toml` or `converge.json` in a directory, preferring TOML
pub fn find_config_file(dir: &Path) -> Option<(PathBuf, ConfigFormat)> {
    [ConfigFormat::Toml, ConfigFormat::Json]
        .into_iter()
        .map(|format| (dir.join(format!("{FILE_STEM}.{}", format.extension())), format))
        .find(|(path, _)| path.is_file())
}

/// Resolve the state file to load
pub fn locate(explicit: Option<&Path>, search: &[PathBuf]) -> Result<(PathBuf, ConfigFormat)> {
    if let Some(path) = explicit {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let path = PathBuf::from(expanded);
        if !path.is_file() {
            bail!("State file not found: {}", path.display());
        }
        let format = ConfigFormat::from_path(&path);
        return Ok((path, format));
    }

    if let Some(found) = search.iter().find_map(|dir| find_config_file(dir)) {
        return Ok(found);
    }

    let searched: Vec<_> = search.iter().map(|d| d.display().to_string()).collect();
    bail!(
        "No {FILE_STEM}.toml or {FILE_STEM}.json found (searched: {}). Use --file to point at one.",
        searched.join(", ")
    )
}

/// Directories searched when `--file` is not given
pub fn search_path() -> Result<Vec<PathBuf>> {
    let cwd = std::env::current_dir().context("Could not determine current directory")?;
    let mut dirs = vec![cwd];
    if let Ok(dir) = config_dir() {
        dirs.push(dir);
    }
    Ok(dirs)
}

/// Parse state file content
pub fn parse(content: &str, format: ConfigFormat) -> Result<StateFile> {
    match format {
        ConfigFormat::Toml => toml::from_str(content).context("Invalid TOML state file"),
        ConfigFormat::Json => serde_json::from_str(content).context("Invalid JSON state file"),
    }
}

/// Locate, read and parse the state file
pub fn load(explicit: Option<&Path>) -> Result<(PathBuf, StateFile)> {
    let (path, format) = locate(explicit, &search_path()?)?;
    log::debug!("Loading state file {}", path.display());

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let state = parse(&content, format).with_context(|| format!("In {}", path.display()))?;

    Ok((path, state))
}
