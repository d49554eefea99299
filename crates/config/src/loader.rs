use {
    crate::{env_subst::substitute_env, schema::SandpitConfig},
    anyhow::{Context, Result, bail},
    std::path::{Path, PathBuf},
    tracing::{debug, warn},
};

/// Candidate config filenames, checked in order.
const CONFIG_FILENAMES: &[&str] =
    &["sandpit.toml", "sandpit.yaml", "sandpit.yml", "sandpit.json"];

/// Load configuration from the given file.
///
/// The format is chosen by extension (`toml`, `yaml`/`yml`, or `json`) and
/// `${ENV_VAR}` placeholders are substituted before parsing.
pub fn load_config(path: &Path) -> Result<SandpitConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let raw = substitute_env(&raw);

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let config = match ext.as_str() {
        "toml" => toml::from_str(&raw)
            .with_context(|| format!("invalid TOML in {}", path.display()))?,
        "yaml" | "yml" => serde_yaml::from_str(&raw)
            .with_context(|| format!("invalid YAML in {}", path.display()))?,
        "json" => serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
        other => bail!(
            "unsupported config extension {:?} for {}",
            other,
            path.display()
        ),
    };

    Ok(config)
}

/// Discover a config file and load it, falling back to defaults.
///
/// Search order: the current directory, then the per-user config directory.
/// A missing file is not an error; a broken file logs a warning and also
/// falls back to defaults so the playground still starts.
pub fn discover_and_load() -> SandpitConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return SandpitConfig::default();
    };

    match load_config(&path) {
        Ok(config) => {
            debug!(path = %path.display(), "loaded config");
            config
        },
        Err(err) => {
            warn!(path = %path.display(), error = %err, "config unreadable, using defaults");
            SandpitConfig::default()
        },
    }
}

fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let local = PathBuf::from(name);
        if local.is_file() {
            return Some(local);
        }
    }

    let dir = config_dir()?;
    for name in CONFIG_FILENAMES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}

/// Per-user config directory, e.g. `~/.config/sandpit` on Linux.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "sandpit")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Per-user data directory for session scratch space.
///
/// Falls back to `.sandpit` under the current directory when the platform
/// directories cannot be resolved.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "sandpit")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".sandpit"))
}
