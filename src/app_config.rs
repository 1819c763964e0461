//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use third_api_core::MediaKind;
use third_api_core::config::parse_external_address;

/// Hand-parsed `key = value` file configuration.
#[derive(Debug, Clone, Default)]
pub struct FileConfig {
    /// RapidAPI keys, tried in order.
    pub rapidapi_keys: Vec<String>,
    /// HikerAPI key.
    pub hikerapi_key: Option<String>,
    /// Kill switch for every third-party call.
    pub disable_third_api: Option<bool>,
    /// Media kinds kept in playlists.
    pub media_filter: Vec<String>,
    /// Try RapidAPI providers first.
    pub prefer_rapidapi: Option<bool>,
    /// Use RapidAPI providers only.
    pub only_rapidapi: Option<bool>,
    /// External resolver address.
    pub external_ie: Option<String>,
    /// Frequency guard state file.
    pub guard_file: Option<PathBuf>,
    /// Guard key namespace.
    pub guard_namespace: Option<String>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if self.prefer_rapidapi == Some(true) && self.only_rapidapi == Some(true) {
            bail!("Invalid config: `prefer_rapidapi` and `only_rapidapi` are mutually exclusive");
        }
        if let Some(address) = self.external_ie.as_deref() {
            parse_external_address(address)
                .with_context(|| "Invalid config value for `external_ie`".to_string())?;
        }
        for kind in &self.media_filter {
            if kind.parse::<MediaKind>().is_err() {
                bail!(
                    "Invalid config value for `media_filter`: '{kind}'. Expected one of: video, audio, photo, mixed"
                );
            }
        }
        if let Some(namespace) = self.guard_namespace.as_deref()
            && namespace.trim().is_empty()
        {
            bail!("Invalid config value for `guard_namespace`: must not be empty");
        }
        Ok(())
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/third-api/config.toml`
/// 2. `$HOME/.config/third-api/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("third-api")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("third-api")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!(
                "Invalid config syntax on line {}: expected key = value",
                line_index + 1
            );
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {}", line_index + 1);

        match key {
            "rapidapi_key" => {
                cfg.rapidapi_keys = parse_string_or_list(value).with_context(context)?;
            }
            "hikerapi_key" => {
                cfg.hikerapi_key = Some(parse_string_literal(value).with_context(context)?);
            }
            "disable_third_api" => {
                cfg.disable_third_api = Some(parse_boolean(value).with_context(context)?);
            }
            "media_filter" => {
                cfg.media_filter = parse_string_or_list(value).with_context(context)?;
            }
            "prefer_rapidapi" => {
                cfg.prefer_rapidapi = Some(parse_boolean(value).with_context(context)?);
            }
            "only_rapidapi" => {
                cfg.only_rapidapi = Some(parse_boolean(value).with_context(context)?);
            }
            "external_ie" => {
                cfg.external_ie = Some(parse_string_or_integer(value).with_context(context)?);
            }
            "guard_file" => {
                cfg.guard_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "guard_namespace" => {
                cfg.guard_namespace = Some(parse_string_literal(value).with_context(context)?);
            }
            unknown => {
                bail!(
                    "Unknown configuration key: '{}' on line {}",
                    unknown,
                    line_index + 1
                );
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

/// Accepts `"a"` or `["a", "b"]`.
fn parse_string_or_list(raw_value: &str) -> Result<Vec<String>> {
    let token = raw_value.trim();
    let Some(inner) = token
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return Ok(vec![parse_string_literal(token)?]);
    };
    inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_string_literal)
        .collect()
}

/// Accepts `"host:port"` or a bare port number.
fn parse_string_or_integer(raw_value: &str) -> Result<String> {
    let token = raw_value.trim();
    if token.starts_with('"') {
        return parse_string_literal(token);
    }
    let port = token.parse::<u16>()?;
    Ok(port.to_string())
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
