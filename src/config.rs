//! Extractor configuration and reader options.
//!
//! The custom extractor is described by an [`ExtractorConfig`] resolved once
//! from the settings file or the environment and then handed to the reader.
//! Nothing in the engine reads settings or environment variables itself.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ArchiveError;

/// Environment variable naming the custom extractor program.
pub const ENV_EXTRACTOR_PROGRAM: &str = "ZIPTAP_EXTRACTOR_PROGRAM";
/// Environment variable holding the custom extractor argument template.
pub const ENV_EXTRACTOR_ARGS: &str = "ZIPTAP_EXTRACTOR_ARGS";
/// Environment variable overriding the settings file location.
pub const ENV_CONFIG_PATH: &str = "ZIPTAP_CONFIG";

/// Persisted settings document.
///
/// ```json
/// { "zip": { "extractorProgram": "7zz", "extractorArgs": "x -y -o{dest} {zip}" } }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub zip: ZipSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipSettings {
    #[serde(default)]
    pub extractor_program: Option<String>,
    #[serde(default)]
    pub extractor_args: Option<String>,
}

impl Settings {
    /// Read a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file {}", path.display()))
    }

    /// `$ZIPTAP_CONFIG`, else `<config dir>/ziptap/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(ENV_CONFIG_PATH) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("ziptap").join("settings.json"))
    }

    /// Read the default settings file; a missing file means empty settings.
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.is_file() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

/// A user-supplied extraction command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractorConfig {
    pub program: Option<String>,
    pub args_template: Option<String>,
}

/// A custom command ready to spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExtractorConfig {
    pub fn new(program: impl Into<String>, args_template: impl Into<String>) -> Self {
        Self {
            program: non_empty(Some(program.into())),
            args_template: non_empty(Some(args_template.into())),
        }
    }

    /// Settings first, then the process environment.
    pub fn resolve(settings: &Settings) -> Self {
        Self::resolve_with(settings, |key| std::env::var(key).ok())
    }

    /// Like [`resolve`](Self::resolve) with an explicit environment lookup.
    pub fn resolve_with(settings: &Settings, env: impl Fn(&str) -> Option<String>) -> Self {
        let program = non_empty(settings.zip.extractor_program.clone())
            .or_else(|| non_empty(env(ENV_EXTRACTOR_PROGRAM)));
        let args_template = non_empty(settings.zip.extractor_args.clone())
            .or_else(|| non_empty(env(ENV_EXTRACTOR_ARGS)));
        Self {
            program,
            args_template,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.program.is_some()
    }

    /// Build the command for one extraction.
    ///
    /// `Ok(None)` when no program is configured. A configured program that
    /// cannot be found is an error, never a reason to try something else.
    pub fn command_for(
        &self,
        zip: &Path,
        dest: &Path,
    ) -> std::result::Result<Option<CustomCommand>, ArchiveError> {
        let Some(program) = self.program.as_deref() else {
            return Ok(None);
        };
        let program = replace_placeholders(program, zip, dest);
        let args = self
            .args_template
            .as_deref()
            .map(|t| split_command(&replace_placeholders(t, zip, dest)))
            .unwrap_or_default();

        let mut resolved = PathBuf::from(&program);
        if !resolved.is_absolute() {
            if let Ok(found) = which::which(&program) {
                resolved = found;
            }
        }
        if !resolved.exists() {
            return Err(ArchiveError::CustomExtractorMissing(program));
        }

        Ok(Some(CustomCommand {
            program: resolved,
            args,
        }))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Render a path with the platform's separators.
pub fn native_path(path: &Path) -> String {
    let text = path.display().to_string();
    if cfg!(windows) {
        text.replace('/', "\\")
    } else {
        text
    }
}

/// Substitute `{zip}`, `{dest}` and the older `%ZIP%` / `%DEST%` forms.
pub fn replace_placeholders(text: &str, zip: &Path, dest: &Path) -> String {
    let zip = native_path(zip);
    let dest = native_path(dest);
    text.replace("{zip}", &zip)
        .replace("{dest}", &dest)
        .replace("%ZIP%", &zip)
        .replace("%DEST%", &dest)
}

/// Split a command line into arguments.
///
/// Whitespace separates arguments, double quotes group, and three
/// consecutive double quotes stand for one literal quote.
pub fn split_command(command: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut quotes = 0;

    for c in command.chars() {
        if c == '"' {
            quotes += 1;
            if quotes == 3 {
                quotes = 0;
                current.push('"');
            }
            continue;
        }
        if quotes > 0 {
            if quotes == 1 {
                in_quote = !in_quote;
            }
            quotes = 0;
        }
        if !in_quote && c.is_whitespace() {
            if !current.is_empty() {
                args.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// Options for an [`ArchiveReader`](crate::ArchiveReader).
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Custom extractor, tried before every built-in backend.
    pub extractor: ExtractorConfig,
    /// Progress sampling period.
    pub sample_interval: Duration,
    /// Allow the in-process streaming backend.
    pub in_process: bool,
    /// Allow the general-purpose listing when the directory parser fails.
    pub manifest_fallback: bool,
    /// Parent of the per-drag session folders.
    pub drag_root: PathBuf,
    /// Upper bound for a command-line drag extraction.
    pub drag_timeout: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            sample_interval: Duration::from_secs(1),
            in_process: true,
            manifest_fallback: true,
            drag_root: std::env::temp_dir().join("ziptap_drag"),
            drag_timeout: Duration::from_secs(120),
        }
    }
}
