use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The flag that keeps the dashboard from splitting the screen again.
pub const NO_SPLIT_FLAG: &str = "--no-split";

/// One session's split-view settings. Loaded from config.toml, then overridden
/// by command-line flags; read-only once the session starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SplitViewConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Fraction of the terminal width given to the left pane.
    #[serde(default = "default_ratio")]
    pub ratio: f64,
    /// Pane focused on launch: "claude", "tui" or "shell".
    #[serde(default = "default_active_pane")]
    pub active_pane: String,
    /// Run the user's shell on the left instead of the assistant.
    #[serde(default)]
    pub use_shell: bool,
    #[serde(default)]
    pub colors: ColorsConfig,
    #[serde(default)]
    pub shortcuts: ShortcutConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

impl Default for SplitViewConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ratio: default_ratio(),
            active_pane: default_active_pane(),
            use_shell: false,
            colors: ColorsConfig::default(),
            shortcuts: ShortcutConfig::default(),
            assistant: AssistantConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

/// Border colors by name (see `terminal::parse_color`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColorsConfig {
    #[serde(default = "default_active_color")]
    pub active: String,
    #[serde(default = "default_inactive_color")]
    pub inactive: String,
}

impl Default for ColorsConfig {
    fn default() -> Self {
        Self {
            active: default_active_color(),
            inactive: default_inactive_color(),
        }
    }
}

/// Each shortcut is `prefix` followed by its marker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShortcutConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_switch_focus")]
    pub switch_focus: String,
    #[serde(default = "default_shrink_left")]
    pub shrink_left: String,
    #[serde(default = "default_grow_left")]
    pub grow_left: String,
}

impl Default for ShortcutConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            switch_focus: default_switch_focus(),
            shrink_left: default_shrink_left(),
            grow_left: default_grow_left(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_command")]
    pub command: String,
    /// Pause after the "not installed" notice before the dashboard takes over.
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
    #[serde(default = "default_install_url")]
    pub install_url: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            command: default_assistant_command(),
            startup_delay_ms: default_startup_delay_ms(),
            install_url: default_install_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DashboardConfig {
    #[serde(default = "default_dashboard_command")]
    pub command: Vec<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            command: default_dashboard_command(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_ratio() -> f64 {
    0.5
}
fn default_active_pane() -> String {
    "claude".into()
}
fn default_active_color() -> String {
    "cyan".into()
}
fn default_inactive_color() -> String {
    "dark_grey".into()
}
fn default_prefix() -> String {
    "\u{2}".into()
}
fn default_switch_focus() -> String {
    "\u{1b}[C".into()
}
fn default_shrink_left() -> String {
    "<".into()
}
fn default_grow_left() -> String {
    ">".into()
}
fn default_assistant_command() -> String {
    "claude".into()
}
fn default_startup_delay_ms() -> u64 {
    2000
}
fn default_install_url() -> String {
    "https://docs.anthropic.com/en/docs/claude-code/setup".into()
}
fn default_dashboard_command() -> Vec<String> {
    vec!["python3".into(), "-m".into(), "dashboard".into()]
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl SplitViewConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SplitViewConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `$XDG_CONFIG_HOME/splitview/config.toml`, else `~/.config/splitview/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("splitview").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.ratio > 0.0 && self.ratio < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "ratio must be between 0.0 and 1.0, got {}",
                self.ratio
            )));
        }
        if self.assistant.command.trim().is_empty() {
            return Err(ConfigError::Invalid("assistant.command is empty".into()));
        }
        if self.dashboard.command.is_empty() || self.dashboard.command[0].trim().is_empty() {
            return Err(ConfigError::Invalid("dashboard.command is empty".into()));
        }
        let shortcuts = &self.shortcuts;
        for (name, marker) in [
            ("switch_focus", &shortcuts.switch_focus),
            ("shrink_left", &shortcuts.shrink_left),
            ("grow_left", &shortcuts.grow_left),
        ] {
            if shortcuts.prefix.is_empty() && marker.is_empty() {
                return Err(ConfigError::Invalid(format!("shortcut {name} is empty")));
            }
        }
        Ok(())
    }

    /// Dashboard argv with the no-split flag appended (once).
    pub fn dashboard_argv(&self) -> Vec<String> {
        let mut argv = self.dashboard.command.clone();
        if !argv.iter().any(|a| a == NO_SPLIT_FLAG) {
            argv.push(NO_SPLIT_FLAG.into());
        }
        argv
    }

    /// Left pane argv: the assistant, or the user's shell in shell mode.
    pub fn left_argv(&self) -> Vec<String> {
        if self.use_shell {
            vec![user_shell()]
        } else {
            vec![self.assistant.command.clone()]
        }
    }
}

/// `$SHELL`, or `/bin/sh` when unset.
pub fn user_shell() -> String {
    std::env::var("SHELL")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "/bin/sh".into())
}
