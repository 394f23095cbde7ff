use std::fmt;

use anyhow::{Result, ensure};
use serde::{Deserialize, Serialize};

/// Which operations use the alternate executable location.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AltPathScope {
    #[default]
    None,
    SingleCompile,
    BulkCompile,
    All,
}

impl AltPathScope {
    /// Whether a compile of the given kind uses the alternate path.
    pub fn applies_to_compile(self, bulk: bool) -> bool {
        match self {
            AltPathScope::All => true,
            AltPathScope::SingleCompile => !bulk,
            AltPathScope::BulkCompile => bulk,
            AltPathScope::None => false,
        }
    }

    /// Whether the simulator invocation uses the alternate path.
    pub fn applies_to_run(self) -> bool {
        matches!(self, AltPathScope::All)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AltPathScope::None => "None",
            AltPathScope::SingleCompile => "Single Compile",
            AltPathScope::BulkCompile => "Bulk Compile",
            AltPathScope::All => "All",
        }
    }
}

impl fmt::Display for AltPathScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown values fall back to [`AltPathScope::None`].
impl From<&str> for AltPathScope {
    fn from(value: &str) -> Self {
        let normalized: String = value
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "singlecompile" | "single" => AltPathScope::SingleCompile,
            "bulkcompile" | "bulk" => AltPathScope::BulkCompile,
            "all" => AltPathScope::All,
            _ => AltPathScope::None,
        }
    }
}

impl From<String> for AltPathScope {
    fn from(value: String) -> Self {
        AltPathScope::from(value.as_str())
    }
}

impl From<AltPathScope> for String {
    fn from(value: AltPathScope) -> Self {
        value.as_str().to_string()
    }
}

/// Resolved options consumed by one invocation. Never mutated once handed to
/// the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// Send commands to an interactive shell instead of the output channel.
    #[serde(default)]
    pub run_in_terminal: bool,
    /// Clear the panel before each single compile or batch.
    #[serde(default = "ConfigSnapshot::default_true")]
    pub clear_previous_output: bool,
    /// Keep editor focus when revealing the panel.
    #[serde(default = "ConfigSnapshot::default_true")]
    pub preserve_focus: bool,
    /// Reserved: waveform viewing after a run is not performed.
    #[serde(default)]
    pub open_vcd: bool,
    /// Source extensions picked up by compile-all, including the leading dot.
    #[serde(default = "ConfigSnapshot::default_supported_extensions")]
    pub supported_extensions: Vec<String>,
    /// Alternate location of the toolchain: an executable or a directory.
    #[serde(default)]
    pub alt_path: String,
    #[serde(default)]
    pub alt_path_scope: AltPathScope,
    /// Extension of the compiled artifact placed in `build/`.
    #[serde(default = "ConfigSnapshot::default_output_extension")]
    pub output_extension: String,
    /// Appended verbatim to every compile command.
    #[serde(default)]
    pub extra_flags: String,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            run_in_terminal: false,
            clear_previous_output: Self::default_true(),
            preserve_focus: Self::default_true(),
            open_vcd: false,
            supported_extensions: Self::default_supported_extensions(),
            alt_path: String::new(),
            alt_path_scope: AltPathScope::None,
            output_extension: Self::default_output_extension(),
            extra_flags: String::new(),
        }
    }
}

impl ConfigSnapshot {
    pub const DEFAULT_EXTENSIONS: [&'static str; 3] = [".v", ".sv", ".vl"];

    const fn default_true() -> bool {
        true
    }

    fn default_supported_extensions() -> Vec<String> {
        Self::DEFAULT_EXTENSIONS
            .iter()
            .map(|ext| (*ext).to_string())
            .collect()
    }

    fn default_output_extension() -> String {
        ".out".to_string()
    }

    /// Alternate path, or `None` when unset or blank.
    pub fn alt_path(&self) -> Option<&str> {
        let trimmed = self.alt_path.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// True when `extension` (with leading dot) is one compile-all picks up.
    pub fn is_supported_extension(&self, extension: &str) -> bool {
        self.supported_extensions.iter().any(|ext| ext == extension)
    }

    /// Add missing leading dots to extensions.
    pub fn normalize(&mut self) {
        for ext in &mut self.supported_extensions {
            if !ext.starts_with('.') {
                ext.insert(0, '.');
            }
        }
        if !self.output_extension.is_empty() && !self.output_extension.starts_with('.') {
            self.output_extension.insert(0, '.');
        }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.output_extension.trim().is_empty(),
            "output_extension must not be empty"
        );
        ensure!(
            self.supported_extensions
                .iter()
                .all(|ext| ext.len() > 1 && ext.starts_with('.')),
            "supported_extensions entries must look like \".v\""
        );
        Ok(())
    }
}
