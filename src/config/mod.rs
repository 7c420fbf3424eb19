//! Configuration module for varlog-rs
//!
//! This module handles the configuration of a processing pipeline:
//! - [`ProcessingConfig`] - outputs derived for one group and how they are logged
//! - [`VariableGroupLink`] - the variable group the pipeline is attached to
//! - [`GroupRegistry`] - lookup of variable groups by identifier
//! - [`SessionFile`] - everything the headless driver needs, loaded from disk
//!
//! # Files
//!
//! Session files are TOML (`.toml`) or JSON (anything else):
//!
//! ```toml
//! directory = "/tmp/logs"
//!
//! [processing]
//! groupname = "motor"
//! groupid = "g1"
//! logmode = "changes"
//! logformat = "csvc"
//!
//! [[processing.statistics]]
//! name = "speed_avg"
//! variable = "speed"
//! operation = "mean"
//! window = 10
//!
//! [[processing.expressions]]
//! name = "flags"
//! formula = "status & 0xF0"
//!
//! [[groups]]
//! group_id = "g1"
//! group_name = "motor"
//! variables = [{ name = "speed", type = "f32" }, { name = "status", type = "u32" }]
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{Result, ResultExt, VarLogError};
use crate::types::Variable;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default flush interval of the batch timer in milliseconds
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 50;

/// Default size at which a log file is rotated (100 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 104_857_600;

/// Default capacity of the bounded channels between workers
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Directory used for log files when none is configured
pub fn default_log_directory() -> PathBuf {
    dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// ==================== Outputs ====================

/// A statistic derived from one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticConfig {
    /// Output name, also usable inside formulas
    pub name: String,

    /// Name of the source variable
    pub variable: String,

    /// Operation to compute
    pub operation: StatisticKind,

    /// Trailing window size; `None` means cumulative over the whole run
    #[serde(default, deserialize_with = "deserialize_window")]
    pub window: Option<usize>,
}

impl StatisticConfig {
    pub fn cumulative(
        name: impl Into<String>,
        variable: impl Into<String>,
        operation: StatisticKind,
    ) -> Self {
        Self {
            name: name.into(),
            variable: variable.into(),
            operation,
            window: None,
        }
    }

    pub fn windowed(
        name: impl Into<String>,
        variable: impl Into<String>,
        operation: StatisticKind,
        window: usize,
    ) -> Self {
        Self {
            window: Some(window),
            ..Self::cumulative(name, variable, operation)
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WindowRepr {
    Count(u64),
    Text(String),
}

/// Accepts a number, a numeric string, an empty string or null.
/// Zero and empty both mean "cumulative".
fn deserialize_window<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let count = match Option::<WindowRepr>::deserialize(deserializer)? {
        None => return Ok(None),
        Some(WindowRepr::Count(n)) => n,
        Some(WindowRepr::Text(text)) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(None);
            }
            text.parse::<u64>()
                .map_err(|_| D::Error::custom(format!("invalid window size '{}'", text)))?
        }
    };

    if count == 0 {
        return Ok(None);
    }
    usize::try_from(count)
        .map(Some)
        .map_err(|_| D::Error::custom("window size out of range"))
}

/// A formula over variables and statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionConfig {
    pub name: String,
    pub formula: String,
}

impl ExpressionConfig {
    pub fn new(name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            formula: formula.into(),
        }
    }
}

// ==================== Processing Config ====================

/// Configuration of one processing pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Name of the group processed by this pipeline
    pub groupname: String,

    /// Identifier of the linked variable group
    #[serde(default)]
    pub groupid: Option<String>,

    #[serde(default)]
    pub statistics: Vec<StatisticConfig>,

    #[serde(default)]
    pub expressions: Vec<ExpressionConfig>,

    #[serde(default)]
    pub logmode: LogMode,

    #[serde(default)]
    pub logformat: LogFormat,

    /// CSV separator convention
    #[serde(default)]
    pub decimal_style: DecimalStyle,

    /// Flush interval of the batch timer
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Size at which a log file is rotated
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL_MS
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl ProcessingConfig {
    /// Create a configuration with no outputs other than the group's variables
    pub fn new(groupname: impl Into<String>) -> Self {
        Self {
            groupname: groupname.into(),
            groupid: None,
            statistics: Vec::new(),
            expressions: Vec::new(),
            logmode: LogMode::No,
            logformat: LogFormat::Stcm,
            decimal_style: DecimalStyle::Auto,
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }

    pub fn with_groupid(mut self, groupid: impl Into<String>) -> Self {
        self.groupid = Some(groupid.into());
        self
    }

    pub fn with_statistic(mut self, statistic: StatisticConfig) -> Self {
        self.statistics.push(statistic);
        self
    }

    pub fn with_expression(mut self, expression: ExpressionConfig) -> Self {
        self.expressions.push(expression);
        self
    }

    pub fn with_logging(mut self, mode: LogMode, format: LogFormat) -> Self {
        self.logmode = mode;
        self.logformat = format;
        self
    }

    /// Check structural problems that make the configuration unusable
    pub fn validate(&self) -> Result<()> {
        if self.groupname.trim().is_empty() {
            return Err(VarLogError::Config("group name is empty".to_string()));
        }
        if self.tick_interval_ms == 0 {
            return Err(VarLogError::Config(
                "tick interval must be greater than zero".to_string(),
            ));
        }
        let unnamed = self
            .statistics
            .iter()
            .map(|s| s.name.as_str())
            .chain(self.expressions.iter().map(|e| e.name.as_str()))
            .any(|name| name.trim().is_empty());
        if unnamed {
            return Err(VarLogError::Config(
                "every statistic and expression needs a name".to_string(),
            ));
        }
        Ok(())
    }
}

// ==================== Variable Groups ====================

/// The variable group a processing pipeline is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableGroupLink {
    pub group_id: String,

    pub group_name: String,

    /// Variables added manually
    #[serde(default)]
    pub variables: Vec<Variable>,

    /// Variables imported from a symbol file
    #[serde(default)]
    pub imported_variables: Vec<Variable>,

    #[serde(default)]
    pub acquisition_mode: AcquisitionMode,

    #[serde(default)]
    pub trigger: TriggerSettings,
}

impl VariableGroupLink {
    pub fn new(group_id: impl Into<String>, group_name: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            group_name: group_name.into(),
            variables: Vec::new(),
            imported_variables: Vec::new(),
            acquisition_mode: AcquisitionMode::Direct,
            trigger: TriggerSettings::default(),
        }
    }

    pub fn with_variables(mut self, variables: Vec<Variable>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_imported(mut self, variables: Vec<Variable>) -> Self {
        self.imported_variables = variables;
        self
    }

    pub fn with_trigger(mut self, trigger: TriggerSettings) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn with_acquisition_mode(mut self, mode: AcquisitionMode) -> Self {
        self.acquisition_mode = mode;
        self
    }

    /// Variables in sample order: manual ones not shadowed by an import,
    /// followed by the imported ones
    pub fn merged_variables(&self) -> Vec<Variable> {
        self.variables
            .iter()
            .filter(|v| !self.imported_variables.iter().any(|i| i.name == v.name))
            .chain(self.imported_variables.iter())
            .cloned()
            .collect()
    }
}

/// Variable groups known to the process, keyed by group id
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    groups: HashMap<String, VariableGroupLink>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a group
    pub fn register(&mut self, link: VariableGroupLink) {
        self.groups.insert(link.group_id.clone(), link);
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Find a group by id, falling back to its name when the id is unknown
    pub fn resolve(&self, group_id: Option<&str>, group_name: &str) -> Option<&VariableGroupLink> {
        group_id
            .and_then(|id| self.groups.get(id))
            .or_else(|| self.groups.values().find(|g| g.group_name == group_name))
    }
}

impl FromIterator<VariableGroupLink> for GroupRegistry {
    fn from_iter<I: IntoIterator<Item = VariableGroupLink>>(iter: I) -> Self {
        let mut registry = Self::new();
        for link in iter {
            registry.register(link);
        }
        registry
    }
}

// ==================== Session File ====================

/// A processing configuration together with its variable groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFile {
    pub processing: ProcessingConfig,

    #[serde(default)]
    pub groups: Vec<VariableGroupLink>,

    /// Log directory; the home directory when absent
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl SessionFile {
    /// Load a session file, TOML or JSON depending on the extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            VarLogError::Config(format!("Failed to read session file {:?}: {}", path, e))
        })?;

        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));

        let parsed: Result<SessionFile> = if is_toml {
            toml::from_str(&content).map_err(VarLogError::from)
        } else {
            serde_json::from_str(&content).map_err(VarLogError::from)
        };
        let session = parsed.with_context(|| format!("Invalid session file {:?}", path))?;
        session.processing.validate()?;
        Ok(session)
    }

    /// Save as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                VarLogError::Config(format!("Failed to create session directory: {}", e))
            })?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn log_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_log_directory)
    }

    pub fn registry(&self) -> GroupRegistry {
        self.groups.iter().cloned().collect()
    }

    /// The linked group of the processing configuration, if any
    pub fn linked_group(&self) -> Option<VariableGroupLink> {
        self.registry()
            .resolve(self.processing.groupid.as_deref(), &self.processing.groupname)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::VariableType;

    fn var(name: &str) -> Variable {
        Variable::new(name, VariableType::F32)
    }

    #[test]
    fn test_window_deserialization() {
        let parse = |json: &str| serde_json::from_str::<StatisticConfig>(json).map(|s| s.window);
        let base = r#""name":"s","variable":"v","operation":"mean""#;

        assert_eq!(parse(&format!("{{{}}}", base)).unwrap(), None);
        assert_eq!(parse(&format!(r#"{{{},"window":""}}"#, base)).unwrap(), None);
        assert_eq!(parse(&format!(r#"{{{},"window":"5"}}"#, base)).unwrap(), Some(5));
        assert_eq!(parse(&format!(r#"{{{},"window":3}}"#, base)).unwrap(), Some(3));
        assert_eq!(parse(&format!(r#"{{{},"window":0}}"#, base)).unwrap(), None);
        assert!(parse(&format!(r#"{{{},"window":"abc"}}"#, base)).is_err());
    }

    #[test]
    fn test_merged_variables_imported_wins() {
        let link = VariableGroupLink::new("g1", "motor")
            .with_variables(vec![var("a"), var("b")])
            .with_imported(vec![var("b"), var("c")]);

        let names: Vec<_> = link
            .merged_variables()
            .into_iter()
            .map(|v| v.name)
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_registry_falls_back_to_name() {
        let registry: GroupRegistry = vec![
            VariableGroupLink::new("g1", "motor"),
            VariableGroupLink::new("g2", "battery"),
        ]
        .into_iter()
        .collect();

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.resolve(Some("g2"), "motor").map(|g| g.group_id.as_str()),
            Some("g2")
        );
        assert_eq!(
            registry.resolve(Some("stale"), "motor").map(|g| g.group_id.as_str()),
            Some("g1")
        );
        assert!(registry.resolve(None, "unknown").is_none());
    }

    #[test]
    fn test_validate_rejects_empty_group() {
        assert!(ProcessingConfig::new("").validate().is_err());
        assert!(ProcessingConfig::new("motor").validate().is_ok());
        let unnamed = ProcessingConfig::new("motor").with_expression(ExpressionConfig::new("", "1"));
        assert!(unnamed.validate().is_err());
    }

    #[test]
    fn test_session_file_toml_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.toml");
        std::fs::write(
            &path,
            r#"
directory = "/tmp/varlog"

[processing]
groupname = "motor"
groupid = "g1"
logmode = "full"
logformat = "csv"

[[processing.statistics]]
name = "avg"
variable = "speed"
operation = "mean"
window = "4"

[[groups]]
group_id = "g1"
group_name = "motor"
variables = [{ name = "speed", type = "f32" }]

[groups.trigger]
mode = "rising-edge"
variable = "speed"
threshold = 10.0
"#,
        )
        .unwrap();

        let session = SessionFile::load(&path).unwrap();
        assert_eq!(session.processing.tick_interval_ms, DEFAULT_TICK_INTERVAL_MS);
        assert_eq!(session.processing.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(session.processing.statistics[0].window, Some(4));
        assert_eq!(session.log_directory(), PathBuf::from("/tmp/varlog"));

        let linked = session.linked_group().unwrap();
        assert_eq!(linked.trigger.mode, TriggerMode::RisingEdge);

        let json_path = dir.path().join("session.json");
        session.save(&json_path).unwrap();
        let reloaded = SessionFile::load(&json_path).unwrap();
        assert_eq!(reloaded, session);
    }
}
