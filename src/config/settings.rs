//! Enumerated settings shared by the processing and logging configuration
//!
//! # Main Types
//!
//! - [`TriggerSettings`] - Start-gating condition of a variable group
//! - [`AcquisitionMode`] - How the group is acquired (direct or snapshot)
//! - [`StatisticKind`] - Operation computed by a statistic
//! - [`LogMode`] / [`LogFormat`] - What and how to persist
//! - [`DecimalStyle`] - Separator convention of CSV files
//!
//! # Trigger System
//!
//! A trigger holds back all output of a run until the chosen variable crosses
//! the threshold:
//!
//! - Rising edge: `previous < threshold <= current`
//! - Falling edge: `previous > threshold >= current`

use serde::{Deserialize, Serialize};

/// Trigger start mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerMode {
    /// No gating, the run starts immediately
    #[default]
    Manual,
    /// Start when the value crosses the threshold going up
    RisingEdge,
    /// Start when the value crosses the threshold going down
    FallingEdge,
}

impl TriggerMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            TriggerMode::Manual => "manual",
            TriggerMode::RisingEdge => "rising-edge",
            TriggerMode::FallingEdge => "falling-edge",
        }
    }
}

/// Trigger settings of a variable group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TriggerSettings {
    /// Trigger condition
    #[serde(default)]
    pub mode: TriggerMode,

    /// Name of the variable watched by the trigger
    #[serde(default)]
    pub variable: String,

    /// Trigger threshold value
    #[serde(default)]
    pub threshold: f64,
}

impl TriggerSettings {
    pub fn rising(variable: impl Into<String>, threshold: f64) -> Self {
        Self {
            mode: TriggerMode::RisingEdge,
            variable: variable.into(),
            threshold,
        }
    }

    pub fn falling(variable: impl Into<String>, threshold: f64) -> Self {
        Self {
            mode: TriggerMode::FallingEdge,
            variable: variable.into(),
            threshold,
        }
    }

    /// Whether the trigger gates the start of a run
    pub fn is_enabled(&self) -> bool {
        self.mode != TriggerMode::Manual
    }

    /// Check if a value transition crosses the threshold
    pub fn crosses(&self, previous: f64, current: f64) -> bool {
        match self.mode {
            TriggerMode::Manual => false,
            TriggerMode::RisingEdge => previous < self.threshold && current >= self.threshold,
            TriggerMode::FallingEdge => previous > self.threshold && current <= self.threshold,
        }
    }
}

/// Acquisition mode of a variable group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionMode {
    /// Continuous sampling; triggers apply
    #[default]
    Direct,
    /// Target-side buffered sampling; triggers are handled by the target
    Snapshot,
}

/// Operation computed by a statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatisticKind {
    Min,
    Max,
    Mean,
    Std,
}

impl std::fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatisticKind::Min => write!(f, "min"),
            StatisticKind::Max => write!(f, "max"),
            StatisticKind::Mean => write!(f, "mean"),
            StatisticKind::Std => write!(f, "std"),
        }
    }
}

/// Which values are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogMode {
    /// Logging disabled
    #[default]
    No,
    /// Every value is written
    Full,
    /// Only values that differ from the last logged one
    Changes,
}

impl LogMode {
    pub fn is_enabled(&self) -> bool {
        *self != LogMode::No
    }
}

/// File format of the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON array of per-output records
    #[default]
    Stcm,
    /// Long CSV: one row per (group, variable, time, value)
    Csv,
    /// Wide CSV: one row per sample time, one column per variable
    Csvc,
}

impl LogFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            LogFormat::Stcm => "stcm",
            LogFormat::Csv | LogFormat::Csvc => "csv",
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogFormat::Stcm => write!(f, "stcm"),
            LogFormat::Csv => write!(f, "csv"),
            LogFormat::Csvc => write!(f, "csvc"),
        }
    }
}

/// Separator convention of CSV files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecimalStyle {
    /// Derive from the process locale when the session starts
    #[default]
    Auto,
    /// `.` decimal separator, `,` field delimiter
    Point,
    /// `,` decimal separator, `;` field delimiter
    Comma,
}

/// Language codes whose locales render `1.2` as `1,2`
const COMMA_DECIMAL_LANGUAGES: &[&str] = &[
    "bg", "ca", "cs", "da", "de", "el", "es", "et", "fi", "fr", "hr", "hu", "id", "is", "it",
    "lt", "lv", "nb", "nl", "nn", "no", "pl", "pt", "ro", "ru", "sk", "sl", "sr", "sv", "tr",
    "uk", "vi",
];

impl DecimalStyle {
    /// Resolve `Auto` against the environment's numeric locale
    pub fn resolve(self) -> DecimalStyle {
        match self {
            DecimalStyle::Auto => {
                let locale = ["LC_ALL", "LC_NUMERIC", "LANG"]
                    .iter()
                    .filter_map(|key| std::env::var(key).ok())
                    .find(|value| !value.is_empty());
                Self::from_locale(locale.as_deref().unwrap_or("C"))
            }
            other => other,
        }
    }

    /// Style used by a POSIX locale name such as `de_DE.UTF-8`
    pub fn from_locale(locale: &str) -> DecimalStyle {
        let language = locale
            .split(['_', '.', '@', '-'])
            .next()
            .unwrap_or("")
            .to_ascii_lowercase();
        if COMMA_DECIMAL_LANGUAGES.contains(&language.as_str()) {
            DecimalStyle::Comma
        } else {
            DecimalStyle::Point
        }
    }

    /// Field delimiter
    pub fn delimiter(&self) -> char {
        match self.resolve() {
            DecimalStyle::Comma => ';',
            _ => ',',
        }
    }

    /// Decimal separator
    pub fn decimal_separator(&self) -> char {
        match self.resolve() {
            DecimalStyle::Comma => ',',
            _ => '.',
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rising_edge() {
        let trigger = TriggerSettings::rising("speed", 10.0);
        assert!(trigger.crosses(8.0, 12.0));
        assert!(trigger.crosses(9.9, 10.0));
        assert!(!trigger.crosses(10.0, 12.0));
        assert!(!trigger.crosses(12.0, 8.0));
    }

    #[test]
    fn test_falling_edge() {
        let trigger = TriggerSettings::falling("speed", 10.0);
        assert!(trigger.crosses(12.0, 8.0));
        assert!(trigger.crosses(10.1, 10.0));
        assert!(!trigger.crosses(10.0, 8.0));
        assert!(!trigger.crosses(8.0, 12.0));
    }

    #[test]
    fn test_manual_never_crosses() {
        let trigger = TriggerSettings::default();
        assert!(!trigger.is_enabled());
        assert!(!trigger.crosses(0.0, 100.0));
    }

    #[test]
    fn test_decimal_style_from_locale() {
        assert_eq!(DecimalStyle::from_locale("de_DE.UTF-8"), DecimalStyle::Comma);
        assert_eq!(DecimalStyle::from_locale("fr_FR"), DecimalStyle::Comma);
        assert_eq!(DecimalStyle::from_locale("en_US.UTF-8"), DecimalStyle::Point);
        assert_eq!(DecimalStyle::from_locale("C"), DecimalStyle::Point);
        assert_eq!(DecimalStyle::Comma.delimiter(), ';');
        assert_eq!(DecimalStyle::Comma.decimal_separator(), ',');
        assert_eq!(DecimalStyle::Point.delimiter(), ',');
    }

    #[test]
    fn test_serde_names() {
        let mode: TriggerMode = serde_json::from_str("\"rising-edge\"").unwrap();
        assert_eq!(mode, TriggerMode::RisingEdge);
        let format: LogFormat = serde_json::from_str("\"csvc\"").unwrap();
        assert_eq!(format, LogFormat::Csvc);
        assert_eq!(format.extension(), "csv");
        let mode: LogMode = serde_json::from_str("\"changes\"").unwrap();
        assert!(mode.is_enabled());
    }
}
