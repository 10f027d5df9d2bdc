use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Recency windows the dashboard can ask history for.
///
/// Deserializing goes through [`RetentionWindow::parse`], so unknown strings
/// become the one hour window instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum RetentionWindow {
    #[default]
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    OneDay,
    #[serde(rename = "7d")]
    SevenDays,
}

impl RetentionWindow {
    /// Parses `1h`, `6h`, `24h` or `7d`. Anything else is the one hour window.
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "6h" => RetentionWindow::SixHours,
            "24h" => RetentionWindow::OneDay,
            "7d" => RetentionWindow::SevenDays,
            _ => RetentionWindow::OneHour,
        }
    }

    pub fn duration(self) -> Duration {
        match self {
            RetentionWindow::OneHour => Duration::hours(1),
            RetentionWindow::SixHours => Duration::hours(6),
            RetentionWindow::OneDay => Duration::hours(24),
            RetentionWindow::SevenDays => Duration::days(7),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RetentionWindow::OneHour => "1h",
            RetentionWindow::SixHours => "6h",
            RetentionWindow::OneDay => "24h",
            RetentionWindow::SevenDays => "7d",
        }
    }
}

impl From<&str> for RetentionWindow {
    fn from(value: &str) -> Self {
        RetentionWindow::parse(value)
    }
}

impl From<String> for RetentionWindow {
    fn from(value: String) -> Self {
        RetentionWindow::parse(&value)
    }
}
