//! JSON observer for run reports.
//!
//! ```rust,ignore
//! use contese::observers::json::JsonObserver;
//!
//! let json = JsonObserver::new().pretty(true).to_json(&reports)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::report::RunReport;

/// A serialized batch of reports with an optional capture time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportSnapshot {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timestamp_ms: Option<u64>,
    pub runs: Vec<RunReport>,
}

/// Serializes run reports to JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonObserver {
    pretty: bool,
    include_timestamp: bool,
}

impl JsonObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty(mut self, enabled: bool) -> Self {
        self.pretty = enabled;
        self
    }

    /// Adds the current Unix time in milliseconds to the output.
    pub fn include_timestamp(mut self, enabled: bool) -> Self {
        self.include_timestamp = enabled;
        self
    }

    pub fn collect<'a>(&self, reports: impl IntoIterator<Item = &'a RunReport>) -> ReportSnapshot {
        ReportSnapshot {
            timestamp_ms: self.include_timestamp.then(current_timestamp_ms),
            runs: reports.into_iter().cloned().collect(),
        }
    }

    pub fn to_json<'a>(
        &self,
        reports: impl IntoIterator<Item = &'a RunReport>,
    ) -> Result<String, serde_json::Error> {
        let snapshot = self.collect(reports);
        if self.pretty {
            serde_json::to_string_pretty(&snapshot)
        } else {
            serde_json::to_string(&snapshot)
        }
    }
}

fn current_timestamp_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_to_json_without_timestamp() {
        let reports = vec![RunReport::new("locked", Duration::from_millis(5), 10, 100)];
        let json = JsonObserver::new().to_json(&reports).unwrap();
        assert!(!json.contains("timestamp_ms"));
        assert!(json.contains("\"name\":\"locked\""));
        assert!(json.contains("\"total\":100"));
    }

    #[test]
    fn test_parse_back() {
        let reports = vec![RunReport::new(
            "check-then-act",
            Duration::from_millis(1),
            1100,
            1100,
        )];
        let json = JsonObserver::new()
            .include_timestamp(true)
            .to_json(&reports)
            .unwrap();
        let snapshot: ReportSnapshot = serde_json::from_str(&json).unwrap();
        assert!(snapshot.timestamp_ms.is_some());
        assert_eq!(snapshot.runs, reports);
    }

    #[test]
    fn test_pretty() {
        let reports: Vec<RunReport> = Vec::new();
        let json = JsonObserver::new().pretty(true).to_json(&reports).unwrap();
        assert!(json.contains('\n'));
    }
}
