//! Closed Trade Outcomes
//!
//! The inbound event: one record per closed trade, carrying the realized
//! return, timing, and one or more independent action contexts (e.g. the
//! entry decision and the exit decision, each owned by a different module).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::DimensionMap;
use super::payback::{days_between, PaybackWindow};

/// Decision context of one action taken during the trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionContext {
    /// Owning module, e.g. "dm" or "pm"
    pub module: String,
    /// Optional label for logs ("entry", "exit", "trim")
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub dimensions: DimensionMap,
}

impl ActionContext {
    pub fn new(module: &str, dimensions: DimensionMap) -> Self {
        Self {
            module: module.to_string(),
            label: None,
            dimensions,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn describe(&self) -> String {
        match &self.label {
            Some(label) => format!("{}:{}", self.module, label),
            None => self.module.clone(),
        }
    }
}

/// Closed trade as delivered by the outcome stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade_id: String,
    pub instrument: String,
    #[serde(default)]
    pub venue: Option<String>,
    #[serde(default)]
    pub timeframe: Option<String>,
    #[serde(default)]
    pub outcome_class: Option<String>,
    #[serde(default)]
    pub hold_time_class: Option<String>,
    /// Realized return in units of risk
    pub rr: f64,
    #[serde(default)]
    pub hold_time_days: Option<f64>,
    #[serde(default)]
    pub entry_price: Option<f64>,
    #[serde(default)]
    pub exit_price: Option<f64>,
    #[serde(default)]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_time: Option<DateTime<Utc>>,
    /// How much better the entry could have been, in R
    #[serde(default)]
    pub missed_rr_entry: Option<f64>,
    /// How much better the exit could have been, in R
    #[serde(default)]
    pub missed_rr_exit: Option<f64>,
    /// Pre-computed by the producer; skips the price-history query
    #[serde(default)]
    pub time_to_payback_days: Option<f64>,
    #[serde(default)]
    pub actions: Vec<ActionContext>,
}

impl ClosedTrade {
    /// Outcome class if present and non-blank
    pub fn outcome_class(&self) -> Option<&str> {
        self.outcome_class
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Realized return; non-finite values coerce to 0.0
    pub fn realized_rr(&self) -> f64 {
        if self.rr.is_finite() {
            self.rr
        } else {
            0.0
        }
    }

    pub fn is_win(&self) -> bool {
        self.realized_rr() > 0.0
    }

    /// Hold time in days: the supplied value if usable, else derived from
    /// the entry/exit timestamps, else 0.0
    pub fn resolved_hold_time_days(&self) -> f64 {
        if let Some(days) = self.hold_time_days.filter(|d| d.is_finite() && *d >= 0.0) {
            return days;
        }
        match (self.entry_time, self.exit_time) {
            (Some(entry), Some(exit)) => days_between(entry, exit),
            _ => 0.0,
        }
    }

    /// Pre-computed payback if it is a usable number
    pub fn supplied_payback_days(&self) -> Option<f64> {
        self.time_to_payback_days
            .filter(|d| d.is_finite())
            .map(|d| d.max(0.0))
    }

    pub fn payback_window(&self) -> PaybackWindow {
        PaybackWindow {
            entry_price: self.entry_price,
            entry_time: self.entry_time,
            exit_time: self.exit_time,
            hold_time_days: self.resolved_hold_time_days(),
        }
    }

    /// Instant the outcome became known; drives recurrence decay
    pub fn observed_at(&self) -> DateTime<Utc> {
        self.exit_time.unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn trade() -> ClosedTrade {
        serde_json::from_str(
            r#"{
                "trade_id": "t-1",
                "instrument": "SOL",
                "outcome_class": "win",
                "rr": 1.5,
                "actions": [{"module": "pm", "dimensions": {"state": "S1"}}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_deserialize_minimal() {
        let t = trade();
        assert_eq!(t.trade_id, "t-1");
        assert_eq!(t.outcome_class(), Some("win"));
        assert_eq!(t.actions.len(), 1);
        assert_eq!(t.actions[0].describe(), "pm");
        assert!(t.entry_time.is_none());
    }

    #[test]
    fn test_blank_outcome_is_missing() {
        let mut t = trade();
        t.outcome_class = Some("   ".to_string());
        assert_eq!(t.outcome_class(), None);
    }

    #[test]
    fn test_realized_rr_coercion() {
        let mut t = trade();
        t.rr = f64::NAN;
        assert_eq!(t.realized_rr(), 0.0);
        assert!(!t.is_win());

        t.rr = -0.4;
        assert!(!t.is_win());
    }

    #[test]
    fn test_hold_time_resolution() {
        let mut t = trade();
        assert_eq!(t.resolved_hold_time_days(), 0.0);

        let entry = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        t.entry_time = Some(entry);
        t.exit_time = Some(entry + Duration::hours(60));
        assert_eq!(t.resolved_hold_time_days(), 2.5);

        t.hold_time_days = Some(-1.0);
        assert_eq!(t.resolved_hold_time_days(), 2.5);

        t.hold_time_days = Some(3.0);
        assert_eq!(t.resolved_hold_time_days(), 3.0);
    }

    #[test]
    fn test_supplied_payback() {
        let mut t = trade();
        assert_eq!(t.supplied_payback_days(), None);

        t.time_to_payback_days = Some(-2.0);
        assert_eq!(t.supplied_payback_days(), Some(0.0));

        t.time_to_payback_days = Some(f64::NAN);
        assert_eq!(t.supplied_payback_days(), None);
    }

    #[test]
    fn test_action_label() {
        let action = ActionContext::new("dm", DimensionMap::new()).with_label("entry");
        assert_eq!(action.describe(), "dm:entry");
    }
}
