use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::Status;

/// A target after it has been synced with storage and given an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub name: String,
    pub method: String,
    pub url: String,
    pub follow: bool,
}

/// Alert payload sent from a worker to the alert sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub status: Status,
}

impl Message {
    pub fn transition(status: Status, monitor: &Monitor, reason: &str) -> Self {
        Self {
            text: format!("{}: {}\n{} - {}", status, monitor.name, monitor.url, reason),
            status,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: i64,
    pub checked_at: DateTime<Utc>,
    pub status: String,
    pub reason: String,
    #[serde(skip)]
    pub monitor_id: i64,
}

impl CheckResult {
    /// Not yet stored; the id is assigned on insert.
    pub fn new(monitor_id: i64, status: Status, reason: impl Into<String>) -> Self {
        Self {
            id: 0,
            checked_at: Utc::now(),
            status: status.to_string(),
            reason: reason.into(),
            monitor_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_message_text() {
        let monitor = Monitor {
            id: 1,
            name: "api".into(),
            method: "GET".into(),
            url: "http://example.com/health".into(),
            follow: false,
        };
        let msg = Message::transition(Status::Alert, &monitor, "500 Internal Server Error");
        assert_eq!(msg.text, "Alert: api\nhttp://example.com/health - 500 Internal Server Error");
        assert_eq!(msg.status, Status::Alert);
    }

    #[test]
    fn result_json_hides_monitor_id() {
        let result = CheckResult::new(7, Status::Ok, "200 OK");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "OK");
        assert_eq!(json["reason"], "200 OK");
        assert!(json.get("monitor_id").is_none());
    }
}
