//! The workflow node tree and its trigger model.
//!
//! A workflow's `content` column stores the root [`WorkflowNode`] as JSON.
//! Field names follow the wire format the editor produces (`childNode`,
//! `conditionNodes`, `fromNodeId`), so the serialized form round-trips
//! unchanged.

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Node tree
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Well-known node kinds. Unknown kinds are preserved and executed as
/// no-ops so newer graphs stay loadable.
pub mod kind {
    pub const APPLY: &str = "apply";
    pub const UPLOAD: &str = "upload";
    pub const DEPLOY: &str = "deploy";
    pub const NOTIFY: &str = "notify";
    pub const BRANCH: &str = "branch";
    pub const EXECUTE_RESULT_BRANCH: &str = "execute_result_branch";
}

/// One vertex of a workflow tree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub inputs: Vec<NodeInput>,
    #[serde(rename = "childNode", default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<WorkflowNode>>,
    #[serde(rename = "conditionNodes", default, skip_serializing_if = "Vec::is_empty")]
    pub condition_nodes: Vec<WorkflowNode>,
}

/// A declared dataflow edge from an upstream node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeInput {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "fromNodeId", default)]
    pub from_node_id: String,
}

impl WorkflowNode {
    /// Parse a workflow `content` document.
    pub fn from_content(content: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(content)?)
    }
}

/// Terminal status of one executed node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Fail,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Success => "success",
            NodeStatus::Fail => "fail",
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trigger
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Structured trigger stored in the workflow's `exec_time` column.
///
/// `week` uses Sunday = 0. `month` is the day-of-month (1-31).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecTime {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub month: u32,
    #[serde(default)]
    pub week: u32,
    pub hour: u32,
    pub minute: u32,
}

impl ExecTime {
    pub fn parse(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Whether the trigger fires at the given wall-clock instant.
    pub fn matches(&self, now: &DateTime<Local>) -> bool {
        if self.hour != now.hour() || self.minute != now.minute() {
            return false;
        }
        match self.kind.as_str() {
            "day" => true,
            "week" => self.week == now.weekday().num_days_from_sunday(),
            "month" => self.month == now.day(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn node_tree_round_trips() {
        let raw = r#"{
            "id": "apply-1",
            "type": "apply",
            "name": "issue",
            "config": {"domains": "a.example", "email": "op@example.com"},
            "inputs": [],
            "childNode": {
                "id": "deploy-1",
                "type": "deploy",
                "config": {"provider": "ssh"},
                "inputs": [{"name": "certificate", "fromNodeId": "apply-1"}]
            }
        }"#;
        let node = WorkflowNode::from_content(raw).unwrap();
        assert_eq!(node.kind, kind::APPLY);
        let child = node.child.as_ref().expect("childNode parsed");
        assert_eq!(child.inputs[0].from_node_id, "apply-1");

        let reencoded = serde_json::to_string(&node).unwrap();
        let reparsed = WorkflowNode::from_content(&reencoded).unwrap();
        assert_eq!(node, reparsed, "serialized form must round-trip");
    }

    #[test]
    fn unknown_kind_is_preserved() {
        let node =
            WorkflowNode::from_content(r#"{"id": "x", "type": "shiny_new_thing"}"#).unwrap();
        assert_eq!(node.kind, "shiny_new_thing");
    }

    #[test]
    fn exec_time_day_matches_hour_minute() {
        let et = ExecTime::parse(r#"{"type":"day","hour":9,"minute":30}"#).unwrap();
        assert!(et.matches(&local(2024, 6, 15, 9, 30)));
        assert!(!et.matches(&local(2024, 6, 15, 9, 31)));
        assert!(!et.matches(&local(2024, 6, 15, 10, 30)));
    }

    #[test]
    fn exec_time_week_uses_sunday_zero() {
        // 2024-06-16 is a Sunday.
        let et = ExecTime::parse(r#"{"type":"week","week":0,"hour":8,"minute":0}"#).unwrap();
        assert!(et.matches(&local(2024, 6, 16, 8, 0)));
        assert!(!et.matches(&local(2024, 6, 17, 8, 0)), "Monday must not match week=0");
    }

    #[test]
    fn exec_time_month_matches_day_of_month() {
        let et = ExecTime::parse(r#"{"type":"month","month":15,"hour":0,"minute":5}"#).unwrap();
        assert!(et.matches(&local(2024, 6, 15, 0, 5)));
        assert!(!et.matches(&local(2024, 6, 14, 0, 5)));
    }

    #[test]
    fn exec_time_unknown_type_never_fires() {
        let et = ExecTime::parse(r#"{"type":"hourly","hour":1,"minute":2}"#).unwrap();
        assert!(!et.matches(&local(2024, 6, 15, 1, 2)));
    }
}
