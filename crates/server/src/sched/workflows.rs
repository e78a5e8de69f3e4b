//! Workflow trigger evaluation, one pass per tick.

use chrono::{DateTime, Local};

use cf_domain::workflow::ExecTime;
use cf_store::WorkflowRow;

use crate::runs;
use crate::state::AppState;

/// Evaluate every workflow's trigger and launch the eligible ones. The
/// pass waits for the runs it launched, like the monitor pass does for
/// its probes.
pub async fn tick(state: &AppState) {
    let workflows = match state.store.all_workflows() {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "scheduler could not list workflows");
            return;
        }
    };
    let now = Local::now();

    let mut launched = Vec::new();
    for workflow in &workflows {
        if !eligible(workflow, &now) {
            continue;
        }
        match runs::start_run(state, &workflow.id.to_string(), "auto") {
            Ok((run_id, handle)) => {
                tracing::info!(workflow_id = workflow.id, run_id = %run_id, "scheduled run started");
                launched.push(handle);
            }
            Err(e) => {
                tracing::warn!(workflow_id = workflow.id, error = %e, "scheduled run did not start");
            }
        }
    }
    for handle in launched {
        let _ = handle.await;
    }
}

/// Trigger filter: auto + active + not running + not already
/// fired this minute + trigger match.
pub fn eligible(workflow: &WorkflowRow, now: &DateTime<Local>) -> bool {
    if workflow.exec_type != "auto" || workflow.active == 0 {
        return false;
    }
    if workflow.last_run_status.as_deref() == Some("running") {
        return false;
    }
    // Minute-grained dedup: a workflow fires at most once per wall-clock
    // minute.
    if let Some(last_run) = workflow.last_run_time.as_deref() {
        let current_minute = now.format("%Y-%m-%d %H:%M").to_string();
        if last_run.len() >= 16 && last_run[..16] == current_minute {
            return false;
        }
    }
    let Some(raw) = workflow.exec_time.as_deref() else {
        return false;
    };
    match ExecTime::parse(raw) {
        Ok(trigger) => trigger.matches(now),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row() -> WorkflowRow {
        WorkflowRow {
            id: 1,
            name: "renew".into(),
            content: "{}".into(),
            exec_type: "auto".into(),
            active: 1,
            exec_time: Some(r#"{"type":"day","hour":9,"minute":30}"#.into()),
            last_run_time: None,
            last_run_status: None,
            create_time: None,
            update_time: None,
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 15, h, m, 5).unwrap()
    }

    #[test]
    fn fires_only_in_the_matching_minute() {
        assert!(eligible(&row(), &at(9, 30)));
        assert!(!eligible(&row(), &at(9, 31)));
        assert!(!eligible(&row(), &at(10, 30)));
    }

    #[test]
    fn manual_inactive_and_running_are_filtered() {
        let mut manual = row();
        manual.exec_type = "manual".into();
        assert!(!eligible(&manual, &at(9, 30)));

        let mut inactive = row();
        inactive.active = 0;
        assert!(!eligible(&inactive, &at(9, 30)));

        let mut running = row();
        running.last_run_status = Some("running".into());
        assert!(!eligible(&running, &at(9, 30)));
    }

    #[test]
    fn same_minute_dedup_blocks_a_second_fire() {
        let mut fired = row();
        fired.last_run_time = Some("2024-06-15 09:30:02".into());
        assert!(!eligible(&fired, &at(9, 30)), "already fired this minute");

        fired.last_run_time = Some("2024-06-14 09:30:02".into());
        assert!(eligible(&fired, &at(9, 30)), "yesterday's fire does not block today");
    }

    #[test]
    fn missing_or_invalid_trigger_never_fires() {
        let mut no_trigger = row();
        no_trigger.exec_time = None;
        assert!(!eligible(&no_trigger, &at(9, 30)));

        let mut garbage = row();
        garbage.exec_time = Some("not json".into());
        assert!(!eligible(&garbage, &at(9, 30)));
    }

    #[test]
    fn week_and_month_triggers_respect_their_fields() {
        // 2024-06-15 is a Saturday (weekday 6).
        let mut weekly = row();
        weekly.exec_time = Some(r#"{"type":"week","week":6,"hour":9,"minute":30}"#.into());
        assert!(eligible(&weekly, &at(9, 30)));
        weekly.exec_time = Some(r#"{"type":"week","week":0,"hour":9,"minute":30}"#.into());
        assert!(!eligible(&weekly, &at(9, 30)));

        let mut monthly = row();
        monthly.exec_time = Some(r#"{"type":"month","month":15,"hour":9,"minute":30}"#.into());
        assert!(eligible(&monthly, &at(9, 30)));
        monthly.exec_time = Some(r#"{"type":"month","month":1,"hour":9,"minute":30}"#.into());
        assert!(!eligible(&monthly, &at(9, 30)));
    }
}
