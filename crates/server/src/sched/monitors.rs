//! Site monitor pass, one per tick.

use chrono::Local;

use cf_domain::TIME_FORMAT;
use cf_monitor::FailureCounter;
use cf_notify::NotifyParams;
use cf_store::MonitorRow;

use crate::state::AppState;

const DEFAULT_REPEAT_SEND_GAP: i64 = 10;

/// Probe every active monitor whose cycle has elapsed; the pass waits
/// for its probes so a monitor is touched by at most one task per tick.
pub async fn tick(state: &AppState) {
    let monitors = match state.store.all_monitors() {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(error = %e, "monitor pass could not list monitors");
            return;
        }
    };

    let mut join = tokio::task::JoinSet::new();
    for monitor in monitors {
        if monitor.active != 1 || !cycle_elapsed(&monitor) {
            continue;
        }
        let state = state.clone();
        join.spawn(async move {
            process_monitor(&state, monitor).await;
        });
    }
    while join.join_next().await.is_some() {}
}

fn cycle_elapsed(monitor: &MonitorRow) -> bool {
    let Some(last_time) = monitor.last_time.as_deref() else {
        return true;
    };
    let Ok(last) = chrono::NaiveDateTime::parse_from_str(last_time, TIME_FORMAT) else {
        return false;
    };
    let Some(last) = chrono::TimeZone::from_local_datetime(&Local, &last).single() else {
        return false;
    };
    let elapsed_minutes = (Local::now() - last).num_minutes();
    elapsed_minutes >= monitor.cycle.max(0)
}

async fn process_monitor(state: &AppState, monitor: MonitorRow) {
    let counter = FailureCounter::new(state.config.monitor_counter_dir());
    let id = monitor.id.to_string();

    match cf_monitor::refresh_monitor(&state.store, &monitor).await {
        Ok(()) => counter.clear(&id),
        Err(probe_err) => {
            let count = match counter.increment(&id) {
                Ok(count) => count,
                Err(e) => {
                    tracing::warn!(monitor_id = monitor.id, error = %e, "failure counter write failed");
                    return;
                }
            };
            let gap = if monitor.repeat_send_gap > 0 {
                monitor.repeat_send_gap
            } else {
                DEFAULT_REPEAT_SEND_GAP
            };
            tracing::debug!(
                monitor_id = monitor.id,
                site = %monitor.site_domain,
                count,
                gap,
                error = %probe_err,
                "monitor probe failed"
            );
            if count >= gap {
                send_alert(state, &monitor).await;
                counter.clear(&id);
            }
        }
    }
}

/// One notification per threshold crossing, through the first stored
/// channel of the monitor's report type.
async fn send_alert(state: &AppState, monitor: &MonitorRow) {
    let Some(report_type) = monitor.report_type.as_deref().filter(|t| !t.is_empty()) else {
        return;
    };
    let channel = match state.store.first_report_of_kind(report_type) {
        Ok(Some(row)) => row,
        Ok(None) => {
            tracing::warn!(report_type, "monitor alert has no configured channel");
            return;
        }
        Err(e) => {
            tracing::warn!(error = %e, "monitor alert channel lookup failed");
            return;
        }
    };
    let params = NotifyParams {
        provider: report_type.to_string(),
        provider_id: channel.id.to_string(),
        subject: "certfleet site monitor alert".into(),
        body: format!(
            "site {} is failing its TLS checks, please investigate.\nchecked at: {}",
            monitor.site_domain,
            Local::now().format(TIME_FORMAT)
        ),
        extra: serde_json::Map::new(),
    };
    if let Err(e) = cf_notify::notify(&state.store, &params).await {
        tracing::warn!(monitor_id = monitor.id, error = %e, "monitor alert delivery failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor(last_time: Option<&str>, cycle: i64) -> MonitorRow {
        MonitorRow {
            id: 1,
            name: "m".into(),
            site_domain: "example.com".into(),
            report_type: Some("mail".into()),
            cycle,
            repeat_send_gap: 3,
            state: None,
            ca: None,
            cert_domain: None,
            end_time: None,
            end_day: None,
            last_time: last_time.map(|s| s.to_string()),
            except_end_time: None,
            active: 1,
            create_time: None,
            update_time: None,
        }
    }

    #[test]
    fn cycle_elapsed_uses_minutes_since_last_probe() {
        let old = (Local::now() - chrono::Duration::minutes(5)).format(TIME_FORMAT).to_string();
        assert!(cycle_elapsed(&monitor(Some(&old), 5)));
        assert!(!cycle_elapsed(&monitor(Some(&old), 6)));

        assert!(cycle_elapsed(&monitor(None, 60)), "never probed means due now");
        assert!(!cycle_elapsed(&monitor(Some("garbage"), 1)), "unparseable last_time stays idle");
    }
}
