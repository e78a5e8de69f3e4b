//! Site monitoring: TLS probes of live endpoints and the per-monitor
//! failure counter that drives alert thresholds.

pub mod counter;
pub mod probe;

pub use counter::FailureCounter;
pub use probe::{check_site, split_host_port, SiteProbe};

use cf_domain::error::{Error, Result};
use cf_domain::TIME_FORMAT;
use cf_store::{MonitorProbeUpdate, MonitorRow, Store};

/// Probe one monitor's target and cache the results onto its row.
/// Returns an error when the probe failed or the certificate is not
/// currently valid; the caller feeds that into the failure counter.
pub async fn refresh_monitor(store: &Store, monitor: &MonitorRow) -> Result<()> {
    let id = monitor.id.to_string();
    match check_site(&monitor.site_domain).await {
        Ok(probe) => {
            let healthy = probe.http_status != 0 && probe.cert_ok;
            let update = MonitorProbeUpdate {
                state: probe.state.clone(),
                ca: probe.issuer.clone(),
                cert_domain: probe.domains.join(","),
                end_time: probe.not_after.clone(),
                end_day: probe.days_remaining,
                failed_at: if healthy {
                    None
                } else {
                    Some(chrono::Local::now().format(TIME_FORMAT).to_string())
                },
            };
            store.record_monitor_probe(&id, &update)?;
            if healthy {
                Ok(())
            } else {
                Err(Error::Other(format!(
                    "certificate unhealthy for {}: {}",
                    monitor.site_domain, probe.cert_note
                )))
            }
        }
        Err(e) => {
            let update = MonitorProbeUpdate {
                state: "异常".into(),
                failed_at: Some(chrono::Local::now().format(TIME_FORMAT).to_string()),
                ..Default::default()
            };
            store.record_monitor_probe(&id, &update)?;
            Err(e)
        }
    }
}
