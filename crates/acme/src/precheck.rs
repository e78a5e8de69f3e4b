//! DNS propagation pre-check.
//!
//! Before telling the CA a challenge is ready, the published TXT record
//! is confirmed through a recursive resolver. Three modes:
//!
//! - skip: accept without any resolution.
//! - default: poll until the record appears or `max_wait` elapses.
//! - ignore: as default, but once `max_wait` has elapsed the check
//!   force-succeeds regardless of resolver result or error.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use hickory_resolver::config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::{RData, RecordType};
use hickory_resolver::TokioAsyncResolver;

use cf_domain::error::{Error, Result};
use cf_domain::RunLogger;

pub const DEFAULT_NAME_SERVERS: &[&str] = &["8.8.8.8:53", "1.1.1.1:53"];
const POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_CNAME_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrecheckMode {
    Skip,
    Default,
    Ignore,
}

#[derive(Debug, Clone)]
pub struct Precheck {
    pub mode: PrecheckMode,
    pub name_servers: Vec<String>,
    pub max_wait: Duration,
    pub follow_cname: bool,
}

impl Precheck {
    /// Wait until the TXT record at `fqdn` carries `expected`.
    pub async fn wait_for_txt(&self, fqdn: &str, expected: &str, log: &dyn RunLogger) -> Result<()> {
        if self.mode == PrecheckMode::Skip {
            log.debug(&format!("propagation check skipped for {fqdn}"));
            return Ok(());
        }
        let resolver = build_resolver(&self.name_servers)?;
        let fqdn = fqdn.to_string();
        let expected = expected.to_string();
        let follow_cname = self.follow_cname;
        run_precheck(
            self.mode,
            self.max_wait,
            POLL_INTERVAL,
            move || {
                let resolver = resolver.clone();
                let fqdn = fqdn.clone();
                let expected = expected.clone();
                async move { query_txt(&resolver, &fqdn, &expected, follow_cname).await }
            },
            log,
        )
        .await
    }
}

/// Mode/timeout state machine, separated from actual DNS so it can be
/// exercised with a stub check.
pub(crate) async fn run_precheck<F, Fut>(
    mode: PrecheckMode,
    max_wait: Duration,
    interval: Duration,
    mut check: F,
    log: &dyn RunLogger,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let started = tokio::time::Instant::now();
    loop {
        let elapsed = started.elapsed();
        match check().await {
            Ok(true) => {
                log.debug("TXT record is present");
                return Ok(());
            }
            Ok(false) => {
                if elapsed >= max_wait {
                    if mode == PrecheckMode::Ignore {
                        log.info(&format!(
                            "TXT record not found after {elapsed:?}, continuing anyway"
                        ));
                        return Ok(());
                    }
                    return Err(Error::Timeout(format!(
                        "TXT record did not propagate within {max_wait:?}"
                    )));
                }
                log.debug(&format!("TXT record not yet visible, waiting ({elapsed:?} elapsed)"));
            }
            Err(e) => {
                if elapsed >= max_wait {
                    if mode == PrecheckMode::Ignore {
                        log.info(&format!("propagation check error after timeout, continuing: {e}"));
                        return Ok(());
                    }
                    return Err(e);
                }
                log.debug(&format!("propagation check error, retrying: {e}"));
            }
        }
        tokio::time::sleep(interval).await;
    }
}

fn build_resolver(name_servers: &[String]) -> Result<TokioAsyncResolver> {
    let mut config = ResolverConfig::new();
    for entry in name_servers {
        let addr: SocketAddr = entry
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid name server: {entry}")))?;
        config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
    }
    if name_servers.is_empty() {
        for entry in DEFAULT_NAME_SERVERS {
            let addr: SocketAddr = entry.parse().expect("default name servers parse");
            config.add_name_server(NameServerConfig::new(addr, Protocol::Udp));
        }
    }
    let mut opts = ResolverOpts::default();
    opts.attempts = 2;
    Ok(TokioAsyncResolver::tokio(config, opts))
}

async fn query_txt(
    resolver: &TokioAsyncResolver,
    fqdn: &str,
    expected: &str,
    follow_cname: bool,
) -> Result<bool> {
    let mut name = fqdn.to_string();
    if follow_cname {
        for _ in 0..MAX_CNAME_DEPTH {
            match resolver.lookup(name.clone(), RecordType::CNAME).await {
                Ok(lookup) => {
                    let mut target = None;
                    for record in lookup.record_iter() {
                        if let Some(RData::CNAME(cname)) = record.data() {
                            target = Some(cname.0.to_utf8());
                            break;
                        }
                    }
                    match target {
                        Some(t) if t != name => name = t,
                        _ => break,
                    }
                }
                Err(_) => break,
            }
        }
    }
    match resolver.txt_lookup(name).await {
        Ok(lookup) => {
            for txt in lookup.iter() {
                let joined: String = txt
                    .txt_data()
                    .iter()
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect();
                if joined == expected {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Err(e)
            if matches!(
                e.kind(),
                hickory_resolver::error::ResolveErrorKind::NoRecordsFound { .. }
            ) =>
        {
            Ok(false)
        }
        Err(e) => Err(Error::Dns(e.to_string())),
    }
}

/// The challenge label for a domain; wildcards share their base domain's
/// record.
pub fn challenge_fqdn(domain: &str) -> String {
    format!("_acme-challenge.{}.", domain.trim_start_matches("*."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cf_domain::NoopLogger;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn challenge_label_strips_wildcard() {
        assert_eq!(challenge_fqdn("example.com"), "_acme-challenge.example.com.");
        assert_eq!(challenge_fqdn("*.example.com"), "_acme-challenge.example.com.");
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_answer_means_no_wait() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        run_precheck(
            PrecheckMode::Default,
            Duration::from_secs(120),
            Duration::from_secs(2),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
                async { Ok(true) }
            },
            &NoopLogger,
        )
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "one resolver call, zero sleeps");
    }

    #[tokio::test(start_paused = true)]
    async fn default_mode_times_out() {
        let err = run_precheck(
            PrecheckMode::Default,
            Duration::from_secs(10),
            Duration::from_secs(2),
            || async { Ok(false) },
            &NoopLogger,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "got: {err}");
    }

    #[tokio::test(start_paused = true)]
    async fn ignore_mode_forces_success_after_max_wait() {
        // Resolver that always errors: must still succeed once max_wait
        // has elapsed.
        run_precheck(
            PrecheckMode::Ignore,
            Duration::from_secs(10),
            Duration::from_secs(2),
            || async { Err(Error::Dns("refused".into())) },
            &NoopLogger,
        )
        .await
        .expect("ignore mode force-succeeds after timeout");
    }

    #[tokio::test(start_paused = true)]
    async fn ignore_mode_still_waits_before_the_deadline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        run_precheck(
            PrecheckMode::Ignore,
            Duration::from_secs(10),
            Duration::from_secs(2),
            move || {
                let n = c.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n >= 3) }
            },
            &NoopLogger,
        )
        .await
        .unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 4, "kept polling until the record appeared");
    }
}
