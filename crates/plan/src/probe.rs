//! Plan probe runner
//!
//! Reads a written plan file and polls its probes until every one of them
//! is healthy. A probe becomes healthy after `success_threshold` consecutive
//! successes and unhealthy again after `failure_threshold` consecutive
//! failures; thresholds of zero count as one.

use crate::error::ProbeError;
use crate::types::{Plan, Probe};
use reqwest::{Certificate, Client, Identity};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct ProbeState {
    healthy: bool,
    successes: u32,
    failures: u32,
}

impl ProbeState {
    fn record(&mut self, ok: bool, probe: &Probe) {
        if ok {
            self.successes += 1;
            self.failures = 0;
            if self.successes >= probe.success_threshold.max(1) {
                self.healthy = true;
            }
        } else {
            self.failures += 1;
            self.successes = 0;
            if self.failures >= probe.failure_threshold.max(1) {
                self.healthy = false;
            }
        }
    }
}

/// Polls the probes of a plan file on a fixed interval.
#[derive(Debug, Clone)]
pub struct ProbeRunner {
    interval: Duration,
}

impl ProbeRunner {
    /// Runner polling every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Runs until every probe in `plan_file` is healthy or `cancel` fires.
    ///
    /// Only an unreadable plan file or cancellation is an error. A probe whose
    /// TLS material cannot be loaded counts as failing for that poll.
    pub async fn run(&self, plan_file: &Path, cancel: &CancellationToken) -> Result<(), ProbeError> {
        let plan = read_plan(plan_file).await?;
        if plan.probes.is_empty() {
            info!("Plan {} defines no probes", plan_file.display());
            return Ok(());
        }

        // TLS material may not exist yet when polling starts; clients are
        // built on first use and kept once they build.
        let mut clients: BTreeMap<&str, Client> = BTreeMap::new();
        let started = Instant::now();
        let mut states: BTreeMap<&str, ProbeState> = BTreeMap::new();
        loop {
            for (name, probe) in &plan.probes {
                if started.elapsed() < Duration::from_secs(probe.initial_delay_seconds) {
                    continue;
                }
                let client = match clients.entry(name.as_str()) {
                    Entry::Occupied(entry) => Some(entry.into_mut()),
                    Entry::Vacant(entry) => match build_client(name, probe).await {
                        Ok(client) => Some(entry.insert(client)),
                        Err(e) => {
                            debug!("Probe {} is not ready: {}", name, e);
                            None
                        }
                    },
                };
                let ok = match client {
                    Some(client) => check(client, name, probe).await,
                    None => false,
                };
                states.entry(name.as_str()).or_default().record(ok, probe);
            }

            let unhealthy: Vec<&str> = plan
                .probes
                .keys()
                .map(String::as_str)
                .filter(|name| !states.get(name).is_some_and(|s| s.healthy))
                .collect();
            if unhealthy.is_empty() {
                info!("All probes are healthy: {:?}", plan.probes.keys().collect::<Vec<_>>());
                return Ok(());
            }
            info!("Waiting for probes to become healthy: {:?}", unhealthy);

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = cancel.cancelled() => return Err(ProbeError::Cancelled),
            }
        }
    }
}

/// Convenience wrapper around [`ProbeRunner::run`].
pub async fn run_probes(
    plan_file: &Path,
    interval: Duration,
    cancel: &CancellationToken,
) -> Result<(), ProbeError> {
    ProbeRunner::new(interval).run(plan_file, cancel).await
}

async fn read_plan(path: &Path) -> Result<Plan, ProbeError> {
    let data = tokio::fs::read(path).await.map_err(|source| ProbeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Plan::from_json(&data).map_err(|source| ProbeError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

async fn build_client(name: &str, probe: &Probe) -> Result<Client, ProbeError> {
    let action = &probe.http_get;
    let timeout = match probe.timeout_seconds {
        0 => DEFAULT_PROBE_TIMEOUT,
        secs => Duration::from_secs(secs),
    };
    let mut builder = Client::builder().timeout(timeout);

    if action.insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if !action.ca_cert.is_empty() {
        let pem = read_tls(name, &action.ca_cert).await?;
        let cert = Certificate::from_pem(&pem).map_err(|e| ProbeError::Tls {
            probe: name.to_string(),
            path: action.ca_cert.clone(),
            reason: e.to_string(),
        })?;
        builder = builder.add_root_certificate(cert);
    }

    if !action.client_cert.is_empty() && !action.client_key.is_empty() {
        let mut pem = read_tls(name, &action.client_cert).await?;
        pem.push(b'\n');
        pem.extend(read_tls(name, &action.client_key).await?);
        let identity = Identity::from_pem(&pem).map_err(|e| ProbeError::Tls {
            probe: name.to_string(),
            path: action.client_cert.clone(),
            reason: e.to_string(),
        })?;
        builder = builder.identity(identity);
    }

    Ok(builder.build()?)
}

async fn read_tls(name: &str, path: &str) -> Result<Vec<u8>, ProbeError> {
    tokio::fs::read(PathBuf::from(path))
        .await
        .map_err(|e| ProbeError::Tls {
            probe: name.to_string(),
            path: path.to_string(),
            reason: e.to_string(),
        })
}

async fn check(client: &Client, name: &str, probe: &Probe) -> bool {
    match client.get(&probe.http_get.url).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            debug!("Probe {} returned {}", name, response.status());
            false
        }
        Err(e) => {
            debug!("Probe {} failed: {}", name, e);
            false
        }
    }
}
