use crate::config::MaintenanceConfig;
use crate::error::NexusError;
use crate::google_oauth::credentials::StoredCredential;
use crate::google_oauth::{GoogleAuthManager, RefreshOutcome};

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr, RpcReplyPort};
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};

fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Counters of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub due: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceStatus {
    pub enabled: bool,
    pub sweeping: bool,
    pub sweep_interval_secs: u64,
    pub refresh_window_secs: u64,
    pub sweeps_completed: u64,
    pub tokens_refreshed: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub last_report: Option<SweepReport>,
    pub pending_login_probes: usize,
}

#[derive(Debug)]
pub enum MaintenanceMessage {
    /// Refresh every credential expiring inside the window.
    Sweep,
    /// Arm (or re-arm) the delayed connectivity check for a user.
    ScheduleLoginProbe {
        user_id: String,
        organization_id: String,
    },
    /// Drop the user's pending check, if any.
    CancelLoginProbe { user_id: String },
    Status(RpcReplyPort<MaintenanceStatus>),

    // Internal messages (sent by the actor itself)
    SweepFinished(SweepReport),
    LoginProbeDue {
        user_id: String,
        organization_id: String,
        generation: u64,
    },
}

/// Handle for interacting with the maintenance actor.
#[derive(Clone)]
pub struct MaintenanceHandle {
    actor: ActorRef<MaintenanceMessage>,
}

impl MaintenanceHandle {
    pub fn sweep_now(&self) {
        let _ = ractor::cast!(self.actor, MaintenanceMessage::Sweep);
    }

    pub fn schedule_login_probe(&self, user_id: impl Into<String>, organization_id: impl Into<String>) {
        let _ = ractor::cast!(
            self.actor,
            MaintenanceMessage::ScheduleLoginProbe {
                user_id: user_id.into(),
                organization_id: organization_id.into(),
            }
        );
    }

    pub fn cancel_login_probe(&self, user_id: impl Into<String>) {
        let _ = ractor::cast!(
            self.actor,
            MaintenanceMessage::CancelLoginProbe {
                user_id: user_id.into()
            }
        );
    }

    pub async fn status(&self) -> Result<MaintenanceStatus, NexusError> {
        ractor::call!(self.actor, MaintenanceMessage::Status)
            .map_err(|e| NexusError::RactorError(format!("Status RPC failed: {e}")))
    }
}

type ProbeTimer = JoinHandle<Result<(), MessagingErr<MaintenanceMessage>>>;

struct PendingProbe<T> {
    organization_id: String,
    generation: u64,
    timer: T,
}

/// Pending login probes by user. Every arm gets a fresh generation, so a
/// timer that fired before being replaced cannot consume its successor.
struct ProbeBook<T> {
    next_generation: u64,
    pending: HashMap<String, PendingProbe<T>>,
}

impl<T> Default for ProbeBook<T> {
    fn default() -> Self {
        Self {
            next_generation: 0,
            pending: HashMap::new(),
        }
    }
}

impl<T> ProbeBook<T> {
    /// Arm a probe; returns the timer of the probe it replaces.
    fn arm(
        &mut self,
        user_id: &str,
        organization_id: &str,
        start_timer: impl FnOnce(u64) -> T,
    ) -> Option<T> {
        self.next_generation += 1;
        let generation = self.next_generation;
        let probe = PendingProbe {
            organization_id: organization_id.to_string(),
            generation,
            timer: start_timer(generation),
        };
        self.pending
            .insert(user_id.to_string(), probe)
            .map(|previous| previous.timer)
    }

    fn cancel(&mut self, user_id: &str) -> Option<T> {
        self.pending.remove(user_id).map(|p| p.timer)
    }

    /// Organization to probe if `generation` is still the user's armed probe.
    fn take_due(&mut self, user_id: &str, generation: u64) -> Option<String> {
        if self
            .pending
            .get(user_id)
            .is_none_or(|p| p.generation != generation)
        {
            return None;
        }
        self.pending.remove(user_id).map(|p| p.organization_id)
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    fn drain_timers(&mut self) -> impl Iterator<Item = T> + '_ {
        self.pending.drain().map(|(_, p)| p.timer)
    }
}

struct MaintenanceState {
    manager: GoogleAuthManager,
    cfg: MaintenanceConfig,
    sweep_timer: Option<JoinHandle<()>>,
    sweeping: bool,
    sweeps_completed: u64,
    tokens_refreshed: u64,
    last_sweep_at: Option<DateTime<Utc>>,
    last_report: Option<SweepReport>,
    probes: ProbeBook<ProbeTimer>,
}

struct MaintenanceActor;

#[ractor::async_trait]
impl Actor for MaintenanceActor {
    type Msg = MaintenanceMessage;
    type State = MaintenanceState;
    type Arguments = (GoogleAuthManager, MaintenanceConfig);

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        (manager, cfg): Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let sweep_timer = if cfg.enabled {
            info!(
                interval_secs = cfg.sweep_interval_secs,
                window_secs = cfg.refresh_window_secs,
                "Token maintenance started"
            );
            // first sweep right away, then on the interval
            let _ = myself.cast(MaintenanceMessage::Sweep);
            Some(myself.send_interval(cfg.sweep_interval(), || MaintenanceMessage::Sweep))
        } else {
            info!("Token maintenance sweep disabled");
            None
        };

        Ok(MaintenanceState {
            manager,
            cfg,
            sweep_timer,
            sweeping: false,
            sweeps_completed: 0,
            tokens_refreshed: 0,
            last_sweep_at: None,
            last_report: None,
            probes: ProbeBook::default(),
        })
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        if let Some(timer) = state.sweep_timer.take() {
            timer.abort();
        }
        for timer in state.probes.drain_timers() {
            timer.abort();
        }
        Ok(())
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            MaintenanceMessage::Sweep => self.handle_sweep(state, &myself),
            MaintenanceMessage::SweepFinished(report) => {
                state.sweeping = false;
                state.sweeps_completed += 1;
                state.tokens_refreshed += report.refreshed as u64;
                state.last_report = Some(report);
                info!(
                    due = report.due,
                    refreshed = report.refreshed,
                    skipped = report.skipped,
                    failed = report.failed,
                    "Token sweep finished"
                );
            }
            MaintenanceMessage::ScheduleLoginProbe {
                user_id,
                organization_id,
            } => {
                let delay = state.cfg.login_probe_delay();
                let previous = state.probes.arm(&user_id, &organization_id, |generation| {
                    let user_id = user_id.clone();
                    let organization_id = organization_id.clone();
                    myself.send_after(delay, move || MaintenanceMessage::LoginProbeDue {
                        user_id,
                        organization_id,
                        generation,
                    })
                });
                if let Some(previous) = previous {
                    previous.abort();
                }
                debug!(user_id = %user_id, organization_id = %organization_id, delay_secs = delay.as_secs(), "Login probe scheduled");
            }
            MaintenanceMessage::CancelLoginProbe { user_id } => {
                if let Some(timer) = state.probes.cancel(&user_id) {
                    timer.abort();
                    debug!(user_id = %user_id, "Login probe cancelled");
                }
            }
            MaintenanceMessage::LoginProbeDue {
                user_id,
                organization_id,
                generation,
            } => {
                let Some(organization_id) = state.probes.take_due(&user_id, generation) else {
                    debug!(user_id = %user_id, organization_id = %organization_id, "Stale login probe ignored");
                    return Ok(());
                };
                let manager = state.manager.clone();
                tokio::spawn(async move {
                    run_login_probe(&manager, &user_id, &organization_id).await;
                });
            }
            MaintenanceMessage::Status(reply) => {
                let _ = reply.send(MaintenanceStatus {
                    enabled: state.cfg.enabled,
                    sweeping: state.sweeping,
                    sweep_interval_secs: state.cfg.sweep_interval_secs,
                    refresh_window_secs: state.cfg.refresh_window_secs,
                    sweeps_completed: state.sweeps_completed,
                    tokens_refreshed: state.tokens_refreshed,
                    last_sweep_at: state.last_sweep_at,
                    last_report: state.last_report,
                    pending_login_probes: state.probes.len(),
                });
            }
        }
        Ok(())
    }
}

impl MaintenanceActor {
    fn handle_sweep(&self, state: &mut MaintenanceState, myself: &ActorRef<MaintenanceMessage>) {
        if state.sweeping {
            debug!("Sweep already running; skip duplicate");
            return;
        }
        state.sweeping = true;
        state.last_sweep_at = Some(Utc::now());

        let manager = state.manager.clone();
        let cfg = state.cfg.clone();
        let me = myself.clone();
        tokio::spawn(async move {
            let report = match run_sweep(&manager, &cfg).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "Token sweep could not list credentials");
                    SweepReport::default()
                }
            };
            let _ = ractor::cast!(me, MaintenanceMessage::SweepFinished(report));
        });
    }
}

/// Refresh all credentials expiring within the window (or with no known expiry),
/// rate limited and with bounded concurrency.
pub async fn run_sweep(
    manager: &GoogleAuthManager,
    cfg: &MaintenanceConfig,
) -> Result<SweepReport, NexusError> {
    let deadline = Utc::now() + cfg.refresh_window();
    let due = manager.tokens().list_due(deadline).await?;
    let mut report = SweepReport {
        due: due.len(),
        ..Default::default()
    };
    if due.is_empty() {
        return Ok(report);
    }

    let per_minute = NonZeroU32::new(cfg.refresh_per_minute).unwrap_or(NonZeroU32::MIN);
    let limiter = RateLimiter::direct(Quota::per_minute(per_minute).allow_burst(per_minute));
    let limiter = &limiter;

    let mut outcomes = stream::iter(due.into_iter().map(StoredCredential::from))
        .map(|snapshot| async move {
            limiter.until_ready().await;
            let result = refresh_with_retry(manager, &snapshot).await;
            (snapshot.organization_id, result)
        })
        .buffer_unordered(cfg.sweep_concurrency.max(1));

    while let Some((organization_id, result)) = outcomes.next().await {
        match result {
            Ok(RefreshOutcome::Refreshed(_)) => report.refreshed += 1,
            Ok(RefreshOutcome::Superseded(_)) | Ok(RefreshOutcome::Missing) => report.skipped += 1,
            Ok(RefreshOutcome::NoRefreshToken) | Ok(RefreshOutcome::Rejected(_)) => {
                report.failed += 1
            }
            Err(e) => {
                warn!(organization_id = %organization_id, error = %e, "Sweep refresh failed");
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

async fn refresh_with_retry(
    manager: &GoogleAuthManager,
    snapshot: &StoredCredential,
) -> Result<RefreshOutcome, NexusError> {
    (|| async { manager.refresh_organization(snapshot).await })
        .retry(default_retry_policy())
        .when(|e: &NexusError| e.is_retryable())
        .notify(|err, dur: Duration| {
            warn!(
                organization_id = %snapshot.organization_id,
                "Token refresh retrying after error {}, sleeping {:?}", err, dur
            );
        })
        .await
}

async fn run_login_probe(manager: &GoogleAuthManager, user_id: &str, organization_id: &str) {
    match manager.authenticated_client(organization_id).await {
        Ok(Some(_)) => {
            info!(user_id = %user_id, organization_id = %organization_id, "Login probe: Google connection healthy")
        }
        Ok(None) => {
            warn!(user_id = %user_id, organization_id = %organization_id, "Login probe: Google reconnect required")
        }
        Err(e) => {
            warn!(user_id = %user_id, organization_id = %organization_id, error = %e, "Login probe failed")
        }
    }
}

/// Spawn the maintenance actor and return a handle.
pub async fn spawn(
    manager: GoogleAuthManager,
    cfg: MaintenanceConfig,
) -> Result<MaintenanceHandle, NexusError> {
    let (actor, _jh) = Actor::spawn(None, MaintenanceActor, (manager, cfg))
        .await
        .map_err(|e| NexusError::RactorError(format!("failed to spawn MaintenanceActor: {e}")))?;
    Ok(MaintenanceHandle { actor })
}
