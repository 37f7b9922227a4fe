//! The renewal state machine.
//!
//! ```text
//! Idle -> Authenticating -> Failed
//!                        -> Renewing -> Waiting -> Renewing -> ... -> Expired | Stopped | Failed
//! ```
//!
//! Cancellation is cooperative. A cancel during the wait takes effect at once;
//! a cycle that has already started runs to completion and the cancel is seen
//! when it ends.

use std::{sync::Arc, time::Duration};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{EventSink, Phase, RunOutcome};
use crate::{
    aws::{
        AssumedRoleCredential, ControlPlaneClient,
        credentials::CredentialStore,
        roles::{RoleAssumer, RoleTarget, TargetPolicy},
    },
    config::EngineConfig,
    error::EngineError,
    propagate::ArtifactTokenPropagator,
};

/// Timing of the wait between renewal cycles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    /// Granularity of the wait
    pub tick: Duration,
    /// Ticks between the end of one cycle and the start of the next
    pub ticks_per_cycle: u32,
    /// Emit a waiting status every this many ticks
    pub status_every: u32,
}

impl Default for Cadence {
    /// 59 one-minute ticks: renew just before the one hour role credential limit
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            ticks_per_cycle: 59,
            status_every: 10,
        }
    }
}

/// Scheduler-owned run state. Observers only see it through phase events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RenewalState {
    pub hours_remaining: u32,
    pub phase: Phase,
    pub cycles_completed: u32,
    pub secondary_failures: u32,
}

/// What a finished run reports back
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub message: String,
    pub cycles_completed: u32,
    pub secondary_failures: u32,
}

pub(crate) struct Scheduler {
    pub(crate) config: EngineConfig,
    pub(crate) client: Arc<dyn ControlPlaneClient>,
    pub(crate) store: CredentialStore,
    pub(crate) propagator: Option<Arc<ArtifactTokenPropagator>>,
    pub(crate) cadence: Cadence,
    pub(crate) events: EventSink,
    pub(crate) cancel: CancellationToken,
}

impl Scheduler {
    pub(crate) async fn run(self, code: String) -> RunReport {
        let mut state = RenewalState {
            hours_remaining: 0,
            phase: Phase::Idle,
            cycles_completed: 0,
            secondary_failures: 0,
        };

        let (outcome, message) = self.drive(&mut state, &code).await;
        self.enter(&mut state, outcome.phase());

        self.events.busy(false);
        self.events.finished(outcome, message.clone());
        self.events.log(&message);
        info!("Renewal run finished: {:?} ({})", outcome, message);

        RunReport {
            outcome,
            message,
            cycles_completed: state.cycles_completed,
            secondary_failures: state.secondary_failures,
        }
    }

    /// Record a transition and publish it to observers
    fn enter(&self, state: &mut RenewalState, phase: Phase) {
        state.phase = phase;
        self.events.phase(state.phase);
    }

    async fn drive(&self, state: &mut RenewalState, code: &str) -> (RunOutcome, String) {
        self.enter(state, Phase::Authenticating);
        self.events.busy(true);
        self.events.status("Authenticating with MFA...");
        self.log_banner();

        if let Err(e) = self.authenticate(code).await {
            return (RunOutcome::Failed, e.to_string());
        }
        self.events.busy(false);

        let targets = self.targets();
        let assumer = RoleAssumer::new(
            self.client.clone(),
            self.config.user.clone(),
            self.config.mfa_session_profile(),
        );
        state.hours_remaining = self.config.total_lifetime_hours;

        while state.hours_remaining > 0 {
            if self.cancel.is_cancelled() {
                return stopped();
            }

            self.enter(state, Phase::Renewing);
            self.events.busy(true);
            self.events
                .status(format!("Renewing {}...", self.config.account.name));

            if let Err(e) = self.renew(&assumer, &targets, state).await {
                return (RunOutcome::Failed, e.to_string());
            }

            let hours = state.hours_remaining;
            self.events.busy(false);
            self.events.status(format!("Running ({hours}h)"));
            self.events.log(format!(
                "Keep this running to have your keys renewed every {} minutes for the next {hours} {}.",
                self.wait_minutes(),
                if hours == 1 { "hour" } else { "hours" }
            ));

            self.enter(state, Phase::Waiting);
            if !self.wait(hours).await {
                return stopped();
            }

            state.cycles_completed += 1;
            state.hours_remaining -= 1;
        }

        (
            RunOutcome::Expired,
            "MFA token credentials have expired. Please restart to renew them.".to_string(),
        )
    }

    fn log_banner(&self) {
        let config = &self.config;
        self.events.log(format!(
            "Obtaining temporary credentials for {} and {} through the {} profile.",
            config.account.name, config.secondary_profile, config.source_profile
        ));
        self.events.log(format!("MFA Device: {}", config.mfa_device_arn()));
        self.events.log(format!("Target Role: {}", config.primary_role_arn()));
    }

    /// Exchange the one-time code for a session and cache it in the MFA session profile
    async fn authenticate(&self, code: &str) -> Result<(), EngineError> {
        let config = &self.config;
        let duration = config.session_duration_seconds();

        self.events.log("Running: sts get-session-token...");
        let session = self
            .client
            .get_session_token(&config.mfa_device_arn(), duration, code, &config.source_profile)
            .await
            .map_err(|e| {
                self.events.log(format!("MFA authentication failed: {e}"));
                EngineError::Authentication(e)
            })?;

        self.events.log("Renewed session with temporary credentials with MFA info...");
        debug!("Session expires at {}", session.expiration_display());
        self.events.status("Configuring MFA session...");

        let session_profile = config.mfa_session_profile();
        if let Err(e) = self
            .store
            .write_profile(&session_profile, &session, &config.region)
            .await
        {
            warn!("{}", e);
            self.events.log(e.to_string());
        }
        for profile in [&config.account.name, &config.secondary_profile] {
            if let Err(e) = self.store.set_region(profile, &config.region).await {
                warn!("{}", e);
                self.events.log(e.to_string());
            }
        }

        self.events
            .log(format!("Successfully cached token for {duration} seconds."));
        Ok(())
    }

    fn targets(&self) -> [RoleTarget; 2] {
        let config = &self.config;
        [
            RoleTarget {
                label: config.account.name.clone(),
                role_arn: config.primary_role_arn(),
                profile: config.primary_profile.clone(),
                policy: TargetPolicy::Required,
            },
            RoleTarget {
                label: config.secondary_profile.clone(),
                role_arn: config.secondary_role_arn(),
                profile: config.secondary_profile.clone(),
                policy: TargetPolicy::BestEffort,
            },
        ]
    }

    /// One renewal cycle. Only a required target failing is an error.
    async fn renew(
        &self,
        assumer: &RoleAssumer,
        targets: &[RoleTarget],
        state: &mut RenewalState,
    ) -> Result<(), EngineError> {
        let mut renewed: Vec<AssumedRoleCredential> = Vec::with_capacity(targets.len());

        for target in targets {
            self.events.log(format!("Renewing {} access keys...", target.label));
            match assumer.assume_role(target).await {
                Ok(credential) => renewed.push(credential),
                Err(e) if target.policy == TargetPolicy::Required => {
                    self.events.log(format!("Failed to assume role: {e}"));
                    return Err(e);
                }
                Err(e) => {
                    state.secondary_failures += 1;
                    self.events
                        .log(format!("Failed to assume {} role: {e}", target.label));
                }
            }
        }

        for credential in &renewed {
            self.persist(credential).await;
        }

        let secondary = renewed
            .iter()
            .find(|c| c.target_profile == self.config.secondary_profile);
        if let (Some(propagator), Some(credential)) = (&self.propagator, secondary) {
            let report = propagator.propagate(&credential.target_profile).await;
            if report.token_obtained {
                self.events.log("Generated CodeArtifact Token.");
            }
            for target in &report.updated {
                self.events.log(format!("Updated {target} with CodeArtifact Token."));
            }
            for failure in &report.failures {
                self.events.log(failure.to_string());
            }
        }

        Ok(())
    }

    async fn persist(&self, credential: &AssumedRoleCredential) {
        let profile = &credential.target_profile;
        match self
            .store
            .write_profile(profile, &credential.credentials, &self.config.region)
            .await
        {
            Ok(()) => self
                .events
                .log(format!("{profile} profile has been updated in the credentials file.")),
            Err(e) => {
                warn!("{}", e);
                self.events.log(e.to_string());
            }
        }
    }

    fn wait_minutes(&self) -> u64 {
        (self.cadence.tick * self.cadence.ticks_per_cycle).as_secs() / 60
    }

    /// Sleep out the cadence tick by tick. Returns false if cancelled.
    async fn wait(&self, hours: u32) -> bool {
        for remaining in (1..=self.cadence.ticks_per_cycle).rev() {
            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                _ = tokio::time::sleep(self.cadence.tick) => {}
            }

            if self.cadence.status_every > 0 && remaining % self.cadence.status_every == 0 {
                self.events
                    .status(format!("Waiting... ({hours}h, {remaining}m)"));
            }
        }
        !self.cancel.is_cancelled()
    }
}

fn stopped() -> (RunOutcome, String) {
    (RunOutcome::Stopped, "Stopped by user".to_string())
}
