use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::{
    aws::{ControlPlaneClient, credentials::CredentialStore},
    config::EngineConfig,
    error::EngineError,
    propagate::ArtifactTokenPropagator,
    totp,
};

pub mod events;
pub mod scheduler;

pub use events::{EventSink, Phase, RenewalEvent, RenewalObserver, RunOutcome};
pub use scheduler::{Cadence, RunReport};

use scheduler::Scheduler;

/// Runs credential renewal in the background, one run at a time
pub struct RenewalEngine {
    config: EngineConfig,
    client: Arc<dyn ControlPlaneClient>,
    store: CredentialStore,
    propagator: Option<Arc<ArtifactTokenPropagator>>,
    cadence: Cadence,
    active: Arc<AtomicBool>,
}

/// Clears the engine's active flag when the run task ends
struct ActiveRun(Arc<AtomicBool>);

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl RenewalEngine {
    pub fn new(
        config: EngineConfig,
        client: Arc<dyn ControlPlaneClient>,
        store: CredentialStore,
    ) -> Self {
        Self {
            config,
            client,
            store,
            propagator: None,
            cadence: Cadence::default(),
            active: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_propagator(mut self, propagator: ArtifactTokenPropagator) -> Self {
        self.propagator = Some(Arc::new(propagator));
        self
    }

    pub fn with_cadence(mut self, cadence: Cadence) -> Self {
        self.cadence = cadence;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Start a run with a one-time code generated from the configured secret.
    ///
    /// A bad secret is reported before any control-plane call is made.
    pub fn start_with_secret(&self) -> Result<RunHandle, EngineError> {
        let secret = self
            .config
            .mfa_secret
            .as_deref()
            .ok_or_else(|| EngineError::InvalidSecret("no MFA secret configured".to_string()))?;
        let code = totp::generate_now(secret)?;
        self.start(code)
    }

    /// Spawn a run on the current Tokio runtime using `code` for MFA
    pub fn start(&self, code: impl Into<String>) -> Result<RunHandle, EngineError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EngineError::AlreadyRunning);
        }
        let guard = ActiveRun(self.active.clone());

        let cancel = CancellationToken::new();
        let (events, rx) = EventSink::channel();
        let scheduler = Scheduler {
            config: self.config.clone(),
            client: self.client.clone(),
            store: self.store.clone(),
            propagator: self.propagator.clone(),
            cadence: self.cadence,
            events,
            cancel: cancel.clone(),
        };

        let code = code.into();
        let task = tokio::spawn(async move {
            let _guard = guard;
            scheduler.run(code).await
        });

        Ok(RunHandle {
            cancel,
            events: rx,
            task,
        })
    }
}

/// Caller's side of a run: event stream in, cancellation out
pub struct RunHandle {
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<RenewalEvent>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    /// Ask the run to stop at its next cancellation point
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn next_event(&mut self) -> Option<RenewalEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end, discarding undelivered events
    pub async fn join(self) -> RunReport {
        drop(self.events);
        Self::report(self.task).await
    }

    /// Deliver every event to `observer` until the run ends
    pub async fn observe(mut self, observer: &dyn RenewalObserver) -> RunReport {
        while let Some(event) = self.events.recv().await {
            event.dispatch(observer);
        }
        Self::report(self.task).await
    }

    async fn report(task: JoinHandle<RunReport>) -> RunReport {
        match task.await {
            Ok(report) => report,
            Err(e) => {
                error!("Renewal task ended abnormally: {}", e);
                RunReport {
                    outcome: RunOutcome::Failed,
                    message: format!("Renewal task ended abnormally: {e}"),
                    cycles_completed: 0,
                    secondary_failures: 0,
                }
            }
        }
    }
}
