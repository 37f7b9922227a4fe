use chrono::Local;
use tokio::sync::mpsc;

/// Where a renewal run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Authenticating,
    Renewing,
    Waiting,
    Stopped,
    Expired,
    Failed,
}

/// Terminal result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Cancelled by the operator
    Stopped,
    /// Lifetime used up
    Expired,
    Failed,
}

impl RunOutcome {
    pub fn is_success(self) -> bool {
        !matches!(self, RunOutcome::Failed)
    }

    pub fn phase(self) -> Phase {
        match self {
            RunOutcome::Stopped => Phase::Stopped,
            RunOutcome::Expired => Phase::Expired,
            RunOutcome::Failed => Phase::Failed,
        }
    }
}

/// One-way notification from a run to whoever is watching it
#[derive(Debug, Clone, PartialEq)]
pub enum RenewalEvent {
    Phase(Phase),
    Status(String),
    Busy(bool),
    Log(String),
    Finished { outcome: RunOutcome, message: String },
}

/// Receives run notifications. Every method defaults to doing nothing.
pub trait RenewalObserver {
    fn on_phase(&self, _phase: Phase) {}

    fn on_status(&self, _text: &str) {}

    fn on_busy(&self, _busy: bool) {}

    fn on_finished(&self, _success: bool, _message: &str) {}

    fn on_log(&self, _line: &str) {}
}

impl RenewalEvent {
    pub fn dispatch(&self, observer: &dyn RenewalObserver) {
        match self {
            RenewalEvent::Phase(phase) => observer.on_phase(*phase),
            RenewalEvent::Status(text) => observer.on_status(text),
            RenewalEvent::Busy(busy) => observer.on_busy(*busy),
            RenewalEvent::Log(line) => observer.on_log(line),
            RenewalEvent::Finished { outcome, message } => {
                observer.on_finished(outcome.is_success(), message)
            }
        }
    }
}

/// Sending half of a run's event channel.
///
/// Sends never fail the run: a dropped receiver only means nobody is watching.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<RenewalEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<RenewalEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: RenewalEvent) {
        let _ = self.tx.send(event);
    }

    pub fn phase(&self, phase: Phase) {
        self.send(RenewalEvent::Phase(phase));
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(RenewalEvent::Status(text.into()));
    }

    pub fn busy(&self, busy: bool) {
        self.send(RenewalEvent::Busy(busy));
    }

    /// Emit a log line stamped with local wall-clock time
    pub fn log(&self, message: impl AsRef<str>) {
        let timestamp = Local::now().format("%H:%M:%S");
        self.send(RenewalEvent::Log(format!("[{timestamp}] {}", message.as_ref())));
    }

    pub fn finished(&self, outcome: RunOutcome, message: impl Into<String>) {
        self.send(RenewalEvent::Finished {
            outcome,
            message: message.into(),
        });
    }
}
