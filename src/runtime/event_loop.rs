//! # Event Loop
//!
//! Single consumer merging key file events, the safety timer and shutdown.
//!
//! One rotation runs at a time. Events that arrive while it runs are drained
//! afterwards and coalesced into a single follow-up detection.

use crate::detector::{ChangeDetector, Detection};
use crate::rotation::{RotationOrchestrator, RotationOutcome};
use crate::runtime::watcher::{PathWatch, WatchEvent};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What caused a detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Timer,
    Write,
    Remove,
    Coalesced,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Trigger::Timer => "timer",
            Trigger::Write => "write",
            Trigger::Remove => "remove",
            Trigger::Coalesced => "coalesced",
        }
    }
}

/// Owns every piece of mutable rotator state for the process lifetime
pub struct EventLoop<W> {
    watch: W,
    detector: ChangeDetector,
    orchestrator: RotationOrchestrator,
    interval: Duration,
    cancel: CancellationToken,
    watch_open: bool,
    needs_rearm: bool,
    last_outcome: Option<RotationOutcome>,
}

impl<W> std::fmt::Debug for EventLoop<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("detector", &self.detector)
            .field("interval", &self.interval)
            .field("watch_open", &self.watch_open)
            .field("needs_rearm", &self.needs_rearm)
            .finish_non_exhaustive()
    }
}

impl<W: PathWatch> EventLoop<W> {
    pub fn new(
        watch: W,
        detector: ChangeDetector,
        orchestrator: RotationOrchestrator,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            watch,
            detector,
            orchestrator,
            interval,
            cancel,
            watch_open: true,
            needs_rearm: false,
            last_outcome: None,
        }
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Outcome of the most recent rotation attempt
    pub fn last_outcome(&self) -> Option<&RotationOutcome> {
        self.last_outcome.as_ref()
    }

    /// Run until the cancellation token fires
    ///
    /// The timer's first tick is immediate, so a pending rotation (for
    /// example after a restart mid-rotation) is driven right away.
    pub async fn run(&mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            path = %self.detector.path().display(),
            interval = ?self.interval,
            "Watching gossip key file"
        );

        loop {
            let trigger = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                event = self.watch.recv(), if self.watch_open => match event {
                    Some(event) => self.on_watch_event(event).await,
                    None => {
                        warn!("File watcher stopped, relying on the safety timer");
                        self.watch_open = false;
                        None
                    }
                },
                _ = ticker.tick() => {
                    if self.needs_rearm {
                        self.rearm().await;
                    }
                    Some(Trigger::Timer)
                }
            };

            if let Some(trigger) = trigger {
                self.process(trigger).await;
                ticker.reset();
            }
        }

        info!("Event loop stopped");
    }

    async fn on_watch_event(&mut self, event: WatchEvent) -> Option<Trigger> {
        match event {
            WatchEvent::Write => Some(Trigger::Write),
            WatchEvent::Remove => {
                self.rearm().await;
                Some(Trigger::Remove)
            }
            WatchEvent::Error(e) => {
                warn!(error = %e, "File watcher reported an error");
                None
            }
        }
    }

    async fn rearm(&mut self) {
        match self.watch.rearm().await {
            Ok(()) => {
                debug!("Re-armed watch on gossip key file");
                self.needs_rearm = false;
            }
            Err(e) => {
                warn!(error = %e, "Unable to re-arm watch, retrying on the next timer tick");
                self.needs_rearm = true;
            }
        }
    }

    /// Detect and rotate, then drain whatever queued up meanwhile
    async fn process(&mut self, trigger: Trigger) {
        let mut trigger = trigger;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            self.detect_and_rotate(trigger).await;

            if !self.drain().await {
                return;
            }
            trigger = Trigger::Coalesced;
        }
    }

    async fn detect_and_rotate(&mut self, trigger: Trigger) {
        debug!(trigger = trigger.as_str(), "Checking gossip key file");
        let material = match self.detector.detect() {
            Detection::Changed(material) => material,
            Detection::Unchanged => return,
        };

        info!(
            trigger = trigger.as_str(),
            fingerprint = %material.fingerprint(),
            "Gossip key file changed"
        );
        let outcome = self.orchestrator.run(material, &mut self.detector).await;
        debug!(outcome = outcome.label(), "Rotation attempt finished");
        self.last_outcome = Some(outcome);
    }

    /// Consume queued events, returning whether any of them asks for detection
    async fn drain(&mut self) -> bool {
        let mut pending = false;
        while let Some(event) = self.watch.try_recv() {
            pending |= self.on_watch_event(event).await.is_some();
        }
        if pending {
            debug!("Coalescing file events received during the last check");
        }
        pending
    }
}
