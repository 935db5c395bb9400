//! The session event loop
//!
//! One task owns the `ZoneSession`. Stream events, pointer commands from the
//! page and completions of background requests all arrive as messages and are
//! applied one at a time, so the draw state and zone counter never race.
//!
//! Background requests report back through a channel owned by the loop. Once
//! the loop has exited (teardown), those reports have nowhere to go and are
//! dropped, so a late reply can never touch a dead session.

use crate::service::ServiceClient;
use crate::stream::StreamEvents;
use crate::submitter::{SubmitOutcome, ZoneSubmitter};
use crate::{ViewBus, ViewUpdate};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use zone_watch::{PointerInput, PointerOutcome, SessionUpdate, StreamEvent, ZoneError, ZoneSession};

const COMMAND_QUEUE: usize = 64;

/// Input from the presentation side.
#[derive(Debug, Clone)]
pub enum UiCommand {
    Pointer(PointerInput),
    GenerateHeatmap,
}

enum Completion {
    Zone { zone_id: String, outcome: SubmitOutcome },
    Heatmap(Result<String, String>),
}

pub struct SessionRuntime {
    commands: mpsc::Sender<UiCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<ZoneSession>>,
}

impl SessionRuntime {
    /// Starts the loop for `session`, fed by `events` from a stream channel.
    pub fn spawn(
        session: ZoneSession,
        events: StreamEvents,
        submitter: ZoneSubmitter,
        service: ServiceClient,
        bus: ViewBus,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(
            SessionLoop { session, submitter, service, bus }.run(events, commands_rx, shutdown_rx),
        );
        Self {
            commands: commands_tx,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// A sender for pointer and button input.
    pub fn commands(&self) -> mpsc::Sender<UiCommand> {
        self.commands.clone()
    }

    /// Stops the loop and tears the session down. Returns the dead session for
    /// inspection, or `None` if it was already shut down.
    pub async fn shutdown(&mut self) -> Option<ZoneSession> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        let task = self.task.take()?;
        match task.await {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!("Session loop ended abnormally: {e}");
                None
            }
        }
    }
}

impl Drop for SessionRuntime {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

struct SessionLoop {
    session: ZoneSession,
    submitter: ZoneSubmitter,
    service: ServiceClient,
    bus: ViewBus,
}

impl SessionLoop {
    async fn run(
        mut self,
        mut events: StreamEvents,
        mut commands: mpsc::Receiver<UiCommand>,
        mut shutdown: oneshot::Receiver<()>,
    ) -> ZoneSession {
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion>();
        let mut stream_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = events.recv(), if stream_open => match event {
                    Some(event) => self.apply_event(event),
                    None => {
                        // Stream gone; zones can still be drawn on the last frame.
                        stream_open = false;
                    }
                },
                command = commands.recv() => match command {
                    Some(command) => self.apply_command(command, &done_tx),
                    None => break,
                },
                Some(done) = done_rx.recv() => self.report(done),
            }
        }

        self.session.teardown();
        tracing::info!("Zone session torn down");
        self.session
    }

    fn apply_event(&mut self, event: StreamEvent) {
        match self.session.handle_event(event) {
            SessionUpdate::FrameReplaced(frame) => self.bus.publish_frame(frame),
            SessionUpdate::Telemetry { zones_updated } => {
                if let Some(snapshot) = self.session.latest_telemetry() {
                    self.bus.publish(ViewUpdate::Telemetry { pretty: snapshot.to_pretty_json() });
                }
                if zones_updated > 0 {
                    self.bus.publish_series(self.session.series());
                }
            }
            SessionUpdate::ConnectionChanged(state) => {
                self.bus.publish(ViewUpdate::Connection { state });
            }
            SessionUpdate::Skipped(e) => {
                tracing::debug!("Dropped stream event: {e}");
                // The raw snapshot is still kept for the response panel.
                if let (ZoneError::MalformedTelemetry(_), Some(snapshot)) = (&e, self.session.latest_telemetry()) {
                    self.bus.publish(ViewUpdate::Telemetry { pretty: snapshot.to_pretty_json() });
                }
            }
            SessionUpdate::Ignored => {}
        }
    }

    fn apply_command(&mut self, command: UiCommand, done: &mpsc::UnboundedSender<Completion>) {
        match command {
            UiCommand::Pointer(input) => match self.session.handle_pointer(input) {
                PointerOutcome::Started | PointerOutcome::Ignored => {}
                PointerOutcome::Overlay(rect) => self.bus.publish(ViewUpdate::Overlay { rect: Some(rect) }),
                PointerOutcome::Committed(zone) => {
                    self.bus.publish(ViewUpdate::Overlay { rect: None });
                    self.bus.publish(ViewUpdate::ZoneCommitted { zone: zone.clone() });

                    let zone_id = zone.zone_id.clone();
                    let submission = self.submitter.spawn(zone);
                    let done = done.clone();
                    tokio::spawn(async move {
                        match submission.await {
                            Ok(outcome) => {
                                let _ = done.send(Completion::Zone { zone_id, outcome });
                            }
                            Err(e) => tracing::warn!(zone_id = %zone_id, "Zone submission task failed: {e}"),
                        }
                    });
                }
                PointerOutcome::Suppressed(e) => {
                    self.bus.publish(ViewUpdate::Overlay { rect: None });
                    tracing::debug!("Drawing suppressed: {e}");
                }
            },
            UiCommand::GenerateHeatmap => {
                let service = self.service.clone();
                let done = done.clone();
                tokio::spawn(async move {
                    let result = service.generate_heatmap().await.map_err(|e| e.to_string());
                    let _ = done.send(Completion::Heatmap(result));
                });
            }
        }
    }

    fn report(&mut self, done: Completion) {
        if !self.session.is_live() {
            return;
        }
        match done {
            Completion::Zone { zone_id, outcome } => {
                let (accepted, detail) = match outcome {
                    SubmitOutcome::Accepted => (true, "Made region".to_string()),
                    SubmitOutcome::Rejected { status, body } => (false, format!("status {status}: {body}")),
                    SubmitOutcome::Failed(reason) => (false, reason),
                };
                self.bus.publish(ViewUpdate::ZoneSubmitted { zone_id, accepted, detail });
            }
            Completion::Heatmap(Ok(body)) => {
                tracing::info!("Heatmap generated: {body}");
                self.bus.publish(ViewUpdate::Notice { message: format!("Heatmap generated: {body}") });
            }
            Completion::Heatmap(Err(reason)) => {
                tracing::warn!("Heatmap generation failed: {reason}");
                self.bus.publish(ViewUpdate::Notice { message: format!("Heatmap failed: {reason}") });
            }
        }
    }
}
