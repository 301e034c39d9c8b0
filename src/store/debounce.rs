//! Deferred saves with a single pending slot.
//!
//! One writer task owns the slot. Scheduling replaces whatever document is
//! pending and restarts the quiet period, so there is never more than one
//! write waiting and it always carries the newest document.

use std::{future::Future, time::Duration};

use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::models::MeasurementDocument;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

enum DebounceCommand {
    Schedule(MeasurementDocument),
    Discard(String),
    Flush(oneshot::Sender<()>),
}

/// Handle to the deferred writer task. Cloning shares the same task; the
/// pending document is saved when the last handle is dropped.
#[derive(Clone)]
pub struct DebouncedWriter {
    commands: mpsc::UnboundedSender<DebounceCommand>,
    cancel_token: CancellationToken,
}

impl DebouncedWriter {
    /// Spawns the writer task on the current tokio runtime. `sink` performs
    /// the actual save and is awaited before the next document is taken.
    pub fn spawn<F, Fut>(quiet_period: Duration, sink: F) -> (Self, JoinHandle<()>)
    where
        F: Fn(MeasurementDocument) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (commands, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(writer_loop(
            receiver,
            quiet_period,
            cancel_token.clone(),
            sink,
        ));

        (
            Self {
                commands,
                cancel_token,
            },
            handle,
        )
    }

    /// Arms the timer with `document`, superseding any pending one.
    pub fn schedule(&self, document: MeasurementDocument) {
        if self
            .commands
            .send(DebounceCommand::Schedule(document))
            .is_err()
        {
            log::warn!("debounced writer is stopped; dropping scheduled save");
        }
    }

    /// Drops the pending document if it is `document_id`. A pending save of
    /// any other document is kept.
    pub fn discard(&self, document_id: &str) {
        let _ = self
            .commands
            .send(DebounceCommand::Discard(document_id.to_string()));
    }

    /// Saves the pending document now, if there is one, and waits for it.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(DebounceCommand::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Stops the writer task, discarding any pending document.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

async fn writer_loop<F, Fut>(
    mut receiver: mpsc::UnboundedReceiver<DebounceCommand>,
    quiet_period: Duration,
    cancel_token: CancellationToken,
    sink: F,
) where
    F: Fn(MeasurementDocument) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut pending: Option<MeasurementDocument> = None;

    loop {
        let Some(document) = pending.take() else {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                command = receiver.recv() => match command {
                    Some(DebounceCommand::Schedule(next)) => pending = Some(next),
                    Some(DebounceCommand::Discard(_)) => {}
                    Some(DebounceCommand::Flush(ack)) => {
                        let _ = ack.send(());
                    }
                    None => break,
                },
            }
            continue;
        };

        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("debounced writer cancelled with save of {} pending", document.id);
                break;
            }
            command = receiver.recv() => match command {
                Some(DebounceCommand::Schedule(next)) => {
                    log_debug!("debounced save of {} superseded", document.id);
                    pending = Some(next);
                }
                Some(DebounceCommand::Discard(id)) if id == document.id => {
                    log_debug!("debounced save of {} discarded", document.id);
                }
                Some(DebounceCommand::Discard(_)) => pending = Some(document),
                Some(DebounceCommand::Flush(ack)) => {
                    sink(document).await;
                    let _ = ack.send(());
                }
                None => {
                    sink(document).await;
                    break;
                }
            },
            _ = time::sleep(quiet_period) => {
                log_debug!("quiet period elapsed, saving {}", document.id);
                sink(document).await;
            }
        }
    }
}
