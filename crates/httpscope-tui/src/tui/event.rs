use std::time::Duration;

use crossterm::event::{Event as CrosstermEvent, EventStream, KeyEvent, KeyEventKind};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Terminal events
#[derive(Clone, Debug)]
pub enum Event {
    /// Timer tick, drives the refresh cadence
    Tick,
    /// Key press event
    Key(KeyEvent),
    /// Terminal resize
    Resize(u16, u16),
    /// Input stream failed
    Error(String),
}

/// Event handler managing terminal input
pub struct EventHandler {
    receiver: mpsc::UnboundedReceiver<Event>,
    /// Child of the application token; cancelling either stops the reader
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EventHandler {
    /// Spawn the input reader. It stops when `parent` is cancelled.
    pub fn new(tick_rate: Duration, parent: &CancellationToken) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = parent.child_token();

        let task = {
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let mut reader = EventStream::new();
                let mut tick_interval = tokio::time::interval(tick_rate);

                loop {
                    let tick = tick_interval.tick();
                    let crossterm_event = reader.next().fuse();

                    let event = tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tick => Event::Tick,
                        maybe_event = crossterm_event => match maybe_event {
                            // Release events show up on Windows
                            Some(Ok(CrosstermEvent::Key(key))) if key.kind == KeyEventKind::Press => {
                                Event::Key(key)
                            }
                            Some(Ok(CrosstermEvent::Resize(w, h))) => Event::Resize(w, h),
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => Event::Error(e.to_string()),
                            None => break,
                        },
                    };

                    if sender.send(event).is_err() {
                        break;
                    }
                }
            })
        };

        Self {
            receiver,
            cancel,
            task,
        }
    }

    /// Receive the next event
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Stop the reader task and wait for it
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            tracing::debug!(error = %err, "event task ended abnormally");
        }
    }
}
