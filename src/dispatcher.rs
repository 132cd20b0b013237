//! Ordered hand-off of import events to whichever consumer is attached
//!
//! The watcher thread only ever sends a message; a dedicated dispatch thread
//! delivers events to the attached consumer, or holds them in a bounded
//! backlog until one attaches, then replays them oldest first.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::traits::{ImportConsumer, ImportEvent, ImportSink};

pub const DEFAULT_BACKLOG_CAPACITY: usize = 256;

enum DispatchMessage {
    Event(ImportEvent),
    Attach(Arc<dyn ImportConsumer>),
    Detach,
    Flush(Sender<()>),
    Shutdown,
}

struct DispatchState {
    consumer: Option<Arc<dyn ImportConsumer>>,
    backlog: VecDeque<ImportEvent>,
    capacity: usize,
    dropped: u64,
}

/// What the dispatch thread does after a message, outside the state lock
enum Step {
    Continue,
    Deliver(Arc<dyn ImportConsumer>, Vec<ImportEvent>),
    Stop,
}

impl DispatchState {
    fn handle(&mut self, message: DispatchMessage) -> Step {
        match message {
            DispatchMessage::Event(event) => match &self.consumer {
                Some(consumer) => return Step::Deliver(Arc::clone(consumer), vec![event]),
                None => self.queue(event),
            },
            DispatchMessage::Attach(consumer) => {
                let replay: Vec<ImportEvent> = self.backlog.drain(..).collect();
                if !replay.is_empty() {
                    tracing::info!(count = replay.len(), "Replaying queued imports");
                }
                self.consumer = Some(Arc::clone(&consumer));
                return Step::Deliver(consumer, replay);
            }
            DispatchMessage::Detach => {
                self.consumer = None;
                tracing::debug!("Import consumer detached");
            }
            DispatchMessage::Flush(done) => {
                let _ = done.send(());
            }
            DispatchMessage::Shutdown => return Step::Stop,
        }
        Step::Continue
    }

    fn queue(&mut self, event: ImportEvent) {
        if self.capacity == 0 {
            self.dropped += 1;
            tracing::warn!(path = %event.path().display(), "No consumer and no backlog - import dropped");
            return;
        }
        if self.backlog.len() >= self.capacity {
            if let Some(oldest) = self.backlog.pop_front() {
                self.dropped += 1;
                tracing::warn!(
                    path = %oldest.path().display(),
                    dropped_total = self.dropped,
                    "Import backlog full - dropping oldest"
                );
            }
        }
        tracing::debug!(kind = event.as_str(), path = %event.path().display(), "Queued import until a consumer attaches");
        self.backlog.push_back(event);
    }
}

pub struct ImportDispatcher {
    tx: Mutex<Sender<DispatchMessage>>,
    state: Arc<Mutex<DispatchState>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ImportDispatcher {
    /// Spawn the dispatch thread
    pub fn spawn(capacity: usize) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel();
        let state = Arc::new(Mutex::new(DispatchState {
            consumer: None,
            backlog: VecDeque::new(),
            capacity,
            dropped: 0,
        }));

        let worker_state = Arc::clone(&state);
        let worker = std::thread::Builder::new()
            .name("mediadrop-dispatch".into())
            .spawn(move || run(rx, worker_state))?;

        tracing::info!(capacity, "Import dispatcher started");
        Ok(Self {
            tx: Mutex::new(tx),
            state,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn send(&self, message: DispatchMessage) {
        if self.tx.lock().unwrap().send(message).is_err() {
            tracing::error!("Import dispatcher is not running");
        }
    }

    /// Register the consumer; queued events are replayed to it first
    pub fn attach(&self, consumer: Arc<dyn ImportConsumer>) {
        self.send(DispatchMessage::Attach(consumer));
    }

    pub fn detach(&self) {
        self.send(DispatchMessage::Detach);
    }

    /// Block until everything sent so far has been handled
    pub fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        self.send(DispatchMessage::Flush(done_tx));
        let _ = done_rx.recv();
    }

    pub fn backlog_len(&self) -> usize {
        self.state.lock().unwrap().backlog.len()
    }

    pub fn dropped_count(&self) -> u64 {
        self.state.lock().unwrap().dropped
    }

    /// Finish pending messages and stop the dispatch thread
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().unwrap().take() else {
            return;
        };
        self.send(DispatchMessage::Shutdown);
        if worker.join().is_err() {
            tracing::error!("Import dispatcher thread panicked");
        }
    }
}

impl ImportSink for ImportDispatcher {
    fn emit(&self, event: ImportEvent) {
        self.send(DispatchMessage::Event(event));
    }
}

impl Drop for ImportDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(rx: Receiver<DispatchMessage>, state: Arc<Mutex<DispatchState>>) {
    for message in rx {
        let step = state.lock().unwrap().handle(message);
        match step {
            Step::Continue => {}
            Step::Deliver(consumer, events) => {
                for event in events {
                    deliver(consumer.as_ref(), event);
                }
            }
            Step::Stop => break,
        }
    }
    tracing::debug!("Import dispatcher stopped");
}

/// A panicking consumer loses its one event, not the dispatch thread
fn deliver(consumer: &dyn ImportConsumer, event: ImportEvent) {
    let path = event.path().to_path_buf();
    if panic::catch_unwind(AssertUnwindSafe(|| consumer.on_import(event))).is_err() {
        tracing::error!(path = %path.display(), "Import consumer panicked");
    }
}
