//! The dedicated capture thread and its bounded frame queue.

use crate::source::CaptureError;
use crate::synchronizer::{Capture, FrameSource};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// A cancellation token shared between the scan caller, the processing
/// stage and the capture thread.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a cancellation for every holder of this token.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Item carried by the frame queue.
pub type CaptureItem = Result<Capture, CaptureError>;

/// Handle to a running capture thread.
///
/// The thread owns the frame source for the scan's duration and hands it
/// back from [`CaptureThread::finish`].
pub struct CaptureThread<S> {
    receiver: Option<Receiver<CaptureItem>>,
    handle: JoinHandle<S>,
    cancel: CancellationToken,
}

impl<S: FrameSource + 'static> CaptureThread<S> {
    /// Start capturing on a new thread. At most `capacity` items wait in the
    /// queue; the capture loop blocks when it is full.
    pub fn spawn(
        mut source: S,
        capacity: usize,
        cancel: CancellationToken,
    ) -> Result<Self, CaptureError> {
        let (sender, receiver) = mpsc::sync_channel::<CaptureItem>(capacity);
        let token = cancel.clone();

        let handle = thread::Builder::new()
            .name("turnscan-capture".to_string())
            .spawn(move || {
                loop {
                    if token.is_cancelled() {
                        info!("Capture cancelled");
                        break;
                    }
                    let item = source.capture_next_frame();
                    let last = matches!(item, Ok(Capture::EndOfScan) | Err(_));
                    if sender.send(item).is_err() {
                        debug!("Frame queue closed, stopping capture");
                        break;
                    }
                    if last {
                        break;
                    }
                }

                if let Err(e) = source.release() {
                    warn!("Failed to release scanner hardware: {}", e);
                }
                source
            })?;

        Ok(Self {
            receiver: Some(receiver),
            handle,
            cancel,
        })
    }

    /// Block for the next queued item. `None` once the thread has exited and
    /// the queue is drained.
    pub fn recv(&self) -> Option<CaptureItem> {
        self.receiver.as_ref().and_then(|r| r.recv().ok())
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Discard queued frames, wait for the capture thread to release the
    /// hardware, and take the frame source back.
    pub fn finish(mut self) -> Result<S, CaptureError> {
        if let Some(receiver) = self.receiver.take() {
            let discarded = receiver.try_iter().count();
            if discarded > 0 {
                debug!("Discarded {} queued captures", discarded);
            }
            drop(receiver);
        }
        self.handle.join().map_err(|_| CaptureError::ThreadPanicked)
    }
}
