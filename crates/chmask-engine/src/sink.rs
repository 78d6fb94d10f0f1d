use std::sync::mpsc::{Sender, SyncSender, TrySendError};
use std::sync::Arc;

use crate::frame::Frame;

/// Downstream consumer of published frames.
/// `publish` runs with the stage's port lock held: it must not block for long
/// and must not write stage parameters from the same thread.
pub trait FrameSink: Send + Sync {
    fn publish(&self, frame: Arc<Frame>);
}

impl FrameSink for Sender<Arc<Frame>> {
    fn publish(&self, frame: Arc<Frame>) {
        if self.send(frame).is_err() {
            tracing::debug!("sink receiver gone, frame discarded");
        }
    }
}

impl FrameSink for SyncSender<Arc<Frame>> {
    fn publish(&self, frame: Arc<Frame>) {
        match self.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(f)) => {
                tracing::warn!(unique_id = f.unique_id(), "sink queue full, frame dropped");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("sink receiver gone, frame discarded");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn bounded_sink_drops_when_full() {
        let (tx, rx) = mpsc::sync_channel(1);
        let frame = Arc::new(Frame::new(1, 1, vec![1u8]).unwrap());
        tx.publish(frame.clone());
        tx.publish(frame);
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
