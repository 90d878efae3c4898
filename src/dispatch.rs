use crate::io_models::message::{PlatformMsg, QueueMessage};
use std::fmt::Debug;
use tokio::sync::mpsc::UnboundedSender;

/// One-way, non-blocking hand-off to an external consumer. The bus producer
/// and the work queue share this contract: the core dispatches items and
/// never waits on delivery.
pub trait Dispatcher<T>: Send + Sync {
    fn dispatch(&self, item: T);
}

/// Channel-backed dispatch; the receiving end is drained outside the core
/// (the concrete bus producer, or the queue consumer loop).
impl<T: Send> Dispatcher<T> for UnboundedSender<T> {
    fn dispatch(&self, item: T) {
        if self.send(item).is_err() {
            error!("Unable to dispatch item, the channel receiver is gone");
        }
    }
}

/// Discards everything. Stands in when no consumer is wired up.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDispatcher;

impl<T: Send + Debug> Dispatcher<T> for NullDispatcher {
    fn dispatch(&self, item: T) {
        debug!("dropping {item:?}, no consumer is wired");
    }
}

/// Message-bus boundary: test-result metadata, metric points, step records.
pub type MsgPublisher = dyn Dispatcher<PlatformMsg>;

/// External work-queue boundary: scheduled runs plus teardown and ingestion
/// retries.
pub type JobQueue = dyn Dispatcher<QueueMessage>;

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_channel_dispatch_delivers_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.dispatch("first");
        tx.dispatch("second");
        assert_eq!(rx.try_recv(), Ok("first"));
        assert_eq!(rx.try_recv(), Ok("second"));
    }

    #[test]
    fn test_dispatch_survives_a_gone_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        tx.dispatch("nobody listens");

        NullDispatcher.dispatch("nobody ever listened");
    }
}
