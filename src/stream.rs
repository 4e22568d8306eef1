use crate::event::{ReportEvent, Subscribers, SubscriptionId};
use crate::{ClientError, Result};
use crossbeam_channel::Receiver;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Pull-side view of an interface's reports.
///
/// Reports are pushed into a bounded channel while [`crate::Context::update`]
/// runs; a full channel drops the newest report. The stream closes when its
/// interface is disposed, and dropping the stream unsubscribes it.
pub struct ReportStream<T: Clone + Send + Sync + 'static> {
    receiver: Receiver<ReportEvent<T>>,
    subscribers: Weak<Subscribers<T>>,
    id: SubscriptionId,
}

impl<T: Clone + Send + Sync + 'static> ReportStream<T> {
    pub(crate) fn attach(subscribers: &Arc<Subscribers<T>>, capacity: usize) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));

        let id = subscribers.add(Arc::new(move |event: &ReportEvent<T>| {
            if let Err(e) = sender.try_send(event.clone()) {
                match e {
                    crossbeam_channel::TrySendError::Full(_) => {
                        log::trace!("Report stream full, dropping report");
                    }
                    crossbeam_channel::TrySendError::Disconnected(_) => {
                        log::trace!("Report stream receiver gone");
                    }
                }
            }
        }));

        ReportStream {
            receiver,
            subscribers: Arc::downgrade(subscribers),
            id,
        }
    }

    /// Receive the next report, blocking until one arrives.
    ///
    /// Only useful when `update()` runs on another thread.
    pub fn recv(&self) -> Result<ReportEvent<T>> {
        self.receiver.recv().map_err(|_| ClientError::StreamClosed)
    }

    /// Try to receive a report without blocking.
    pub fn try_recv(&self) -> Option<ReportEvent<T>> {
        self.receiver.try_recv().ok()
    }

    /// Receive a report with a timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ReportEvent<T>> {
        self.receiver.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => ClientError::Timeout,
            crossbeam_channel::RecvTimeoutError::Disconnected => ClientError::StreamClosed,
        })
    }

    /// Take every report queued so far.
    pub fn drain(&self) -> Vec<ReportEvent<T>> {
        self.receiver.try_iter().collect()
    }

    /// Number of reports waiting in the channel.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Check if the stream is still subscribed to a live interface.
    pub fn is_active(&self) -> bool {
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.contains(self.id))
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for ReportStream<T> {
    fn drop(&mut self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            subscribers.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeValue;

    fn event(value: u32) -> ReportEvent<u32> {
        ReportEvent {
            timestamp: TimeValue::default(),
            sensor: 0,
            value,
        }
    }

    #[test]
    fn test_stream_receives_in_order() {
        let subscribers = Arc::new(Subscribers::new());
        let stream = ReportStream::attach(&subscribers, 8);

        for v in 1..=3 {
            subscribers.emit(&event(v));
        }

        let values: Vec<u32> = stream.drain().into_iter().map(|e| e.value).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_full_stream_drops_newest() {
        let subscribers = Arc::new(Subscribers::new());
        let stream = ReportStream::attach(&subscribers, 2);

        for v in 1..=5 {
            subscribers.emit(&event(v));
        }

        assert_eq!(stream.len(), 2);
        assert_eq!(stream.try_recv().map(|e| e.value), Some(1));
        assert_eq!(stream.try_recv().map(|e| e.value), Some(2));
    }

    #[test]
    fn test_drop_unsubscribes() {
        let subscribers: Arc<Subscribers<u32>> = Arc::new(Subscribers::new());
        let stream = ReportStream::attach(&subscribers, 4);
        assert!(stream.is_active());
        assert_eq!(subscribers.len(), 1);

        drop(stream);
        assert_eq!(subscribers.len(), 0);
    }

    #[test]
    fn test_cleared_subscribers_close_stream() {
        let subscribers: Arc<Subscribers<u32>> = Arc::new(Subscribers::new());
        let stream = ReportStream::attach(&subscribers, 4);

        subscribers.clear();
        assert!(!stream.is_active());
        assert!(matches!(stream.recv(), Err(ClientError::StreamClosed)));
    }

    #[test]
    fn test_recv_timeout() {
        let subscribers: Arc<Subscribers<u32>> = Arc::new(Subscribers::new());
        let stream = ReportStream::attach(&subscribers, 4);
        assert!(matches!(
            stream.recv_timeout(Duration::from_millis(10)),
            Err(ClientError::Timeout)
        ));
    }
}
