use tokio::sync::mpsc;

use httpscope_types::Record;

use crate::collector::SharedCollector;

/// Forwards parsed records from a monitor to a collector
pub trait Transport: Send {
    fn send(&self, record: Record);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&self, record: Record) {
        (**self).send(record)
    }
}

/// Synchronous hand-off straight into a shared collector
#[derive(Clone)]
pub struct DirectTransport {
    collector: SharedCollector,
}

impl DirectTransport {
    pub fn new(collector: SharedCollector) -> Self {
        Self { collector }
    }
}

impl Transport for DirectTransport {
    fn send(&self, record: Record) {
        self.collector.add(record);
    }
}

/// Hand-off through an unbounded channel
#[derive(Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Record>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::UnboundedSender<Record>) -> Self {
        Self { tx }
    }

    /// Create a transport together with its receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Record>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, record: Record) {
        if self.tx.send(record).is_err() {
            tracing::debug!("record receiver closed, dropping record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::Cumulative;
    use chrono::Utc;
    use httpscope_types::{SystemClock, UriMetric};
    use std::sync::Arc;

    #[test]
    fn test_direct_transport_feeds_collector() {
        let collector = SharedCollector::new(Cumulative::new(Arc::new(SystemClock)));
        let transport = DirectTransport::new(collector.clone());

        transport.send(Record::new("/a", Utc::now(), 10, 200, "GET"));
        transport.send(Record::new("/a", Utc::now(), 5, 200, "GET"));

        assert_eq!(collector.lookup("/a", UriMetric::Hits), 2);
        assert_eq!(collector.lookup("/a", UriMetric::Size), 15);
    }

    #[test]
    fn test_channel_transport_delivers_in_order() {
        let (transport, mut rx) = ChannelTransport::channel();
        transport.send(Record::new("/first", Utc::now(), 1, 200, "GET"));
        transport.send(Record::new("/second", Utc::now(), 1, 200, "GET"));

        assert_eq!(rx.try_recv().unwrap().uri, "/first");
        assert_eq!(rx.try_recv().unwrap().uri, "/second");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_channel_transport_survives_closed_receiver() {
        let (transport, rx) = ChannelTransport::channel();
        drop(rx);
        transport.send(Record::new("/a", Utc::now(), 1, 200, "GET"));
    }
}
