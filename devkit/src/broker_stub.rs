/*!
Mock broker for tests without an MQTT server

Subscribes to a `Dispatcher` like the real `MqttPublisher` and records every
signal as the message that would have been published: the topic from
`mqtt::topic_for` and the JSON payload.
*/

use anyhow::Result;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use warden_kernel::events::{Signal, SignalListener};
use warden_kernel::mqtt::topic_for;

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl MockMessage {
    /// Value of the `signal` tag, e.g. "site-update".
    pub fn signal_name(&self) -> Option<String> {
        serde_json::from_slice::<Value>(&self.payload)
            .ok()?
            .get("signal")?
            .as_str()
            .map(str::to_string)
    }
}

#[derive(Clone, Default)]
pub struct MockBroker {
    published: Arc<Mutex<Vec<MockMessage>>>,
    failing: Arc<Mutex<bool>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following delivery fail, like a broker that went away.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn published_messages(&self) -> Vec<MockMessage> {
        self.published.lock().clone()
    }

    pub fn find_messages_by_topic(&self, topic: &str) -> Vec<MockMessage> {
        self.published
            .lock()
            .iter()
            .filter(|msg| msg.topic == topic)
            .cloned()
            .collect()
    }

    /// Signal names in the order they were published.
    pub fn signal_names(&self) -> Vec<String> {
        self.published
            .lock()
            .iter()
            .filter_map(MockMessage::signal_name)
            .collect()
    }

    /// Parses the last message published on `topic`.
    pub fn last_json_message<T: DeserializeOwned>(&self, topic: &str) -> Result<Option<T>> {
        match self.find_messages_by_topic(topic).last() {
            Some(msg) => Ok(Some(serde_json::from_slice(&msg.payload)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

impl SignalListener for MockBroker {
    fn name(&self) -> &str {
        "mock-broker"
    }

    fn handle(&self, signal: &Signal) -> Result<()> {
        if *self.failing.lock() {
            anyhow::bail!("mock broker unavailable");
        }
        let message = MockMessage {
            topic: topic_for(signal.kind()),
            payload: serde_json::to_vec(signal)?,
        };
        tracing::debug!(topic = %message.topic, bytes = message.payload.len(), "[mock] published");
        self.published.lock().push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_kernel::events::{Dispatcher, NotificationRouter};
    use warden_kernel::SiteRecord;

    #[test]
    fn test_records_signals_as_messages() {
        let broker = Arc::new(MockBroker::new());
        let dispatcher = Dispatcher::new();
        dispatcher.subscribe_all(broker.clone());

        let site = SiteRecord::new("s1", "https://acme.test");
        dispatcher.raise(Signal::SiteShow { site: site.clone() });
        dispatcher.raise(Signal::DashboardUpdate { site });

        assert_eq!(broker.signal_names(), vec!["site-show", "dashboard-update"]);
        let last: Option<Value> = broker
            .last_json_message("warden/sites/dashboard-update@v1")
            .unwrap();
        assert_eq!(last.unwrap()["site"]["id"], "s1");
    }

    #[test]
    fn test_failing_broker_records_nothing() {
        let broker = MockBroker::new();
        broker.set_failing(true);

        let site = SiteRecord::new("s1", "https://acme.test");
        assert!(broker.handle(&Signal::SiteDelete { site }).is_err());
        assert!(broker.published_messages().is_empty());
    }
}
