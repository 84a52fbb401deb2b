use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use tokio::task;

use crate::config::MqttConf;
use crate::events::{Signal, SignalKind, SignalListener};

/// Topic a signal kind is published on.
/// Ex: `DashboardUpdate` -> "warden/sites/dashboard-update@v1"
pub fn topic_for(kind: SignalKind) -> String {
    format!("warden/sites/{}@v1", kind.as_str())
}

/// Forwards every signal it receives to the MQTT broker as JSON.
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Creates the client and spawns the task driving its event loop.
    /// Must be called from within a tokio runtime.
    pub fn connect(conf: &MqttConf) -> Self {
        let mut opts = MqttOptions::new("warden-kernel", &conf.host, conf.port);
        opts.set_keep_alive(Duration::from_secs(15));
        let (client, mut eventloop) = AsyncClient::new(opts, 64);

        let broker = format!("{}:{}", conf.host, conf.port);
        task::spawn(async move {
            loop {
                if let Err(e) = eventloop.poll().await {
                    tracing::warn!(%broker, "MQTT error: {e:?}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        });

        Self { client }
    }
}

impl SignalListener for MqttPublisher {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn handle(&self, signal: &Signal) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(signal)?;
        self.client
            .try_publish(topic_for(signal.kind()), QoS::AtLeastOnce, false, payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_for() {
        assert_eq!(topic_for(SignalKind::DashboardUpdate), "warden/sites/dashboard-update@v1");
        assert_eq!(topic_for(SignalKind::SiteDelete), "warden/sites/site-delete@v1");
    }
}
