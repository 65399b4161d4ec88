use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{error, info, warn};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS, RecvTimeoutError, Transport};
use serde_json::Value;

use super::SampleSource;
use crate::config::MqttConfig;
use crate::error::SourceError;
use crate::types::{DatabaseTask, RawSample};
use crate::utils::now_millis;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Where raw documents go when persistence is enabled.
pub struct DocumentSink {
    pub sender: Sender<DatabaseTask>,
    pub session_id: String,
}

pub struct MqttSource {
    config: MqttConfig,
    documents: Option<DocumentSink>,
    forward_samples: bool,
}

impl MqttSource {
    pub fn new(config: MqttConfig) -> Self {
        Self {
            config,
            documents: None,
            forward_samples: true,
        }
    }

    /// Also store every received JSON document.
    pub fn with_documents(mut self, documents: DocumentSink) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Store documents only, without feeding the sample channel.
    pub fn documents_only(mut self) -> Self {
        self.forward_samples = false;
        self
    }

    fn options(&self) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(
            self.config.client_id.clone(),
            self.config.broker.clone(),
            self.config.port,
        );

        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            mqtt_options.set_credentials(user.clone(), pass.clone());
        }

        mqtt_options.set_keep_alive(Duration::from_secs(u64::from(self.config.keep_alive.max(5))));

        if self.config.use_tls {
            mqtt_options.set_transport(Transport::tls_with_default_config());
        }

        mqtt_options
    }

    fn store_document(&self, document: Value, topic: &str, received_at_ms: i64) {
        if let Some(sink) = &self.documents {
            let task = DatabaseTask::StoreDocument {
                document,
                topic: topic.to_string(),
                session_id: sink.session_id.clone(),
                received_at_ms,
            };
            if let Err(e) = sink.sender.try_send(task) {
                warn!("Dropping document, persistence queue unavailable: {}", e);
            }
        }
    }
}

impl SampleSource for MqttSource {
    fn name(&self) -> &str {
        "mqtt"
    }

    fn run(&mut self, sink: &Sender<RawSample>, shutdown: &AtomicBool) -> Result<(), SourceError> {
        let qos = qos_from_level(self.config.qos)?;
        let (client, mut connection) = Client::new(self.options(), 10);
        client.subscribe(self.config.topic.clone(), qos)?;

        info!(
            "Connecting to broker {}:{} (topic {})",
            self.config.broker, self.config.port, self.config.topic
        );

        while !shutdown.load(Ordering::Relaxed) {
            match connection.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(_)))) => info!("Connected to broker"),
                Ok(Ok(Event::Incoming(Packet::Publish(publish)))) if topic_matches(&self.config.topic, &publish.topic) => {
                    let received_at_ms = now_millis();
                    match decode_payload(&publish.payload) {
                        Ok((document, raw)) => {
                            self.store_document(document, &publish.topic, received_at_ms);
                            if self.forward_samples && sink.send(raw.stamped(received_at_ms)).is_err() {
                                info!("Sample channel disconnected, MQTT source exiting");
                                break;
                            }
                        }
                        Err(e) => warn!("Invalid sensor data: {}", e),
                    }
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    error!("MQTT connection error: {}", e);
                    return Err(e.into());
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if let Err(e) = client.disconnect() {
            warn!("MQTT disconnect failed: {}", e);
        }
        Ok(())
    }
}

fn qos_from_level(level: u8) -> Result<QoS, SourceError> {
    match level {
        0 => Ok(QoS::AtMostOnce),
        1 => Ok(QoS::AtLeastOnce),
        2 => Ok(QoS::ExactlyOnce),
        other => Err(SourceError::Settings(format!("invalid QoS level {}", other))),
    }
}

/// Subscription filters may contain `+` and `#`, so incoming topics are
/// matched against the filter rather than compared.
fn topic_matches(filter: &str, topic: &str) -> bool {
    rumqttc::mqttbytes::matches(topic, filter)
}

/// Decode one publish payload into the stored document and the raw sample.
///
/// Only the payload itself can fail here. Field types are not checked: a
/// document with a missing or malformed axis or timestamp is still stored,
/// and the buffer rejects the sample.
pub fn decode_payload(payload: &[u8]) -> Result<(Value, RawSample), String> {
    let payload_str = std::str::from_utf8(payload).map_err(|e| format!("Invalid UTF-8: {}", e))?;

    let document: Value =
        serde_json::from_str(payload_str).map_err(|e| format!("JSON parsing error: {}", e))?;
    if !document.is_object() {
        return Err(format!("expected a JSON object, got {}", document));
    }

    let raw = RawSample::from_document(&document);
    Ok((document, raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    #[test]
    fn decodes_sensor_payload() {
        let (document, raw) = decode_payload(br#"{"x": 0.12, "y": -0.5, "z": 9.81}"#).unwrap();
        assert_eq!(document["z"], 9.81);
        let sample = raw.stamped(10).validate().unwrap();
        assert_eq!((sample.x(), sample.y(), sample.z()), (0.12, -0.5, 9.81));
        assert_eq!(sample.captured_at(), 10);
    }

    #[test]
    fn keeps_document_with_missing_axis() {
        let (document, raw) = decode_payload(br#"{"x": 1, "y": 2, "unit": "dps"}"#).unwrap();
        assert_eq!(document["unit"], "dps");
        assert_eq!(raw.stamped(1).validate(), Err(ValidationError::MissingAxis('z')));
    }

    #[test]
    fn keeps_document_with_float_or_text_timestamp() {
        let (document, raw) =
            decode_payload(br#"{"x": 1, "y": 2, "z": 3, "timestamp": 1718000000.25}"#).unwrap();
        assert_eq!(document["timestamp"], 1718000000.25);
        assert_eq!(raw.stamped(1).validate().unwrap().captured_at(), 1_718_000_000_250);

        let (document, raw) =
            decode_payload(br#"{"x": 1, "y": 2, "z": 3, "timestamp": "12:00:01"}"#).unwrap();
        assert_eq!(document["timestamp"], "12:00:01");
        assert!(matches!(
            raw.stamped(1).validate(),
            Err(ValidationError::NonNumericTimestamp(_))
        ));
    }

    #[test]
    fn wildcard_subscriptions_match_publish_topics() {
        assert!(topic_matches("sensor/gyro", "sensor/gyro"));
        assert!(topic_matches("sensor/#", "sensor/gyro"));
        assert!(topic_matches("sensor/+/data", "sensor/gyro/data"));
        assert!(!topic_matches("sensor/+", "sensor/gyro/data"));
        assert!(!topic_matches("sensor/gyro", "sensor/climate"));
        assert!(!topic_matches("sensor/#", "home/gyro"));
    }

    #[test]
    fn rejects_non_json_and_non_objects() {
        assert!(decode_payload(b"offline").is_err());
        assert!(decode_payload(b"[1, 2, 3]").is_err());
        assert!(decode_payload(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn qos_levels_map_to_rumqttc() {
        assert_eq!(qos_from_level(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(qos_from_level(2).unwrap(), QoS::ExactlyOnce);
        assert!(qos_from_level(3).is_err());
    }
}
