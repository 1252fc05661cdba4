use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One unit of payload plus attribute metadata to be transferred.
///
/// The queue never looks inside the payload or the attributes; only the
/// prioritizer does. Once enqueued, the store owns its own copy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DataPacket {
    #[serde(default)]
    attributes: BTreeMap<String, String>,
    #[serde(default)]
    payload: Vec<u8>,
}

impl DataPacket {
    pub fn new(attributes: BTreeMap<String, String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            attributes,
            payload: payload.into(),
        }
    }

    /// Packet with a payload and no attributes.
    pub fn from_payload(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(BTreeMap::new(), payload)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Bytes counted against the queue's size ceiling (payload only).
    pub fn size_bytes(&self) -> u64 {
        self.payload.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_counts_payload_only() {
        let packet = DataPacket::from_payload(b"hello".to_vec()).with_attribute("filename", "a.txt");
        assert_eq!(packet.size_bytes(), 5);
        assert_eq!(packet.attribute("filename"), Some("a.txt"));
        assert_eq!(packet.attribute("missing"), None);
    }

    #[test]
    fn missing_fields_deserialize_to_empty() {
        let packet: DataPacket = serde_json::from_str("{}").unwrap();
        assert!(packet.attributes().is_empty());
        assert_eq!(packet.size_bytes(), 0);
    }
}
