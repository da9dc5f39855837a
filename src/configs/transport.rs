use serde::{Deserialize, Serialize};

/// Voice relay the UDP transport streams RTP packets to.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct TransportConfig {
    /// `host:port` of the voice relay.
    pub endpoint: String,
    /// RTP payload type stamped on every packet (dynamic range: 96-127).
    pub payload_type: u8,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:5004".into(),
            payload_type: 96,
        }
    }
}
