use rkyv::{rancor, Archive, Deserialize, Serialize};

/// Plain data that may cross the execution-context boundary as a call
/// argument, callback result, or event payload. `Bytes` moves buffers
/// (serialized deltas, most of the time) through the channel whole.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum ArgValue {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

/// One message between two paired execution contexts. Calls and callbacks
/// correlate through `id`; events are fire-and-forget.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum Envelope {
    Event {
        event: String,
        data: Option<ArgValue>,
    },
    Call {
        id: u32,
        receiver: String,
        method: String,
        args: Vec<ArgValue>,
        with_callback: bool,
    },
    Callback {
        id: u32,
        args: Vec<ArgValue>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("envelope serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("envelope deserialization failed: {0}")]
    Deserialize(rancor::Error),
}

impl Envelope {
    /// Encodes the envelope for transports that carry raw bytes rather than
    /// structured messages.
    pub fn serialize(&self) -> Result<Vec<u8>, BrokerError> {
        rkyv::to_bytes::<rancor::Error>(self)
            .map(|aligned| aligned.into_vec())
            .map_err(BrokerError::Serialize)
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, BrokerError> {
        rkyv::from_bytes::<Self, rancor::Error>(data).map_err(BrokerError::Deserialize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_roundtrip() {
        let envelope = Envelope::Call {
            id: 17,
            receiver: "game".to_owned(),
            method: "spawn".to_owned(),
            args: vec![
                ArgValue::UInt(3),
                ArgValue::Str("assault".to_owned()),
                ArgValue::Bytes(vec![1, 2, 3]),
            ],
            with_callback: true,
        };

        let bytes = envelope.serialize().unwrap();
        let decoded = Envelope::deserialize(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(Envelope::deserialize(&[0xde, 0xad]).is_err());
    }
}
