use serde::{Deserialize, Serialize};

use crate::models::trip::Trip;

/// Envelope for everything published on the trip exchange.
///
/// `owner_id` is the identity the event concerns (rider or driver, depending on
/// the routing key). `data` is the pre-serialized payload whose schema is
/// implied by the routing key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmqpMessage {
    #[serde(rename = "ownerID")]
    pub owner_id: String,
    #[serde(default, with = "opaque_bytes")]
    pub data: Option<Vec<u8>>,
}

impl AmqpMessage {
    pub fn new(owner_id: impl Into<String>, data: Option<Vec<u8>>) -> Self {
        Self {
            owner_id: owner_id.into(),
            data,
        }
    }
}

/// Payload of `trip.created` and `driver.cmd.request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripEventData {
    pub trip: Trip,
}

/// Byte payloads travel as standard base64 strings, `null` when absent.
mod opaque_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Option<Vec<u8>>, ser: S) -> Result<S::Ok, S::Error> {
        match data {
            Some(bytes) => ser.serialize_str(&STANDARD.encode(bytes)),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Vec<u8>>, D::Error> {
        let raw: Option<String> = Option::deserialize(de)?;
        raw.map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
