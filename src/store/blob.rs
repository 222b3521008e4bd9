//! Blob framing: the unit of durable storage
//!
//! ```text
//! [type: 1 byte][payload]
//! ```

use serde::{Deserialize, Serialize};

/// Type tag for blobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlobType {
    /// An internal tree node
    Node,
    /// Opaque bytes written through the raw store API
    Raw,
}

impl BlobType {
    pub fn as_byte(&self) -> u8 {
        match self {
            BlobType::Node => 0,
            BlobType::Raw => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(BlobType::Node),
            1 => Some(BlobType::Raw),
            _ => None,
        }
    }
}

/// A typed chunk of data
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub blob_type: BlobType,
    pub data: Vec<u8>,
}

impl Blob {
    pub fn new(blob_type: BlobType, data: Vec<u8>) -> Self {
        Blob { blob_type, data }
    }

    /// Frame the blob for storage
    pub fn encode(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(self.data.len() + 1);
        output.push(self.blob_type.as_byte());
        output.extend_from_slice(&self.data);
        output
    }

    /// Parse a framed blob read from storage
    pub fn decode(data: &[u8]) -> crate::Result<Self> {
        let (&tag, payload) = data
            .split_first()
            .ok_or_else(|| crate::Error::Corruption("Empty blob".into()))?;

        let blob_type = BlobType::from_byte(tag)
            .ok_or_else(|| crate::Error::Corruption(format!("Invalid blob type: {tag}")))?;

        Ok(Blob {
            blob_type,
            data: payload.to_vec(),
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}
