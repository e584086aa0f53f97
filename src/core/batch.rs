//! Purpose: Describe one submission to the engine and validate it locally.
//! Exports: `StreamItem`, `StorageCredentials`, `Batch`.
//! Role: Everything here is checked before the engine boundary is crossed.
//! Invariants: A batch that fails `validate` never reaches the engine.
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

/// One requested transfer unit: read `length` bytes at `offset` of `source`
/// into `destination`.
///
/// The destination buffer is allocated and pre-sized by the caller (for
/// example `vec![0u8; length]`); the driver only writes into it and hands it
/// back once the batch has drained. It is never resized.
#[derive(Debug)]
pub struct StreamItem {
    pub source: String,
    pub offset: u64,
    pub length: u64,
    pub destination: Vec<u8>,
}

impl StreamItem {
    pub fn new(source: impl Into<String>, offset: u64, length: u64, destination: Vec<u8>) -> Self {
        Self {
            source: source.into(),
            offset,
            length,
            destination,
        }
    }
}

/// Object-storage scoping for a batch. Every field is independently optional;
/// an absent field crosses the boundary as "no value", which is distinct from
/// an empty string (some engines treat `""` as a valid empty credential).
/// All fields absent means local filesystem / ambient credentials.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct StorageCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl StorageCredentials {
    pub fn is_empty(&self) -> bool {
        self.key.is_none()
            && self.secret.is_none()
            && self.token.is_none()
            && self.region.is_none()
            && self.endpoint.is_none()
    }
}

/// An ordered set of items submitted atomically. Items are correlated with
/// completions by their zero-based position here.
#[derive(Debug, Default)]
pub struct Batch {
    pub(crate) items: Vec<StreamItem>,
    pub(crate) credentials: StorageCredentials,
}

impl Batch {
    pub fn new(items: Vec<StreamItem>) -> Self {
        Self {
            items,
            credentials: StorageCredentials::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: StorageCredentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.items.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgument).with_message("batch is empty"));
        }
        for (index, item) in self.items.iter().enumerate() {
            let index = index as u32;
            if item.length == 0 {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_index(index)
                    .with_message("item length must be positive"));
            }
            if (item.destination.len() as u64) < item.length {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_index(index)
                    .with_message(format!(
                        "destination holds {} bytes, item needs {}",
                        item.destination.len(),
                        item.length
                    )));
            }
            // Sources cross the boundary as C strings.
            if item.source.as_bytes().contains(&0) {
                return Err(Error::new(ErrorKind::InvalidArgument)
                    .with_index(index)
                    .with_message("source contains a nul byte"));
            }
        }
        // Credentials cross as C strings too; a nul byte here must not be
        // mistaken for an absent field.
        for (name, value) in [
            ("key", &self.credentials.key),
            ("secret", &self.credentials.secret),
            ("token", &self.credentials.token),
            ("region", &self.credentials.region),
            ("endpoint", &self.credentials.endpoint),
        ] {
            if let Some(value) = value {
                if value.as_bytes().contains(&0) {
                    return Err(Error::new(ErrorKind::InvalidArgument)
                        .with_message(format!("credential {name} contains a nul byte")));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Batch, StorageCredentials, StreamItem};
    use crate::core::error::ErrorKind;

    fn item(length: u64) -> StreamItem {
        StreamItem::new("weights.bin", 0, length, vec![0u8; length as usize])
    }

    #[test]
    fn valid_batch_passes() {
        let batch = Batch::new(vec![item(10), item(20), item(30)]);
        assert_eq!(batch.len(), 3);
        batch.validate().expect("valid");
    }

    #[test]
    fn empty_batch_is_invalid() {
        let err = Batch::new(Vec::new()).validate().expect_err("empty");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn zero_length_item_is_invalid() {
        let batch = Batch::new(vec![item(10), item(0)]);
        let err = batch.validate().expect_err("zero length");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.index(), Some(1));
    }

    #[test]
    fn undersized_destination_is_invalid() {
        let short = StreamItem::new("weights.bin", 0, 64, vec![0u8; 16]);
        let err = Batch::new(vec![short]).validate().expect_err("undersized");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.index(), Some(0));
    }

    #[test]
    fn nul_in_source_is_invalid() {
        let bad = StreamItem::new("weights\0bin", 0, 4, vec![0u8; 4]);
        let err = Batch::new(vec![bad]).validate().expect_err("nul byte");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn nul_in_credential_is_invalid() {
        let creds = StorageCredentials {
            secret: Some("abc\0def".to_string()),
            ..StorageCredentials::default()
        };
        let batch = Batch::new(vec![item(4)]).with_credentials(creds);
        let err = batch.validate().expect_err("nul byte");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(err.message(), Some("credential secret contains a nul byte"));
    }

    #[test]
    fn absent_credentials_stay_absent_through_serde() {
        let creds = StorageCredentials {
            region: Some("us-east-1".to_string()),
            ..StorageCredentials::default()
        };
        let json = serde_json::to_string(&creds).expect("serialize");
        assert_eq!(json, r#"{"region":"us-east-1"}"#);
        let back: StorageCredentials = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, creds);
        assert!(back.key.is_none());
        assert!(!back.is_empty());
        assert!(StorageCredentials::default().is_empty());
    }
}
