//! CBOR load and save transforms.
//!
//! Ready-made transforms for collections whose values implement serde's
//! traits. Pass them straight to
//! [`Mailroom::create_collection`](crate::Mailroom::create_collection).

use crate::error::TransformError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Decodes a stored CBOR value.
pub fn cbor_load<T: DeserializeOwned>(raw: &[u8]) -> Result<T, TransformError> {
    ciborium::from_reader(raw).map_err(|e| TransformError::new(format!("cbor decode: {e}")))
}

/// Encodes a value as CBOR for storage.
pub fn cbor_save<T: Serialize>(value: &T) -> Result<Bytes, TransformError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)
        .map_err(|e| TransformError::new(format!("cbor encode: {e}")))?;
    Ok(Bytes::from(buf))
}
