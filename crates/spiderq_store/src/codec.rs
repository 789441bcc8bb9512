//! JSON text codec for the single payload column every store uses.
//!
//! `decode(encode(v)) == v` for every JSON-representable value. Decoding never
//! yields a partial value: malformed text is a [`DbError::Decode`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DbError, Result};

/// Serialize a value to its stored text form.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(DbError::Encode)
}

/// Parse stored text back into a value.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T> {
    decode_from("json", text)
}

/// Like [`decode`], reporting the table the text was read from.
pub(crate) fn decode_from<T: DeserializeOwned>(context: &str, text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|source| DbError::Decode {
        context: context.to_string(),
        source,
    })
}
