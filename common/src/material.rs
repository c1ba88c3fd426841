// SPDX-FileCopyrightText: 2023 Phoenix R&D GmbH <hello@phnx.im>
//
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Opaque cryptographic material as it crosses the wire and the database.
//!
//! The server never unwraps any of this: clients encapsulate symmetric keys
//! under each recipient's ML-KEM public key and encrypt content with
//! AES-256-GCM. All the server checks is that a blob is well-formed base64
//! and, where the protocol fixes one, its decoded size.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accepted decoded sizes of an ML-KEM public key (ML-KEM-512, -768, -1024).
pub const ML_KEM_PUBLIC_KEY_SIZES: [usize; 3] = [800, 1184, 1568];

/// Decoded size of an AES initialization vector.
pub const IV_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MaterialError {
    #[error("invalid base64: {0}")]
    InvalidBase64(String),
    #[error("invalid public key size: {0} bytes, expected one of {ML_KEM_PUBLIC_KEY_SIZES:?}")]
    InvalidPublicKeySize(usize),
    #[error("invalid IV size: {0} bytes, expected {IV_LEN}")]
    InvalidIvSize(usize),
    #[error("empty key material")]
    Empty,
}

fn decoded_len(value: &str) -> Result<usize, MaterialError> {
    BASE64
        .decode(value)
        .map(|bytes| bytes.len())
        .map_err(|error| MaterialError::InvalidBase64(error.to_string()))
}

/// A symmetric room key encapsulated under one recipient's public key.
///
/// No size constraint: encapsulation output depends on the client's chosen
/// parameter set and stays opaque to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct WrappedKey(String);

impl WrappedKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for WrappedKey {
    type Error = MaterialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(MaterialError::Empty);
        }
        decoded_len(&value)?;
        Ok(Self(value))
    }
}

impl From<WrappedKey> for String {
    fn from(key: WrappedKey) -> Self {
        key.0
    }
}

/// AES-256-GCM ciphertext of a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct Ciphertext(String);

impl Ciphertext {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap plain text the way system messages are stored: base64 of the
    /// UTF-8 bytes. Clients see `message_type = system` and render without
    /// decrypting.
    pub fn from_plain_text(text: &str) -> Self {
        Self(BASE64.encode(text.as_bytes()))
    }
}

impl TryFrom<String> for Ciphertext {
    type Error = MaterialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(MaterialError::Empty);
        }
        decoded_len(&value)?;
        Ok(Self(value))
    }
}

impl From<Ciphertext> for String {
    fn from(ciphertext: Ciphertext) -> Self {
        ciphertext.0
    }
}

/// Initialization vector of a message, base64 of exactly [`IV_LEN`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct Iv(String);

impl Iv {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The all-zeros placeholder IV attached to system messages.
    pub fn dummy() -> Self {
        Self(BASE64.encode([b'0'; IV_LEN]))
    }
}

impl TryFrom<String> for Iv {
    type Error = MaterialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let len = decoded_len(&value)?;
        if len != IV_LEN {
            return Err(MaterialError::InvalidIvSize(len));
        }
        Ok(Self(value))
    }
}

impl From<Iv> for String {
    fn from(iv: Iv) -> Self {
        iv.0
    }
}

/// A user's long-term ML-KEM public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "String", into = "String")]
#[sqlx(transparent)]
pub struct MlKemPublicKey(String);

impl MlKemPublicKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MlKemPublicKey {
    type Error = MaterialError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let len = decoded_len(&value)?;
        if !ML_KEM_PUBLIC_KEY_SIZES.contains(&len) {
            return Err(MaterialError::InvalidPublicKeySize(len));
        }
        Ok(Self(value))
    }
}

impl From<MlKemPublicKey> for String {
    fn from(key: MlKemPublicKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base64_of(len: usize) -> String {
        BASE64.encode(vec![7u8; len])
    }

    #[test]
    fn wrapped_key_accepts_any_base64() {
        assert!(WrappedKey::try_from(base64_of(17)).is_ok());
        assert!(WrappedKey::try_from(base64_of(1536)).is_ok());
    }

    #[test]
    fn wrapped_key_rejects_garbage() {
        assert_eq!(
            WrappedKey::try_from(String::new()),
            Err(MaterialError::Empty)
        );
        assert!(matches!(
            WrappedKey::try_from("not base64!!".to_owned()),
            Err(MaterialError::InvalidBase64(_))
        ));
    }

    #[test]
    fn public_key_sizes_are_enforced() {
        for size in ML_KEM_PUBLIC_KEY_SIZES {
            assert!(MlKemPublicKey::try_from(base64_of(size)).is_ok());
        }
        assert_eq!(
            MlKemPublicKey::try_from(base64_of(1000)),
            Err(MaterialError::InvalidPublicKeySize(1000))
        );
    }

    #[test]
    fn iv_must_decode_to_sixteen_bytes() {
        assert!(Iv::try_from(base64_of(IV_LEN)).is_ok());
        assert_eq!(
            Iv::try_from(base64_of(12)),
            Err(MaterialError::InvalidIvSize(12))
        );
    }

    #[test]
    fn dummy_iv_is_well_formed() {
        let dummy = Iv::dummy();
        assert!(Iv::try_from(String::from(dummy)).is_ok());
    }

    #[test]
    fn system_text_round_trips_through_base64() {
        let ciphertext = Ciphertext::from_plain_text("alice joined the room");
        let decoded = BASE64.decode(ciphertext.as_str()).unwrap();
        assert_eq!(decoded, b"alice joined the room");
    }
}
