//! Compact three-part token encoding (JWS, HS256).
//!
//! The codec only signs and verifies. Expiry is judged by the payload types
//! against the injected clock, so the library's own `exp` handling is off.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenCodecError {
    #[error("token signing failed: {0}")]
    Encode(String),

    #[error("token signature invalid")]
    BadSignature,

    #[error("token malformed: {0}")]
    Malformed(String),
}

#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    pub fn hs256(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn encode<T: Serialize>(&self, payload: &T) -> Result<String, TokenCodecError> {
        encode(&Header::new(Algorithm::HS256), payload, &self.encoding)
            .map_err(|e| TokenCodecError::Encode(e.to_string()))
    }

    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<T, TokenCodecError> {
        decode::<T>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenCodecError::BadSignature,
                _ => TokenCodecError::Malformed(e.to_string()),
            })
    }
}

impl core::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        value: u32,
    }

    #[test]
    fn token_has_three_parts_and_decodes() {
        let codec = TokenCodec::hs256(b"secret");
        let token = codec.encode(&Sample { value: 7 }).unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert_eq!(codec.decode::<Sample>(&token).unwrap(), Sample { value: 7 });
    }

    #[test]
    fn other_key_is_rejected() {
        let token = TokenCodec::hs256(b"secret").encode(&Sample { value: 1 }).unwrap();
        let err = TokenCodec::hs256(b"other").decode::<Sample>(&token).unwrap_err();
        assert_eq!(err, TokenCodecError::BadSignature);
    }

    #[test]
    fn garbage_is_malformed() {
        let err = TokenCodec::hs256(b"secret").decode::<Sample>("not.a.jwt").unwrap_err();
        assert!(matches!(err, TokenCodecError::Malformed(_)));
    }
}
