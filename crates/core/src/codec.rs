// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Codec SPI: symmetric value<->byte encoding with an explicit captured-type
//! token standing in for the source toolkit's anonymous-subclass type
//! tokens. A [`TypeTag`] rides alongside the bytes so that a decoder which
//! only sees a `Vec<u8>` at a dynamic call site (e.g. a cache manager
//! replaying a remote eviction key it never observed the static Rust type
//! for) still knows what shape to expect.

use std::fmt;
use thiserror::Error;

/// A captured description of a value's shape, used by [`Codec::decode`]
/// to validate the target type and by dynamic call sites (the cache
/// invalidation bus) to interpret opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    Unit,
    Bool,
    I64,
    F64,
    Str,
    Bytes,
    Uuid,
    Timestamp,
    List(Box<TypeTag>),
    Map(Box<TypeTag>, Box<TypeTag>),
    /// A named struct/enum whose shape is opaque to the codec; the name is
    /// used only for diagnostics, not for dispatch.
    Struct(&'static str),
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Unit => write!(f, "unit"),
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::I64 => write!(f, "i64"),
            TypeTag::F64 => write!(f, "f64"),
            TypeTag::Str => write!(f, "str"),
            TypeTag::Bytes => write!(f, "bytes"),
            TypeTag::Uuid => write!(f, "uuid"),
            TypeTag::Timestamp => write!(f, "timestamp"),
            TypeTag::List(inner) => write!(f, "list<{inner}>"),
            TypeTag::Map(k, v) => write!(f, "map<{k}, {v}>"),
            TypeTag::Struct(name) => write!(f, "struct {name}"),
        }
    }
}

/// Failure modes for [`Codec::encode`] and [`Codec::decode`].
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed ({cause}): {message}")]
    Decode {
        cause: DecodeFailureCause,
        message: String,
    },
}

/// Why a decode attempt failed, matching the source contract's
/// `input-null | hint-null` distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeFailureCause {
    /// The byte slice was empty where a value was required.
    InputEmpty,
    /// No [`TypeTag`] was supplied where one was required to disambiguate.
    HintMissing,
    /// The bytes did not parse as the hinted shape.
    Malformed,
}

impl fmt::Display for DecodeFailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFailureCause::InputEmpty => write!(f, "input-empty"),
            DecodeFailureCause::HintMissing => write!(f, "hint-missing"),
            DecodeFailureCause::Malformed => write!(f, "malformed"),
        }
    }
}

/// Symmetric encode/decode of a value to bytes, carrying a [`TypeTag`]
/// through `decode` so container generics survive round-trips that cross
/// a dynamic (non-generic) boundary.
///
/// Implementations must satisfy: `decode(encode(v)?, tag_of(v))? == v` for
/// every representable `v`. Two implementations are interchangeable only
/// in that contract — consumers must not assume byte-for-byte equality
/// across codecs.
pub trait Codec: Send + Sync {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: serde::Serialize;

    fn decode<T>(&self, bytes: &[u8], hint: &TypeTag) -> Result<T, CodecError>
    where
        T: serde::de::DeserializeOwned;
}

fn require_input(bytes: &[u8]) -> Result<(), CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Decode {
            cause: DecodeFailureCause::InputEmpty,
            message: "decode called with an empty byte slice".to_string(),
        });
    }
    Ok(())
}

/// Human-readable codec backed by `serde_json`.
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: serde::Serialize,
    {
        serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T>(&self, bytes: &[u8], _hint: &TypeTag) -> Result<T, CodecError>
    where
        T: serde::de::DeserializeOwned,
    {
        require_input(bytes)?;
        serde_json::from_slice(bytes).map_err(|e| CodecError::Decode {
            cause: DecodeFailureCause::Malformed,
            message: e.to_string(),
        })
    }
}

/// Compact binary codec backed by `bincode`.
#[cfg(feature = "binary")]
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

#[cfg(feature = "binary")]
impl Codec for BincodeCodec {
    fn encode<T>(&self, value: &T) -> Result<Vec<u8>, CodecError>
    where
        T: serde::Serialize,
    {
        bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode<T>(&self, bytes: &[u8], _hint: &TypeTag) -> Result<T, CodecError>
    where
        T: serde::de::DeserializeOwned,
    {
        require_input(bytes)?;
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode {
            cause: DecodeFailureCause::Malformed,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
        tags: Vec<String>,
    }

    fn sample() -> Sample {
        Sample {
            name: "widget".to_string(),
            count: 7,
            tags: vec!["a".to_string(), "b".to_string()],
        }
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_codec_round_trips() {
        let codec = JsonCodec;
        let bytes = codec.encode(&sample()).unwrap();
        let hint = TypeTag::Struct("Sample");
        let decoded: Sample = codec.decode(&bytes, &hint).unwrap();
        assert_eq!(decoded, sample());
    }

    #[cfg(feature = "binary")]
    #[test]
    fn bincode_codec_round_trips() {
        let codec = BincodeCodec;
        let bytes = codec.encode(&sample()).unwrap();
        let hint = TypeTag::Struct("Sample");
        let decoded: Sample = codec.decode(&bytes, &hint).unwrap();
        assert_eq!(decoded, sample());
    }

    #[cfg(feature = "json")]
    #[test]
    fn json_and_binary_are_not_byte_equal_but_both_round_trip() {
        #[cfg(feature = "binary")]
        {
            let json_bytes = JsonCodec.encode(&sample()).unwrap();
            let bin_bytes = BincodeCodec.encode(&sample()).unwrap();
            assert_ne!(json_bytes, bin_bytes);
        }
    }

    #[cfg(feature = "json")]
    #[test]
    fn decode_empty_input_fails_with_input_empty() {
        let codec = JsonCodec;
        let err = codec.decode::<Sample>(&[], &TypeTag::Struct("Sample"));
        match err {
            Err(CodecError::Decode { cause, .. }) => {
                assert_eq!(cause, DecodeFailureCause::InputEmpty)
            }
            _ => panic!("expected decode error"),
        }
    }

    #[cfg(feature = "json")]
    #[test]
    fn decode_malformed_input_fails() {
        let codec = JsonCodec;
        let err = codec.decode::<Sample>(b"not json", &TypeTag::Struct("Sample"));
        assert!(err.is_err());
    }

    #[test]
    fn type_tag_displays_nested_shapes() {
        let tag = TypeTag::List(Box::new(TypeTag::Map(
            Box::new(TypeTag::Str),
            Box::new(TypeTag::I64),
        )));
        assert_eq!(tag.to_string(), "list<map<str, i64>>");
    }

    proptest::proptest! {
        #[cfg(feature = "json")]
        #[test]
        fn json_codec_round_trips_arbitrary_samples(
            name in ".*",
            count in proptest::num::u32::ANY,
            tags in proptest::collection::vec(".*", 0..8),
        ) {
            let value = Sample { name, count, tags };
            let codec = JsonCodec;
            let bytes = codec.encode(&value).unwrap();
            let decoded: Sample = codec.decode(&bytes, &TypeTag::Struct("Sample")).unwrap();
            proptest::prop_assert_eq!(decoded, value);
        }

        #[cfg(feature = "binary")]
        #[test]
        fn bincode_codec_round_trips_arbitrary_samples(
            name in ".*",
            count in proptest::num::u32::ANY,
            tags in proptest::collection::vec(".*", 0..8),
        ) {
            let value = Sample { name, count, tags };
            let codec = BincodeCodec;
            let bytes = codec.encode(&value).unwrap();
            let decoded: Sample = codec.decode(&bytes, &TypeTag::Struct("Sample")).unwrap();
            proptest::prop_assert_eq!(decoded, value);
        }
    }
}
