#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the sol402 payment facilitator.
//!
//! This crate defines the protocol surface shared by every other crate in the
//! workspace:
//!
//! - [`proto`] - Wire messages for verification, settlement, and capability
//!   discovery, plus the structured failure taxonomy
//! - [`chain`] - CAIP-2 chain identifiers
//! - [`networks`] - Registry of well-known Solana networks
//! - [`scheme`] - The [`X402SchemeFacilitator`](scheme::X402SchemeFacilitator)
//!   trait implemented by payment scheme handlers, and the registry they are
//!   dispatched through
//! - [`facilitator`] - The outward-facing [`Facilitator`](facilitator::Facilitator)
//!   trait exposing exactly verify, settle, and supported
//! - [`timestamp`] - Unix timestamps for authorization validity windows

pub mod chain;
pub mod facilitator;
pub mod networks;
pub mod proto;
pub mod scheme;
pub mod timestamp;

/// Defines a unit struct that serializes to (and only deserializes from) a
/// fixed string literal.
///
/// Used for protocol fields whose value is a known constant, such as the
/// `"exact"` scheme identifier: a mismatched wire value fails deserialization
/// instead of flowing through as data.
#[macro_export]
macro_rules! lit_str {
    ($name:ident, $value:literal) => {
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                $value
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($value)
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                serializer.serialize_str($value)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                if raw == $value {
                    Ok($name)
                } else {
                    Err(::serde::de::Error::custom(format!(
                        "expected {:?}, got {:?}",
                        $value, raw
                    )))
                }
            }
        }
    };
}
