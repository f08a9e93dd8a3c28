//! Fixed-layout timestamps.
//!
//! Events carry timestamps as `YYYY-MM-DDTHH:MM:SS.fffffffffZ` (nine fractional
//! digits, literal `Z`). Records keep the same layout, so the lexical order of
//! stored strings is chronological order and index sort keys stay comparable.

use chrono::{DateTime, NaiveDateTime, Utc};
use readmodels_core::DropReason;

/// The only accepted layout.
pub const LAYOUT: &str = "%Y-%m-%dT%H:%M:%S%.9fZ";

/// Parse a timestamp in [`LAYOUT`].
///
/// # Errors
///
/// Returns [`DropReason::InvalidTimestamp`] naming `field` if `value` does not match.
pub fn parse(field: &'static str, value: &str) -> Result<DateTime<Utc>, DropReason> {
    NaiveDateTime::parse_from_str(value, LAYOUT)
        .map(|naive| naive.and_utc())
        .map_err(|_| DropReason::InvalidTimestamp {
            field,
            value: value.to_string(),
        })
}

/// Format a timestamp in [`LAYOUT`].
#[must_use]
pub fn format(value: &DateTime<Utc>) -> String {
    value.format(LAYOUT).to_string()
}

/// Serde adapter storing `DateTime<Utc>` in [`LAYOUT`].
pub mod layout {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Serialize in the fixed layout.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format(value))
    }

    /// Deserialize from the fixed layout.
    ///
    /// # Errors
    ///
    /// Fails if the string does not match the layout.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, super::LAYOUT)
            .map(|naive| naive.and_utc())
            .map_err(de::Error::custom)
    }

    /// Same as the parent module for `Option<DateTime<Utc>>`.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        /// Serialize in the fixed layout, `null` when absent.
        ///
        /// # Errors
        ///
        /// Propagates serializer errors.
        pub fn serialize<S: Serializer>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize from the fixed layout or `null`.
        ///
        /// # Errors
        ///
        /// Fails if a present string does not match the layout.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] DateTime<Utc>);

            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(value)| value))
        }
    }
}
