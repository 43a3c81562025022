//! Small serialization helpers shared by configuration types.

/// Serde adapter that represents a `Duration` as whole milliseconds.
///
/// Host applications typically embed [`crate::GuardConfig`] in a JSON or TOML
/// config file; plain integer milliseconds keep those files readable.
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use cardguard::utils::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     open_duration: Duration,
/// }
/// ```
pub mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a `Duration` as milliseconds (u64).
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    /// Deserialize milliseconds (u64) into a `Duration`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
