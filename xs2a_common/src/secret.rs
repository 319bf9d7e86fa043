use std::{
    fmt,
    fmt::{Debug, Display},
};

use serde::{Deserialize, Deserializer};

/// A wrapper for PSU credentials, TANs and confirmation codes. The wrapped value never shows up in `Debug` or
/// `Display` output, so request objects holding secrets can be logged freely.
#[derive(Clone, Default)]
pub struct Secret<T>
where T: Clone + Default
{
    value: T,
}

impl<T: Clone + Default> Secret<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn reveal(&self) -> &T {
        &self.value
    }
}

impl Secret<String> {
    /// True when the secret is empty or only whitespace. Payload fields carrying such a value are treated as absent.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Exact, case-sensitive comparison of two secrets.
    pub fn matches(&self, other: &Secret<String>) -> bool {
        self.value == other.value
    }
}

impl From<&str> for Secret<String> {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl From<String> for Secret<String> {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl<'de, T> Deserialize<'de> for Secret<T>
where T: Clone + Default + Deserialize<'de>
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Self::new)
    }
}

impl<T: Clone + Default> Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T: Clone + Default> Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        let secret = Secret::from("12345");
        assert_eq!(format!("{secret}"), "****");
        assert_eq!(format!("{secret:?}"), "****");
        assert_eq!(secret.reveal(), "12345");
    }

    #[test]
    fn blank_and_matching() {
        assert!(Secret::from("  ").is_blank());
        assert!(!Secret::from("x").is_blank());
        assert!(Secret::from("abc").matches(&Secret::from("abc")));
        assert!(!Secret::from("abc").matches(&Secret::from("ABC")));
    }

    #[test]
    fn deserializes_transparently() {
        let secret: Secret<String> = serde_json::from_str("\"tan-1\"").unwrap();
        assert_eq!(secret.reveal(), "tan-1");
    }
}
