//! Coverage cache key parsing and formatting
//!
//! Implements the key format used by the coverage cache: ENTITY_TYPE|ENTITY_CODE|METRIC

use std::fmt;

/// Key identifying one entity/metric pair in the coverage cache
///
/// # Examples
///
/// ```
/// use ioda_pipeline::identifier::CoverageKey;
///
/// let key = CoverageKey::parse("country|NG|ping-slash24").unwrap();
/// assert_eq!(key.entity_type(), "country");
/// assert_eq!(key.entity_code(), "NG");
/// assert_eq!(key.metric(), "ping-slash24");
/// assert_eq!(key.to_string(), "country|NG|ping-slash24");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoverageKey {
    entity_type: String,
    entity_code: String,
    metric: String,
}

impl CoverageKey {
    /// Build a key from its components
    pub fn new(
        entity_type: impl Into<String>,
        entity_code: impl Into<String>,
        metric: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_code: entity_code.into(),
            metric: metric.into(),
        }
    }

    /// Parse a `type|code|metric` string
    ///
    /// # Errors
    ///
    /// Returns an error if the string does not have exactly three non-empty
    /// components.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let parts: Vec<&str> = s.split('|').collect();
        if parts.len() != 3 {
            return Err(IdentifierError::InvalidFormat(format!(
                "invalid coverage key '{s}': expected ENTITY_TYPE|ENTITY_CODE|METRIC"
            )));
        }

        let names = ["entity type", "entity code", "metric"];
        for (part, name) in parts.iter().zip(names) {
            if part.trim().is_empty() {
                return Err(IdentifierError::InvalidFormat(format!(
                    "{name} component cannot be empty"
                )));
            }
        }

        Ok(Self::new(parts[0].trim(), parts[1].trim(), parts[2].trim()))
    }

    /// Entity type component
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Entity code component
    pub fn entity_code(&self) -> &str {
        &self.entity_code
    }

    /// Metric component
    pub fn metric(&self) -> &str {
        &self.metric
    }
}

impl fmt::Display for CoverageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.entity_type, self.entity_code, self.metric)
    }
}

impl std::str::FromStr for CoverageKey {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Errors that can occur during key parsing
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// Invalid key format
    #[error("{0}")]
    InvalidFormat(String),
}
