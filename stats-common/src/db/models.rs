//! Database models
//!
//! The triple is the canonical representation of every fact the pipeline
//! writes. Observations are kept in their own table because they are far
//! more numerous than schema triples.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Max length (in characters) of a literal object value.
///
/// Matches the size of a MySQL TEXT column.
pub const MAX_VALUE_CHARS: usize = 65_535;

/// Object of a triple: either a reference to another node or a literal
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Object {
    Id(String),
    Value(String),
}

/// A single (subject, predicate, object) fact
///
/// Fields are private so a triple can only be built through the checked
/// constructors: the subject is never empty and literal values never exceed
/// [`MAX_VALUE_CHARS`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Triple {
    subject_id: String,
    predicate: String,
    object: Object,
}

impl Triple {
    /// Triple whose object is a reference to another node
    pub fn with_id(
        subject_id: impl Into<String>,
        predicate: impl Into<String>,
        object_id: impl Into<String>,
    ) -> Result<Self> {
        Self::new(subject_id.into(), predicate.into(), Object::Id(object_id.into()))
    }

    /// Triple whose object is a literal value
    pub fn with_value(
        subject_id: impl Into<String>,
        predicate: impl Into<String>,
        object_value: impl Into<String>,
    ) -> Result<Self> {
        Self::new(
            subject_id.into(),
            predicate.into(),
            Object::Value(object_value.into()),
        )
    }

    /// Rebuild a triple from its four stored columns
    ///
    /// Exactly one of `object_id` / `object_value` must be set.
    pub fn from_columns(
        subject_id: String,
        predicate: String,
        object_id: Option<String>,
        object_value: Option<String>,
    ) -> Result<Self> {
        let object = match (object_id, object_value) {
            (Some(id), None) => Object::Id(id),
            (None, Some(value)) => Object::Value(value),
            (Some(_), Some(_)) => {
                return Err(Error::InvalidInput(format!(
                    "Triple ({}, {}) has both an object id and an object value",
                    subject_id, predicate
                )))
            }
            (None, None) => {
                return Err(Error::InvalidInput(format!(
                    "Triple ({}, {}) has neither an object id nor an object value",
                    subject_id, predicate
                )))
            }
        };
        Self::new(subject_id, predicate, object)
    }

    fn new(subject_id: String, predicate: String, object: Object) -> Result<Self> {
        if subject_id.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Triple with predicate '{}' has an empty subject id",
                predicate
            )));
        }
        if predicate.is_empty() {
            return Err(Error::InvalidInput(format!(
                "Triple for subject '{}' has an empty predicate",
                subject_id
            )));
        }
        if let Object::Value(value) = &object {
            let len = value.chars().count();
            if len > MAX_VALUE_CHARS {
                return Err(Error::ValueTooLong {
                    subject: subject_id,
                    predicate,
                    len,
                    max: MAX_VALUE_CHARS,
                });
            }
        }
        Ok(Self {
            subject_id,
            predicate,
            object,
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn object_id(&self) -> Option<&str> {
        match &self.object {
            Object::Id(id) => Some(id),
            Object::Value(_) => None,
        }
    }

    pub fn object_value(&self) -> Option<&str> {
        match &self.object {
            Object::Id(_) => None,
            Object::Value(value) => Some(value),
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.object {
            Object::Id(id) => write!(f, "({}, {}, {})", self.subject_id, self.predicate, id),
            Object::Value(value) => {
                write!(f, "({}, {}, \"{}\")", self.subject_id, self.predicate, value)
            }
        }
    }
}

/// A single statistical observation row
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Observation {
    pub entity: String,
    pub variable: String,
    pub date: String,
    pub value: String,
    pub provenance: String,
    pub unit: String,
    pub scaling_factor: String,
    pub measurement_method: String,
    pub observation_period: String,
    /// JSON object of any additional observation properties
    pub properties: String,
}

/// Final status of an import, recorded in the `imports` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImportStatus {
    Success,
    Failure,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Success => "SUCCESS",
            ImportStatus::Failure => "FAILURE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_triple_accessors() {
        let triple = Triple::with_value("sv1", "name", "Variable 1").unwrap();
        assert_eq!(triple.subject_id(), "sv1");
        assert_eq!(triple.predicate(), "name");
        assert_eq!(triple.object_value(), Some("Variable 1"));
        assert_eq!(triple.object_id(), None);
    }

    #[test]
    fn test_empty_subject_rejected() {
        assert!(Triple::with_id("", "typeOf", "Class").is_err());
    }

    #[test]
    fn test_value_at_limit_accepted() {
        let value = "x".repeat(MAX_VALUE_CHARS);
        assert!(Triple::with_value("n1", "description", value).is_ok());
    }

    #[test]
    fn test_value_over_limit_rejected() {
        let value = "x".repeat(MAX_VALUE_CHARS + 1);
        let err = Triple::with_value("n1", "description", value).unwrap_err();
        match err {
            Error::ValueTooLong { subject, predicate, len, max } => {
                assert_eq!(subject, "n1");
                assert_eq!(predicate, "description");
                assert_eq!(len, MAX_VALUE_CHARS + 1);
                assert_eq!(max, MAX_VALUE_CHARS);
            }
            other => panic!("Unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_columns_requires_exactly_one_object() {
        assert!(Triple::from_columns("a".into(), "p".into(), None, None).is_err());
        assert!(Triple::from_columns(
            "a".into(),
            "p".into(),
            Some("b".into()),
            Some("v".into())
        )
        .is_err());

        let triple = Triple::from_columns("a".into(), "p".into(), Some("b".into()), None).unwrap();
        assert_eq!(triple.object(), &Object::Id("b".to_string()));
    }
}
