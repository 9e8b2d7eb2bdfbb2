use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Ordered, unique class names. Position `i` is label index `i`.
///
/// Built once from configuration and threaded through the indexer, the model
/// and every checkpoint, so a label index means the same class everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClassSchema {
    names: Vec<String>,
}

impl ClassSchema {
    pub fn new<I, S>(names: I) -> Result<ClassSchema>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(Error::config("class schema must contain at least one class"));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(Error::config("class names must not be empty"));
            }
            if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
                return Err(Error::config(format!(
                    "class name '{}' is not a valid directory name",
                    name
                )));
            }
            if !seen.insert(name.as_str()) {
                return Err(Error::config(format!("duplicate class name '{}'", name)));
            }
        }
        Ok(ClassSchema { names })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i, n.as_str()))
    }
}

impl<'de> Deserialize<'de> for ClassSchema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        ClassSchema::new(names).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for ClassSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_defines_labels() {
        let schema = ClassSchema::new(["normal", "lesao"]).unwrap();
        assert_eq!(schema.index_of("normal"), Some(0));
        assert_eq!(schema.index_of("lesao"), Some(1));
        assert_eq!(schema.index_of("other"), None);
        assert_eq!(schema.name(1), Some("lesao"));
        assert_eq!(schema.to_string(), "[normal, lesao]");
    }

    #[test]
    fn rejects_invalid_schemas() {
        assert!(ClassSchema::new(Vec::<String>::new()).is_err());
        assert!(ClassSchema::new(["a", "a"]).is_err());
        assert!(ClassSchema::new(["a", " "]).is_err());
        assert!(ClassSchema::new(["a/b"]).is_err());
    }

    #[test]
    fn deserialization_validates() {
        let ok: ClassSchema = serde_json::from_str(r#"["normal","lesao"]"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<ClassSchema>(r#"["x","x"]"#).is_err());
        assert_eq!(serde_json::to_string(&ok).unwrap(), r#"["normal","lesao"]"#);
    }
}
