//! A document held across calls, plus a scratch map shared by the script.

use crate::error::ReshapeError;
use crate::getset::{Reshaper, parse_input};
use crate::path::{self, PathError, Query, WritePath};
use crate::rules::RuleSet;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Storage {
    document: Value,
    memory: Map<String, Value>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_document(text: &str) -> Result<Self, ReshapeError> {
        Ok(Self {
            document: parse_input(text)?,
            memory: Map::new(),
        })
    }

    /// Document text; empty while nothing has been stored.
    pub fn document(&self) -> String {
        if self.document.is_null() {
            String::new()
        } else {
            self.document.to_string()
        }
    }

    pub fn value(&self) -> &Value {
        &self.document
    }

    /// Text at `path`: strings unquoted, other values as JSON, and the empty
    /// string for `null` or no match.
    pub fn get(&self, path: &str) -> String {
        Query::parse(path.trim())
            .get(&self.document)
            .map(|value| path::text_of(&value))
            .unwrap_or_default()
    }

    pub fn set(&mut self, path: &str, value: Value) -> Result<&mut Self, PathError> {
        WritePath::parse(path.trim())?.set(&mut self.document, value)?;
        Ok(self)
    }

    pub fn set_raw(&mut self, path: &str, raw: &str) -> Result<&mut Self, PathError> {
        let value = serde_json::from_str(raw.trim()).map_err(PathError::InvalidFragment)?;
        self.set(path, value)
    }

    pub fn delete(&mut self, path: &str) -> Result<&mut Self, PathError> {
        WritePath::parse(path.trim())?.delete(&mut self.document)?;
        Ok(self)
    }

    /// Replace the held document with its projection through `rules`.
    pub fn get_set(&mut self, reshaper: &Reshaper, rules: &str) -> Result<&mut Self, ReshapeError> {
        let rules = RuleSet::parse(rules)?;
        self.document = reshaper
            .apply(&self.document, &rules)?
            .unwrap_or(Value::Null);
        Ok(self)
    }

    pub fn memory(&self) -> &Map<String, Value> {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn operations_chain_on_the_held_document() {
        let mut storage = Storage::from_document(r#"{"a":{"b":1}}"#).unwrap();
        storage
            .set("a.c", json!("x"))
            .and_then(|s| s.set_raw("list", "[1,2]"))
            .and_then(|s| s.delete("a.b"))
            .unwrap();
        assert_eq!(storage.document(), r#"{"a":{"c":"x"},"list":[1,2]}"#);
        assert_eq!(storage.get("list.1"), "2");
        assert_eq!(storage.get(" a.c "), "x");
        assert_eq!(storage.get("nope"), "");
    }

    #[test]
    fn get_set_replaces_the_document() {
        let mut storage = Storage::from_document(r#"[{"id":1},{"id":2}]"#).unwrap();
        storage
            .get_set(&Reshaper::default(), r#"[{"src":"@this.#.id","dst":"rows.-1.key"}]"#)
            .unwrap();
        assert_eq!(storage.value(), &json!({"rows": [{"key": 1}, {"key": 2}]}));
    }

    #[test]
    fn failed_get_set_keeps_the_old_document() {
        let mut storage = Storage::from_document(r#"{"a":1}"#).unwrap();
        let err = storage.get_set(&Reshaper::default(), "{}").unwrap_err();
        assert_eq!(err.code(), "RESHAPE_E_RULES");
        assert_eq!(storage.document(), r#"{"a":1}"#);
    }

    #[test]
    fn empty_storage_and_memory() {
        let mut storage = Storage::new();
        assert_eq!(storage.document(), "");
        storage.memory_mut().insert("seen".into(), json!(true));
        assert_eq!(storage.memory().get("seen"), Some(&json!(true)));
    }
}
