//! Named query parameters.
//!
//! Names are `p0`, `p1`, ... in registration order, and a value equal to one
//! already registered reuses that name. Because operands are rendered out of
//! textual order, [`ParameterMap::renumber_by_appearance`] renames them once the
//! statement is complete so numbering follows the SQL left to right.

use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::HashMap;

use crate::expression::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterMap {
    entries: Vec<(String, Value)>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` and returns its parameter name.
    pub fn add(&mut self, value: Value) -> String {
        if let Some((name, _)) = self.entries.iter().find(|(_, v)| *v == value) {
            return name.clone();
        }
        let name = format!("p{}", self.entries.len());
        log::trace!("parameter {} = {}", name, value);
        self.entries.push((name.clone(), value));
        name
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Renames parameters in order of first appearance in `sql` and drops
    /// those the text no longer references. Returns the rewritten SQL.
    pub fn renumber_by_appearance(&mut self, sql: &str, prefix: &str) -> String {
        let pattern = format!(r"{}(p\d+)\b", regex::escape(prefix));
        let re = match Regex::new(&pattern) {
            Ok(re) => re,
            Err(e) => {
                log::warn!("parameter renumbering skipped: {}", e);
                return sql.to_string();
            }
        };

        let mut renames: HashMap<String, String> = HashMap::new();
        let mut renumbered = Vec::with_capacity(self.entries.len());
        for caps in re.captures_iter(sql) {
            let old = &caps[1];
            if renames.contains_key(old) {
                continue;
            }
            let Some(value) = self.get(old).cloned() else {
                continue;
            };
            let new = format!("p{}", renumbered.len());
            renames.insert(old.to_string(), new.clone());
            renumbered.push((new, value));
        }

        let rewritten = re
            .replace_all(sql, |caps: &regex::Captures<'_>| {
                let old = &caps[1];
                let name = renames.get(old).map(String::as_str).unwrap_or(old);
                format!("{}{}", prefix, name)
            })
            .into_owned();

        if renumbered.len() != self.entries.len() {
            log::debug!(
                "dropped {} unreferenced parameter(s)",
                self.entries.len() - renumbered.len()
            );
        }
        self.entries = renumbered;
        rewritten
    }
}

impl Serialize for ParameterMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
