use crate::{
    error::{Error, Result},
    scanner,
};
use std::collections::BTreeMap;

/// A named text fragment. The body is stored exactly as captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Macro {
    name: String,
    body: String,
}

impl Macro {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !scanner::is_identifier(&name) {
            return Err(Error::InvalidName(name));
        }

        Ok(Self {
            name,
            body: body.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Macros visible to one expansion run. Inserting an existing name replaces
/// the previous definition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MacroTable {
    macros: BTreeMap<String, Macro>,
}

impl MacroTable {
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the definition that was replaced, if any.
    pub fn insert(&mut self, m: Macro) -> Option<Macro> {
        self.macros.insert(m.name.clone(), m)
    }

    pub fn define(&mut self, name: &str, body: &str) -> Result<Option<Macro>> {
        Ok(self.insert(Macro::new(name, body)?))
    }

    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Macros in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Macro> {
        self.macros.values()
    }

    /// Fully expanded body of `name`, with nested invocations resolved.
    pub fn resolve(&self, name: &str) -> Result<Option<String>> {
        if !self.contains(name) {
            return Ok(None);
        }
        crate::substitute::resolve(name, self).map(Some)
    }
}

impl Extend<Macro> for MacroTable {
    fn extend<T: IntoIterator<Item = Macro>>(&mut self, iter: T) {
        for m in iter {
            self.insert(m);
        }
    }
}

impl FromIterator<Macro> for MacroTable {
    fn from_iter<T: IntoIterator<Item = Macro>>(iter: T) -> Self {
        let mut table = MacroTable::new();
        table.extend(iter);
        table
    }
}
