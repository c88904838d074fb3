use std::fmt;

use ahash::AHashSet;
use thiserror::Error;

use crate::demangle::demangle;

/// One externally visible function of a compiled unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SymbolEntry {
    pub demangled: String,
    pub linkable: String,
}

impl SymbolEntry {
    pub fn new(demangled: impl Into<String>, linkable: impl Into<String>) -> Self {
        Self {
            demangled: demangled.into(),
            linkable: linkable.into(),
        }
    }

    /// Build an entry from a linkable name, demangling it on the way.
    pub fn from_linkable(linkable: impl Into<String>) -> Self {
        let linkable = linkable.into();
        Self {
            demangled: demangle(&linkable),
            linkable,
        }
    }

    /// Whether this entry answers to `name`: exact demangled match, or the
    /// demangled form is `name` followed by its argument list.
    pub fn matches(&self, name: &str) -> bool {
        match self.demangled.strip_prefix(name) {
            Some("") => true,
            Some(rest) => rest.starts_with('('),
            None => false,
        }
    }
}

impl fmt::Display for SymbolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.demangled, self.linkable)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymbolError {
    /// Several distinct linkable symbols answer to the same logical name.
    /// Lookup by base name only supports overload-free exports.
    #[error("`{name}` is ambiguous; candidates: {}", .candidates.join(", "))]
    Ambiguous { name: String, candidates: Vec<String> },
}

/// Insertion-ordered record of every function defined by the units of one
/// execution context.
#[derive(Clone, Debug, Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = SymbolEntry>,
    {
        self.entries.extend(entries);
    }

    pub fn push(&mut self, entry: SymbolEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[SymbolEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve a logical function name to its linkable name.
    ///
    /// The first matching entry in insertion order is returned. Matches that
    /// disagree on the linkable name (overloads) are reported as
    /// [`SymbolError::Ambiguous`] instead of picking one.
    pub fn resolve(&self, name: &str) -> Result<Option<&str>, SymbolError> {
        let mut matches = self.entries.iter().filter(|entry| entry.matches(name));
        let Some(first) = matches.next() else {
            return Ok(None);
        };

        let mut seen = AHashSet::new();
        seen.insert(first.linkable.as_str());
        let mut candidates = vec![first.demangled.clone()];
        for other in matches {
            if seen.insert(other.linkable.as_str()) {
                candidates.push(other.demangled.clone());
            }
        }

        if candidates.len() > 1 {
            return Err(SymbolError::Ambiguous {
                name: name.to_string(),
                candidates,
            });
        }

        Ok(Some(first.linkable.as_str()))
    }

    /// The entry a linkable name was recorded under, if any.
    pub fn entry_for_linkable(&self, linkable: &str) -> Option<&SymbolEntry> {
        self.entries.iter().find(|entry| entry.linkable == linkable)
    }
}

impl FromIterator<SymbolEntry> for SymbolTable {
    fn from_iter<I: IntoIterator<Item = SymbolEntry>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
