//! グローバルシンボルテーブル - IRI のインターン化

use lazy_static::lazy_static;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

struct SymbolTable {
    by_name: HashMap<&'static str, u32>,
    names: Vec<&'static str>,
}

lazy_static! {
    static ref SYMBOLS: Mutex<SymbolTable> = Mutex::new(SymbolTable {
        by_name: HashMap::new(),
        names: Vec::new(),
    });
}

/// Interned IRI handle. Two symbols are equal exactly when their
/// underlying strings are equal, so equality and hashing never touch
/// the string data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

/// Interns `name` into the global table, returning its stable handle.
/// Interning the same string twice returns the same symbol.
pub fn intern(name: &str) -> Symbol {
    let mut table = SYMBOLS.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(&id) = table.by_name.get(name) {
        return Symbol(id);
    }
    // Interned strings live for the whole process. The table only grows.
    let leaked: &'static str = Box::leak(name.to_owned().into_boxed_str());
    let id = table.names.len() as u32;
    table.names.push(leaked);
    table.by_name.insert(leaked, id);
    Symbol(id)
}

impl Symbol {
    /// Resolves the symbol back to its string form.
    pub fn as_str(self) -> &'static str {
        let table = SYMBOLS.lock().unwrap_or_else(PoisonError::into_inner);
        table.names[self.0 as usize]
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(intern(&name))
    }
}
