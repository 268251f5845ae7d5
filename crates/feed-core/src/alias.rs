//! Symbol alias lookup contract and a static table implementation.
//!
//! Some exchanges expose several surface spellings for one logical
//! instrument. The alias tables themselves are external collaborators loaded
//! from flat files; the orchestrator only depends on the narrow
//! [`AliasSource`] contract, which returns candidate spellings in retry
//! priority order: exact match first, then plain forms without a
//! disambiguating suffix, then any remaining alternatives.

use std::collections::HashMap;
use std::fmt::Debug;

use crate::types::Symbol;

/// Lookup contract for exchange-local symbol aliases.
pub trait AliasSource: Send + Sync + Debug {
    /// Returns alternative spellings for a symbol, in retry priority order.
    ///
    /// An empty vector means the symbol has no known aliases.
    fn aliases(&self, symbol: &Symbol) -> Vec<Symbol>;
}

/// In-memory alias table built from `(logical symbol, alias)` rows.
///
/// Ordering on lookup: the spelling equal to the logical symbol, then
/// spellings without a `.`-suffix, then the rest in insertion order.
#[derive(Debug, Default)]
pub struct StaticAliasTable {
    entries: HashMap<Symbol, Vec<Symbol>>,
}

impl StaticAliasTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from `(logical, alias)` pairs.
    #[must_use]
    pub fn from_rows<I, A, B>(rows: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<Symbol>,
        B: Into<Symbol>,
    {
        let mut table = Self::new();
        for (logical, alias) in rows {
            table.insert(logical.into(), alias.into());
        }
        table
    }

    /// Adds one alias for a logical symbol, ignoring exact duplicates.
    pub fn insert(&mut self, logical: Symbol, alias: Symbol) {
        let spellings = self.entries.entry(logical).or_default();
        if !spellings.contains(&alias) {
            spellings.push(alias);
        }
    }

    /// Whether the table knows any alias for a symbol.
    #[must_use]
    pub fn is_mapped(&self, symbol: &Symbol) -> bool {
        self.entries.contains_key(symbol)
    }
}

impl AliasSource for StaticAliasTable {
    fn aliases(&self, symbol: &Symbol) -> Vec<Symbol> {
        let Some(spellings) = self.entries.get(symbol) else {
            return Vec::new();
        };

        let mut ordered = Vec::with_capacity(spellings.len());
        // Exact match first.
        if let Some(exact) = spellings.iter().find(|s| *s == symbol) {
            ordered.push(exact.clone());
        }
        // Then plain forms without a disambiguating suffix.
        for s in spellings {
            if s != symbol && !s.as_str().contains('.') {
                ordered.push(s.clone());
            }
        }
        // Then whatever remains.
        for s in spellings {
            if !ordered.contains(s) {
                ordered.push(s.clone());
            }
        }
        ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        let table = StaticAliasTable::from_rows([
            ("CBA", "CBA.E"),
            ("CBA", "CBAPI"),
            ("CBA", "CBA"),
        ]);

        let aliases = table.aliases(&Symbol::new("CBA"));
        assert_eq!(
            aliases,
            vec![Symbol::new("CBA"), Symbol::new("CBAPI"), Symbol::new("CBA.E")]
        );
    }

    #[test]
    fn unknown_symbol_has_no_aliases() {
        let table = StaticAliasTable::new();
        assert!(table.aliases(&Symbol::new("AAPL")).is_empty());
    }

    #[test]
    fn duplicate_rows_collapse() {
        let table = StaticAliasTable::from_rows([("BHP", "BHP.E"), ("BHP", "BHP.E")]);
        assert_eq!(table.aliases(&Symbol::new("BHP")).len(), 1);
    }
}
