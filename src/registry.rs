use std::collections::{BTreeSet, HashMap};

use crate::model::Symbol;

/// Aggregate demand per symbol.
///
/// Counts subscriptions, not listeners: adding a symbol twice needs two
/// removals before it stops being live. Per-listener deduplication is the
/// caller's job.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    counts: HashMap<Symbol, usize>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_symbols<'a, I>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = &'a Symbol>,
    {
        for symbol in symbols {
            *self.counts.entry(symbol.clone()).or_insert(0) += 1;
        }
    }

    /// Symbols that reach zero are dropped from the map; unknown symbols
    /// are ignored.
    pub fn remove_symbols<'a, I>(&mut self, symbols: I)
    where
        I: IntoIterator<Item = &'a Symbol>,
    {
        for symbol in symbols {
            if let Some(count) = self.counts.get_mut(symbol) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.counts.remove(symbol);
                }
            }
        }
    }

    pub fn live_symbols(&self) -> BTreeSet<Symbol> {
        self.counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    pub fn count(&self, symbol: &Symbol) -> usize {
        self.counts.get(symbol).copied().unwrap_or(0)
    }

    pub fn is_live(&self, symbol: &Symbol) -> bool {
        self.count(symbol) > 0
    }

    pub fn is_active(&self) -> bool {
        self.counts.values().any(|count| *count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(raw: &[&str]) -> Vec<Symbol> {
        Symbol::parse_all(raw.iter().copied())
    }

    #[test]
    fn case_variants_share_one_counted_symbol() {
        let mut registry = SubscriptionRegistry::new();
        registry.add_symbols(&symbols(&["aapl"]));
        registry.add_symbols(&symbols(&["AAPL"]));

        let aapl = Symbol::parse("AAPL").unwrap();
        assert_eq!(registry.live_symbols().len(), 1);
        assert_eq!(registry.count(&aapl), 2);

        registry.remove_symbols(&symbols(&["aapl"]));
        assert!(registry.is_live(&aapl));

        registry.remove_symbols(&symbols(&["aapl"]));
        assert!(!registry.is_live(&aapl));
        assert!(!registry.is_active());
    }

    #[test]
    fn removing_unknown_symbol_never_underflows() {
        let mut registry = SubscriptionRegistry::new();
        registry.remove_symbols(&symbols(&["tsla"]));
        assert_eq!(registry.count(&Symbol::parse("TSLA").unwrap()), 0);

        registry.add_symbols(&symbols(&["tsla"]));
        registry.remove_symbols(&symbols(&["tsla", "tsla"]));
        assert!(!registry.is_active());
        registry.add_symbols(&symbols(&["tsla"]));
        assert_eq!(registry.count(&Symbol::parse("TSLA").unwrap()), 1);
    }

    #[test]
    fn live_symbols_are_ordered_snapshot() {
        let mut registry = SubscriptionRegistry::new();
        registry.add_symbols(&symbols(&["msft", "aapl", "goog"]));
        let live: Vec<_> = registry
            .live_symbols()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(live, vec!["AAPL", "GOOG", "MSFT"]);
        assert!(registry.is_active());
    }
}
