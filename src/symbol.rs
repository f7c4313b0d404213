use lasso::{Spur, ThreadedRodeo};

/// An interned name: predicate, action, decomposition, object,
/// variable, or type. Interned string IDs give fast equality.
pub type NameId = Spur;

/// Symbol store for interning domain and problem names.
///
/// Guarantees:
/// - Same string always produces the same NameId
/// - Different strings always produce different NameIds
/// - A NameId can be resolved back to the original string
pub struct SymbolStore {
    rodeo: ThreadedRodeo,
}

impl SymbolStore {
    /// Create a new empty symbol store.
    pub fn new() -> Self {
        Self {
            rodeo: ThreadedRodeo::new(),
        }
    }

    /// Intern a name, returning its unique NameId.
    pub fn intern(&self, name: &str) -> NameId {
        self.rodeo.get_or_intern(name)
    }

    /// Resolve a NameId back to its string representation.
    /// Returns None if the NameId was not created by this store.
    pub fn resolve(&self, id: NameId) -> Option<&str> {
        self.rodeo.try_resolve(&id)
    }

    /// Get the NameId for a name if it exists, without interning.
    pub fn get(&self, name: &str) -> Option<NameId> {
        self.rodeo.get(name)
    }
}

impl Default for SymbolStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_same_string_returns_same_id() {
        let store = SymbolStore::new();
        let id1 = store.intern("at");
        let id2 = store.intern("at");
        assert_eq!(id1, id2);
    }

    #[test]
    fn intern_different_strings_returns_different_ids() {
        let store = SymbolStore::new();
        let id1 = store.intern("at");
        let id2 = store.intern("on");
        assert_ne!(id1, id2);
    }

    #[test]
    fn resolve_returns_original_string() {
        let store = SymbolStore::new();
        let id = store.intern("truck");
        assert_eq!(store.resolve(id), Some("truck"));
    }

    #[test]
    fn get_does_not_intern() {
        let store = SymbolStore::new();
        assert_eq!(store.get("driver"), None);
        let id = store.intern("driver");
        assert_eq!(store.get("driver"), Some(id));
    }
}
