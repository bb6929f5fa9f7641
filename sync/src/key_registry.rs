//! Explicit natural key <-> sanitized key map.
//!
//! Sanitization is not invertible (`v1.2` and `v1_2` share a remote path),
//! so the reverse direction only answers when exactly one known natural key
//! maps to the sanitized form.

use std::collections::{BTreeMap, BTreeSet};

use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct KeyRegistry {
    forward: BTreeMap<String, String>,
    reverse: BTreeMap<String, BTreeSet<String>>
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sanitizes `natural` and remembers the pair.
    pub fn register(&mut self, natural: &str) -> String {
        if let Some(sanitized) = self.forward.get(natural) {
            return sanitized.clone();
        }
        let sanitized = utils::sanitize_key(natural);
        self.forward.insert(natural.to_string(), sanitized.clone());
        let owners = self.reverse.entry(sanitized.clone()).or_default();
        owners.insert(natural.to_string());
        if owners.len() > 1 {
            warn!(
                sanitized = %sanitized,
                natural_keys = ?owners,
                "Distinct project names share one remote key"
            );
        }
        sanitized
    }

    /// Replaces the registry with the given natural keys.
    pub fn rebuild<'a>(&mut self, naturals: impl IntoIterator<Item = &'a str>) {
        self.forward.clear();
        self.reverse.clear();
        for natural in naturals {
            self.register(natural);
        }
    }

    pub fn sanitized(&self, natural: &str) -> Option<&str> {
        self.forward.get(natural).map(String::as_str)
    }

    /// The natural key behind `sanitized`, if exactly one is known.
    pub fn natural_for(&self, sanitized: &str) -> Option<&str> {
        match self.reverse.get(sanitized) {
            Some(owners) if owners.len() == 1 => owners.iter().next().map(String::as_str),
            _ => None
        }
    }

    /// Like [`Self::natural_for`], falling back to the sanitized key itself.
    pub fn resolve(&self, sanitized: &str) -> String {
        self.natural_for(sanitized)
            .unwrap_or(sanitized)
            .to_string()
    }

    pub fn collisions(&self) -> Vec<(&str, Vec<&str>)> {
        self.reverse
            .iter()
            .filter(|(_, owners)| owners.len() > 1)
            .map(|(sanitized, owners)| {
                (
                    sanitized.as_str(),
                    owners.iter().map(String::as_str).collect()
                )
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_stable() {
        let mut a = KeyRegistry::new();
        let mut b = KeyRegistry::new();
        b.register("other");
        assert_eq!(a.register("v1.2 [beta]"), "v1_2 _beta_");
        assert_eq!(a.register("v1.2 [beta]"), b.register("v1.2 [beta]"));
    }

    #[test]
    fn test_reverse_lookup_round_trips() {
        let mut registry = KeyRegistry::new();
        registry.rebuild(["Foo.Bar", "Baz"]);
        assert_eq!(registry.natural_for("Foo_Bar"), Some("Foo.Bar"));
        assert_eq!(registry.resolve("Baz"), "Baz");
        assert_eq!(registry.resolve("Unknown_Key"), "Unknown_Key");
    }

    #[test]
    fn test_collisions_are_ambiguous() {
        let mut registry = KeyRegistry::new();
        registry.rebuild(["v1.2", "v1_2", "v1#2"]);
        assert_eq!(registry.natural_for("v1_2"), None);
        assert_eq!(registry.resolve("v1_2"), "v1_2");
        assert_eq!(registry.collisions(), vec![("v1_2", vec!["v1#2", "v1.2", "v1_2"])]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_rebuild_forgets_old_keys() {
        let mut registry = KeyRegistry::new();
        registry.register("Gone");
        registry.rebuild(["Kept"]);
        assert!(registry.sanitized("Gone").is_none());
        assert_eq!(registry.sanitized("Kept"), Some("Kept"));
    }
}
