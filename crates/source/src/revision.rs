//! Revisions - one chosen variant per source.

use crate::variant::Variant;

/// A consistent selection of one variant per source of a project.
///
/// Entries keep the order they were chosen in: context-free sources in
/// declaration order, then context-aware ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Revision {
    variants: Vec<Variant>,
}

impl Revision {
    /// An empty revision.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a revision from variants. A later variant of the same source
    /// replaces an earlier one.
    pub fn from_variants(variants: impl IntoIterator<Item = Variant>) -> Self {
        variants
            .into_iter()
            .fold(Self::new(), |revision, variant| revision.with(variant))
    }

    /// A copy of this revision with `variant` added (or replacing the entry
    /// of its source).
    pub(crate) fn with(&self, variant: Variant) -> Self {
        let mut variants = self.variants.clone();
        match variants
            .iter_mut()
            .find(|v| v.source_name() == variant.source_name())
        {
            Some(existing) => *existing = variant,
            None => variants.push(variant),
        }
        Self { variants }
    }

    /// The variant chosen for the source with local key `local`.
    pub fn get(&self, local: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.source_name() == local)
    }

    /// The first entry, which belongs to the primary source when the primary
    /// source is context-free.
    pub fn first(&self) -> Option<&Variant> {
        self.variants.first()
    }

    /// The version label for `local`, or for the first entry when `None`.
    pub fn version_of(&self, local: Option<&str>) -> Option<&str> {
        let variant = match local {
            Some(name) => self.get(name),
            None => self.first(),
        };
        variant.map(Variant::version)
    }

    /// Whether `variant` is part of this revision.
    pub fn contains(&self, variant: &Variant) -> bool {
        self.variants.contains(variant)
    }

    /// All entries.
    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    /// Iterate over entries.
    pub fn iter(&self) -> impl Iterator<Item = &Variant> {
        self.variants.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    /// Whether no source has a variant.
    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    /// Stable textual identifier, `local@version` pairs joined by commas.
    pub fn identifier(&self) -> String {
        self.variants
            .iter()
            .map(|v| format!("{}@{}", v.source_name(), v.version()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.identifier())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{SourceRef, Version};
    use crate::List;
    use std::sync::Arc;

    fn variant(src: &SourceRef, label: &str) -> Variant {
        Variant::new(src.clone(), Version::new(label))
    }

    #[test]
    fn test_later_variant_replaces_same_source() {
        let a: SourceRef = Arc::new(List::new("a", ["1", "2"]));
        let b: SourceRef = Arc::new(List::new("b", ["x"]));
        let revision = Revision::from_variants([variant(&a, "1"), variant(&b, "x"), variant(&a, "2")]);

        assert_eq!(revision.len(), 2);
        assert_eq!(revision.version_of(Some("a")), Some("2"));
        assert_eq!(revision.version_of(None), Some("2"));
        assert_eq!(revision.identifier(), "a@2,b@x");
    }

    #[test]
    fn test_empty_revision() {
        let revision = Revision::new();
        assert!(revision.is_empty());
        assert_eq!(revision.version_of(None), None);
        assert_eq!(revision.to_string(), "");
    }
}
