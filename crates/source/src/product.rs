//! Revision resolution - combining the variants of a project's sources.

use crate::error::Result;
use crate::revision::Revision;
use crate::variant::{variants_of, SourceRef, Variant};
use tracing::debug;

/// Lazy cross product over pools of variants.
///
/// Yields one `Vec` per combination, positions matching the pool order, the
/// last pool varying fastest. No pools yield a single empty combination; any
/// empty pool yields nothing. The iterator cannot be rewound; build a new one
/// to start over.
#[derive(Debug)]
pub struct Product {
    pools: Vec<Vec<Variant>>,
    indices: Vec<usize>,
    done: bool,
}

impl Product {
    /// Create the product of `pools`.
    pub fn new(pools: Vec<Vec<Variant>>) -> Self {
        let done = pools.iter().any(Vec::is_empty);
        Self {
            indices: vec![0; pools.len()],
            pools,
            done,
        }
    }

    /// Number of combinations in total.
    pub fn size(&self) -> usize {
        self.pools.iter().map(Vec::len).product()
    }
}

impl Iterator for Product {
    type Item = Vec<Variant>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let item = self
            .indices
            .iter()
            .zip(&self.pools)
            .map(|(&i, pool)| pool[i].clone())
            .collect();

        // Advance the odometer.
        let mut pos = self.pools.len();
        loop {
            if pos == 0 {
                self.done = true;
                break;
            }
            pos -= 1;
            self.indices[pos] += 1;
            if self.indices[pos] < self.pools[pos].len() {
                break;
            }
            self.indices[pos] = 0;
        }

        Some(item)
    }
}

/// Resolve every revision of a project's sources.
///
/// Context-free sources are combined by cross product in declaration order.
/// Each combination is then expanded by the context-aware sources, see
/// [`expand_with_context`].
pub async fn resolve(sources: &[SourceRef]) -> Result<Vec<Revision>> {
    let (free, aware): (Vec<&SourceRef>, Vec<&SourceRef>) =
        sources.iter().partition(|s| s.is_context_free());

    let mut pools = Vec::with_capacity(free.len());
    for source in free {
        let versions = source.versions().await?;
        debug!(source = source.local(), count = versions.len(), "Enumerated versions");
        pools.push(variants_of(source, versions));
    }

    let aware: Vec<SourceRef> = aware.into_iter().cloned().collect();
    let mut revisions = Vec::new();
    for combination in Product::new(pools) {
        let base = Revision::from_variants(combination);
        revisions.extend(expand_with_context(base, &aware).await?);
    }

    Ok(revisions)
}

/// Expand a partial revision by context-aware sources, in order.
///
/// A source returning no versions is left out of the revision; a source
/// returning several multiplies the revisions. Later sources see the choices
/// of earlier ones.
pub async fn expand_with_context(base: Revision, aware: &[SourceRef]) -> Result<Vec<Revision>> {
    let mut partial = vec![base];

    for source in aware {
        let mut next = Vec::with_capacity(partial.len());
        for revision in partial {
            let versions = source.versions_with_context(&revision).await?;
            if versions.is_empty() {
                debug!(source = source.local(), revision = %revision, "No variant in this context");
                next.push(revision);
                continue;
            }
            for variant in variants_of(source, versions) {
                next.push(revision.with(variant));
            }
        }
        partial = next;
    }

    Ok(partial)
}
