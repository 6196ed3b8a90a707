//! Building one revision from short version strings.

use crate::error::Result;
use crate::revision::Revision;
use crate::variant::{SourceRef, Variant, Version};
use revbench_core::ConfigurationError;
use std::collections::BTreeMap;
use tracing::debug;

/// Build the revision described by `requested`.
///
/// Each string selects the version of exactly one source: an exact label
/// match wins, otherwise a unique prefix (short commit hashes). Sources not
/// mentioned keep their default version. Context-aware sources are resolved
/// against the context-free choices; a string may pick one of their
/// variants, otherwise the first offered one is used.
pub async fn select<S: AsRef<str>>(sources: &[SourceRef], requested: &[S]) -> Result<Revision> {
    let (free, aware): (Vec<&SourceRef>, Vec<&SourceRef>) =
        sources.iter().partition(|s| s.is_context_free());

    let mut catalog = Vec::with_capacity(free.len());
    for source in free {
        let versions = source.versions().await?;
        catalog.push((source, versions));
    }

    let mut chosen: BTreeMap<String, Version> = BTreeMap::new();
    let mut pending = Vec::new();
    for request in requested {
        let request = request.as_ref();
        match match_version(&catalog, request)? {
            Some((source, version)) => {
                let local = source.local().to_string();
                if chosen.contains_key(&local) {
                    return Err(ConfigurationError::DuplicateSelection { source_name: local }.into());
                }
                debug!(source = %local, version = %version.label, "Selected version");
                chosen.insert(local, version);
            }
            None => pending.push(request.to_string()),
        }
    }

    let mut variants = Vec::with_capacity(catalog.len());
    for (source, _) in &catalog {
        let version = match chosen.remove(source.local()) {
            Some(version) => version,
            None => source.default_version().await?,
        };
        variants.push(Variant::new((*source).clone(), version));
    }
    let mut revision = Revision::from_variants(variants);

    for source in aware {
        let offered = source.versions_with_context(&revision).await?;
        let requested = pending
            .iter()
            .position(|request| offered.iter().any(|v| v.label == *request));
        let picked = match requested {
            Some(i) => {
                let request = pending.remove(i);
                offered.iter().find(|v| v.label == request).cloned()
            }
            None => offered.first().cloned(),
        };

        if let Some(version) = picked {
            revision = revision.with(Variant::new(source.clone(), version));
        }
    }

    if let Some(request) = pending.into_iter().next() {
        return Err(ConfigurationError::NoMatchingSource { requested: request }.into());
    }

    Ok(revision)
}

/// Find the single (source, version) matching `request`.
fn match_version<'a>(
    catalog: &[(&'a SourceRef, Vec<Version>)],
    request: &str,
) -> Result<Option<(&'a SourceRef, Version)>> {
    let exact: Vec<_> = catalog
        .iter()
        .flat_map(|(source, versions)| {
            versions
                .iter()
                .filter(|v| v.label == request)
                .map(move |v| (*source, v))
        })
        .collect();

    let candidates = if exact.is_empty() {
        catalog
            .iter()
            .flat_map(|(source, versions)| {
                versions
                    .iter()
                    .filter(|v| v.label.starts_with(request))
                    .map(move |v| (*source, v))
            })
            .collect()
    } else {
        exact
    };

    match candidates.as_slice() {
        [] => Ok(None),
        [(source, version)] => Ok(Some((*source, (*version).clone()))),
        many => Err(ConfigurationError::AmbiguousSelection {
            requested: request.to_string(),
            candidates: many
                .iter()
                .map(|(source, version)| format!("{}@{}", source.local(), version.label))
                .collect(),
        }
        .into()),
    }
}
