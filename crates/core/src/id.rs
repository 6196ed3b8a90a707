//! Identifiers of experiment transactions and project runs.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Bits of a ULID below the 48-bit timestamp.
const RANDOM_MASK: u128 = (1 << 80) - 1;

/// Stable identifier of one experiment transaction.
///
/// A batch that fixes an id in the settings uses it as a base; each
/// experiment of the batch records under [`ExperimentId::for_experiment`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExperimentId(Ulid);

impl ExperimentId {
    /// Generate a new ExperimentId
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Id of the experiment `name` under this base id.
    ///
    /// Keeps the base timestamp and mixes an FNV-1a hash of the name into the
    /// random bits, so the same base and name always give the same id and
    /// different names never share a transaction.
    pub fn for_experiment(self, name: &str) -> Self {
        let mut hash: u128 = 0x6c62272e07bb014262b821756295c58d;
        for byte in name.bytes() {
            hash ^= u128::from(byte);
            hash = hash.wrapping_mul(0x0000000001000000000000000000013b);
        }
        let random = (self.0.random() ^ hash) & RANDOM_MASK;
        Self(Ulid::from_parts(self.0.timestamp_ms(), random))
    }
}

impl Default for ExperimentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ExperimentId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Identifier of one project instance run; also names its build directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(Ulid);

impl RunId {
    /// Generate a new RunId
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Build directory name of `project` for this run.
    pub fn build_dir_name(&self, project: &str) -> String {
        format!("{}-{}", project, self.0)
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_id_parse_roundtrip() {
        let id = ExperimentId::new();
        let parsed: ExperimentId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_per_experiment_ids_are_stable_and_distinct() {
        let base = ExperimentId::new();
        let raw = base.for_experiment("raw");
        let pgo = base.for_experiment("pgo");

        assert_ne!(raw, pgo);
        assert_ne!(raw, base);
        assert_eq!(raw, base.for_experiment("raw"));
        assert_eq!(raw.0.timestamp_ms(), base.0.timestamp_ms());
        assert_ne!(raw, ExperimentId::new().for_experiment("raw"));
    }

    #[test]
    fn test_build_dir_name() {
        let id = RunId::new();
        assert_eq!(id.build_dir_name("gzip"), format!("gzip-{}", id));
    }
}
