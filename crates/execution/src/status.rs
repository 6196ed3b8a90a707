//! Step status and its write-once cell.

use std::sync::atomic::{AtomicU8, Ordering};
use tracing::warn;

/// Outcome of a step, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum StepStatus {
    /// Not executed (yet)
    Unset = 0,
    /// Finished normally
    Ok = 1,
    /// Some part failed, the rest went on
    CanContinue = 2,
    /// Failed
    Error = 3,
}

impl StepStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ok,
            2 => Self::CanContinue,
            3 => Self::Error,
            _ => Self::Unset,
        }
    }

    /// The most severe of `statuses`, `Ok` when there are none.
    pub fn worst<'a>(statuses: impl IntoIterator<Item = &'a StepStatus>) -> Self {
        statuses
            .into_iter()
            .copied()
            .max()
            .filter(|s| *s != Self::Unset)
            .unwrap_or(Self::Ok)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unset => "UNSET",
            Self::Ok => "OK",
            Self::CanContinue => "CAN_CONTINUE",
            Self::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Holds the status of one step. It leaves `Unset` at most once.
#[derive(Debug, Default)]
pub struct StatusCell(AtomicU8);

impl StatusCell {
    /// Current status.
    pub fn get(&self) -> StepStatus {
        StepStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Set the terminal status. Returns false if one was already set.
    pub fn set(&self, status: StepStatus) -> bool {
        let swapped = self
            .0
            .compare_exchange(
                StepStatus::Unset as u8,
                status as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !swapped {
            warn!(current = %self.get(), ignored = %status, "Step status already set");
        }
        swapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(StepStatus::Unset < StepStatus::Ok);
        assert!(StepStatus::Ok < StepStatus::CanContinue);
        assert!(StepStatus::CanContinue < StepStatus::Error);
        assert_eq!(
            StepStatus::worst(&[StepStatus::Ok, StepStatus::Error, StepStatus::CanContinue]),
            StepStatus::Error
        );
        assert_eq!(StepStatus::worst(&[]), StepStatus::Ok);
    }

    #[test]
    fn test_status_is_terminal() {
        let cell = StatusCell::default();
        assert_eq!(cell.get(), StepStatus::Unset);
        assert!(cell.set(StepStatus::Error));
        assert!(!cell.set(StepStatus::Ok));
        assert_eq!(cell.get(), StepStatus::Error);
    }
}
