use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Where a reservation is in its life.
///
/// Every mutating ledger operation goes through [`LifecycleStatus::transition`],
/// which consults the table in [`LifecycleStatus::allowed_next`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LifecycleStatus {
    Active,
    CheckedIn,
    CheckedOut,
    Cancelled,
    NoShow,
    Expired,
}

impl LifecycleStatus {
    pub const ALL: [LifecycleStatus; 6] = [
        LifecycleStatus::Active,
        LifecycleStatus::CheckedIn,
        LifecycleStatus::CheckedOut,
        LifecycleStatus::Cancelled,
        LifecycleStatus::NoShow,
        LifecycleStatus::Expired,
    ];

    pub fn allowed_next(self) -> &'static [LifecycleStatus] {
        use LifecycleStatus::*;
        match self {
            Active => &[CheckedIn, Cancelled, NoShow, Expired],
            CheckedIn => &[CheckedOut, Cancelled],
            CheckedOut | Cancelled | NoShow => &[],
            Expired => &[Cancelled],
        }
    }

    pub fn can_transition_to(self, next: LifecycleStatus) -> bool {
        self.allowed_next().contains(&next)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_next().is_empty()
    }

    /// Cancelled reservations give their (resource, date) slot back.
    pub fn holds_slot(self) -> bool {
        self != LifecycleStatus::Cancelled
    }

    pub fn transition(self, next: LifecycleStatus) -> Result<LifecycleStatus, EngineError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(EngineError::InvalidTransition { from: self, to: next })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Active => "active",
            LifecycleStatus::CheckedIn => "checked-in",
            LifecycleStatus::CheckedOut => "checked-out",
            LifecycleStatus::Cancelled => "cancelled",
            LifecycleStatus::NoShow => "no-show",
            LifecycleStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LifecycleStatus::*;

    #[test]
    fn active_branches() {
        assert!(Active.can_transition_to(CheckedIn));
        assert!(Active.can_transition_to(Cancelled));
        assert!(Active.can_transition_to(NoShow));
        assert!(Active.can_transition_to(Expired));
        assert!(!Active.can_transition_to(CheckedOut));
        assert!(!Active.can_transition_to(Active));
    }

    #[test]
    fn checked_in_can_only_leave_or_cancel() {
        assert_eq!(CheckedIn.allowed_next(), &[CheckedOut, Cancelled]);
    }

    #[test]
    fn terminals_have_no_exits() {
        for status in [CheckedOut, Cancelled, NoShow] {
            assert!(status.is_terminal(), "{status} should be terminal");
            for next in LifecycleStatus::ALL {
                assert!(!status.can_transition_to(next));
            }
        }
    }

    #[test]
    fn expired_can_still_be_cancelled() {
        assert!(!Expired.is_terminal());
        assert_eq!(Expired.transition(Cancelled).unwrap(), Cancelled);
        assert!(matches!(
            Expired.transition(CheckedIn),
            Err(EngineError::InvalidTransition { from: Expired, to: CheckedIn })
        ));
    }

    #[test]
    fn checkout_before_checkin_is_rejected() {
        let err = Active.transition(CheckedOut).unwrap_err();
        assert_eq!(err.to_string(), "invalid transition: active -> checked-out");
    }

    #[test]
    fn only_cancelled_frees_the_slot() {
        let freeing: Vec<_> = LifecycleStatus::ALL
            .into_iter()
            .filter(|s| !s.holds_slot())
            .collect();
        assert_eq!(freeing, vec![Cancelled]);
    }
}
