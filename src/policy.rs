use std::collections::HashSet;

use crate::model::Principal;

/// Decides who may perform privileged operations. Injected into the engine
/// instead of being read from process-wide state.
pub trait AuthorizationPolicy: Send + Sync {
    fn is_privileged(&self, principal: &Principal) -> bool;

    /// Owners may act on their own reservations; privileged actors on any.
    fn can_manage(&self, principal: &Principal, owner_uid: &str) -> bool {
        principal.uid == owner_uid || self.is_privileged(principal)
    }
}

/// Trusts the `is_privileged` flag the identity collaborator derived.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrincipalFlagPolicy;

impl AuthorizationPolicy for PrincipalFlagPolicy {
    fn is_privileged(&self, principal: &Principal) -> bool {
        principal.is_privileged
    }
}

/// The flag, or membership in a configured list of administrator emails.
/// Email comparison is case-insensitive.
#[derive(Debug, Default, Clone)]
pub struct PrivilegedEmailsPolicy {
    emails: HashSet<String>,
}

impl PrivilegedEmailsPolicy {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }
}

impl AuthorizationPolicy for PrivilegedEmailsPolicy {
    fn is_privileged(&self, principal: &Principal) -> bool {
        principal.is_privileged || self.emails.contains(&principal.email.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_policy_trusts_flag() {
        let policy = PrincipalFlagPolicy;
        assert!(!policy.is_privileged(&Principal::new("u1", "u1@example.com")));
        assert!(policy.is_privileged(&Principal::new("u1", "u1@example.com").privileged()));
    }

    #[test]
    fn owner_can_manage_own_reservation() {
        let policy = PrincipalFlagPolicy;
        let owner = Principal::new("u1", "u1@example.com");
        assert!(policy.can_manage(&owner, "u1"));
        assert!(!policy.can_manage(&owner, "u2"));
        assert!(policy.can_manage(&owner.privileged(), "u2"));
    }

    #[test]
    fn email_list_is_case_insensitive() {
        let policy = PrivilegedEmailsPolicy::new([" Admin@Example.com ", ""]);
        assert_eq!(policy.len(), 1);
        assert!(policy.is_privileged(&Principal::new("a", "admin@example.COM")));
        assert!(!policy.is_privileged(&Principal::new("b", "someone@example.com")));
    }
}
