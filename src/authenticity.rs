//! Reduction of per-feature authenticity checks to a single verdict.
//!
//! Only an explicit `Pass` counts toward "all passed". A feature reported as
//! `Unknown` fails the aggregate, and an empty list is not evidence of
//! authenticity either. When the engine produced no check list at all the
//! verdict is [`AuthenticityVerdict::Unavailable`], distinct from both outcomes.

use serde::{Deserialize, Serialize};

use crate::results::{AuthenticityCheck, CheckStatus};

pub const MSG_AUTHENTIC: &str = "Document is authentic";
pub const MSG_NOT_AUTHENTIC: &str = "Document authenticity check failed";
pub const MSG_UNAVAILABLE: &str = "Authenticity check unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthenticityVerdict {
    Authentic,
    NotAuthentic,
    Unavailable,
}

impl AuthenticityVerdict {
    /// `Some(true)` / `Some(false)` for a definite verdict, `None` when unavailable.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            AuthenticityVerdict::Authentic => Some(true),
            AuthenticityVerdict::NotAuthentic => Some(false),
            AuthenticityVerdict::Unavailable => None,
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            AuthenticityVerdict::Authentic => MSG_AUTHENTIC,
            AuthenticityVerdict::NotAuthentic => MSG_NOT_AUTHENTIC,
            AuthenticityVerdict::Unavailable => MSG_UNAVAILABLE,
        }
    }
}

/// Verdict plus the message shown next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authenticity {
    pub verdict: AuthenticityVerdict,
    pub message: String,
    /// Features that did not report an explicit pass
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_features: Vec<String>,
}

/// Evaluate an optional check list.
pub fn evaluate(checks: Option<&[AuthenticityCheck]>) -> Authenticity {
    let Some(checks) = checks else {
        return Authenticity {
            verdict: AuthenticityVerdict::Unavailable,
            message: MSG_UNAVAILABLE.to_string(),
            failed_features: Vec::new(),
        };
    };

    let failed_features: Vec<String> = checks
        .iter()
        .filter(|c| c.status != CheckStatus::Pass)
        .map(|c| c.feature_id.clone())
        .collect();

    let verdict = if !checks.is_empty() && failed_features.is_empty() {
        AuthenticityVerdict::Authentic
    } else {
        AuthenticityVerdict::NotAuthentic
    };

    tracing::debug!(
        "Authenticity evaluated over {} check(s): {:?}",
        checks.len(),
        verdict
    );

    Authenticity {
        verdict,
        message: verdict.message().to_string(),
        failed_features,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn check(status: CheckStatus) -> AuthenticityCheck {
        AuthenticityCheck::new("feature", status)
    }

    #[test]
    fn test_all_pass_is_authentic() {
        let result = evaluate(Some(&[check(CheckStatus::Pass), check(CheckStatus::Pass)]));
        assert_eq!(result.verdict, AuthenticityVerdict::Authentic);
        assert_eq!(result.message, "Document is authentic");
        assert!(result.failed_features.is_empty());
    }

    #[test]
    fn test_single_fail_is_not_authentic() {
        let checks = [
            check(CheckStatus::Pass),
            AuthenticityCheck::new("mrz", CheckStatus::Fail),
        ];
        let result = evaluate(Some(&checks));
        assert_eq!(result.verdict, AuthenticityVerdict::NotAuthentic);
        assert_eq!(result.message, "Document authenticity check failed");
        assert_eq!(result.failed_features, vec!["mrz".to_string()]);
    }

    #[test]
    fn test_unknown_counts_as_failure() {
        let result = evaluate(Some(&[check(CheckStatus::Pass), check(CheckStatus::Unknown)]));
        assert_eq!(result.verdict, AuthenticityVerdict::NotAuthentic);
    }

    #[test]
    fn test_absent_list_is_unavailable() {
        let result = evaluate(None);
        assert_eq!(result.verdict, AuthenticityVerdict::Unavailable);
        assert_eq!(result.message, "Authenticity check unavailable");
        assert_eq!(result.verdict.as_bool(), None);
    }

    #[test]
    fn test_empty_list_is_not_authentic() {
        let result = evaluate(Some(&[]));
        assert_eq!(result.verdict, AuthenticityVerdict::NotAuthentic);
    }

    fn status_strategy() -> impl Strategy<Value = CheckStatus> {
        prop_oneof![
            Just(CheckStatus::Pass),
            Just(CheckStatus::Fail),
            Just(CheckStatus::Unknown),
        ]
    }

    proptest! {
        /// Property: authentic exactly when the list is non-empty and all pass
        #[test]
        fn prop_verdict_matches_all_pass(statuses in proptest::collection::vec(status_strategy(), 0..12)) {
            let checks: Vec<AuthenticityCheck> = statuses.iter().copied().map(check).collect();
            let expected = !statuses.is_empty() && statuses.iter().all(|s| *s == CheckStatus::Pass);
            let result = evaluate(Some(&checks));
            prop_assert_eq!(result.verdict.as_bool(), Some(expected));
        }
    }
}
