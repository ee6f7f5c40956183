use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc, Weekday};

use crate::policy::LoanPolicy;

/// Rules that are deployment configuration rather than stored policy.
#[derive(Debug, Clone, Copy)]
pub struct LoanRules {
    /// Fixed UTC offset in which the Friday restriction is evaluated.
    pub weekday_offset: FixedOffset,
}

/// Outcome of an allowed loan decision.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoanGrant {
    pub loan_period_days: i32,
    pub due_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum LoanDenial {
    #[error("loans may only start on Fridays")]
    OutsideLoanWindow,

    #[error("the book is already loaned out")]
    AlreadyLoaned,
}

/// Decides whether a loan may start at `now` and how long it runs.
///
/// Pure and synchronous on purpose: callers fetch the policy and the fresh
/// ledger state, and the write path still guards the insert, so this
/// function never needs a database to be exercised.
///
/// `weekday_offset` is the fixed UTC offset in which "is it Friday" is
/// answered. The host timezone is never consulted.
pub fn decide(
    now: DateTime<Utc>,
    policy: &LoanPolicy,
    weekday_offset: FixedOffset,
    actively_loaned: bool,
) -> Result<LoanGrant, LoanDenial> {
    let active_period = policy.active_period(now);
    let in_open_period = active_period.is_some();
    let is_friday = now.with_timezone(&weekday_offset).weekday() == Weekday::Fri;

    if policy.friday_only && !is_friday && !in_open_period {
        return Err(LoanDenial::OutsideLoanWindow);
    }
    if actively_loaned {
        return Err(LoanDenial::AlreadyLoaned);
    }

    let loan_period_days = active_period
        .map(|period| period.loan_period_days)
        .unwrap_or(policy.loan_period_days);

    // Exact 24h multiples; due dates carry the time of day of the borrow.
    Ok(LoanGrant {
        loan_period_days,
        due_at: now + Duration::days(i64::from(loan_period_days)),
    })
}

#[cfg(test)]
mod eligibility_tests {
    use super::*;
    use crate::policy::OpenPeriod;

    fn at(text: &str) -> DateTime<Utc> {
        text.parse().expect("valid RFC3339 timestamp")
    }

    fn jst() -> FixedOffset {
        FixedOffset::east_opt(9 * 3600).expect("valid offset")
    }

    fn policy_with_march_window() -> LoanPolicy {
        LoanPolicy {
            friday_only: true,
            loan_period_days: 2,
            open_periods: vec![OpenPeriod {
                start_at: at("2026-03-01T00:00:00Z"),
                end_at: at("2026-03-10T23:59:59.999Z"),
                loan_period_days: 14,
            }],
        }
    }

    #[test]
    fn thursday_inside_window_is_allowed_with_window_days() {
        // 2026-03-05 is a Thursday.
        let grant = decide(
            at("2026-03-05T10:00:00Z"),
            &policy_with_march_window(),
            jst(),
            false,
        )
        .unwrap();
        assert_eq!(grant.loan_period_days, 14);
        assert_eq!(grant.due_at, at("2026-03-19T10:00:00Z"));
    }

    #[test]
    fn friday_outside_window_uses_default_days() {
        // 2026-02-20 is a Friday.
        let grant = decide(
            at("2026-02-20T10:00:00Z"),
            &policy_with_march_window(),
            jst(),
            false,
        )
        .unwrap();
        assert_eq!(grant.loan_period_days, 2);
        assert_eq!(grant.due_at, at("2026-02-22T10:00:00Z"));
    }

    #[test]
    fn thursday_outside_window_is_denied() {
        // 2026-02-19 is a Thursday.
        let denial = decide(
            at("2026-02-19T10:00:00Z"),
            &policy_with_march_window(),
            jst(),
            false,
        )
        .unwrap_err();
        assert_eq!(denial, LoanDenial::OutsideLoanWindow);
    }

    #[test]
    fn weekday_is_evaluated_in_the_configured_offset() {
        // 2026-02-20T16:00Z is Friday in UTC but already Saturday 01:00 in JST.
        let policy = LoanPolicy {
            open_periods: vec![],
            ..policy_with_march_window()
        };
        let now = at("2026-02-20T16:00:00Z");
        assert_eq!(
            decide(now, &policy, jst(), false).unwrap_err(),
            LoanDenial::OutsideLoanWindow
        );
        let utc_offset = FixedOffset::east_opt(0).expect("valid offset");
        assert!(decide(now, &policy, utc_offset, false).is_ok());
    }

    #[test]
    fn friday_restriction_off_allows_any_weekday() {
        let policy = LoanPolicy {
            friday_only: false,
            loan_period_days: 5,
            open_periods: vec![],
        };
        let grant = decide(at("2026-02-19T10:00:00Z"), &policy, jst(), false).unwrap();
        assert_eq!(grant.loan_period_days, 5);
        assert_eq!(grant.due_at, at("2026-02-24T10:00:00Z"));
    }

    #[test]
    fn active_loan_is_denied_even_on_friday() {
        let denial = decide(
            at("2026-02-20T10:00:00Z"),
            &policy_with_march_window(),
            jst(),
            true,
        )
        .unwrap_err();
        assert_eq!(denial, LoanDenial::AlreadyLoaned);
    }

    #[test]
    fn active_loan_inside_window_is_denied() {
        let denial = decide(
            at("2026-03-05T10:00:00Z"),
            &policy_with_march_window(),
            jst(),
            true,
        )
        .unwrap_err();
        assert_eq!(denial, LoanDenial::AlreadyLoaned);
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let policy = policy_with_march_window();
        assert!(decide(at("2026-03-01T00:00:00Z"), &policy, jst(), false).is_ok());
        assert!(decide(at("2026-03-10T23:59:59Z"), &policy, jst(), false).is_ok());
        // A Wednesday just after the window closes.
        assert_eq!(
            decide(at("2026-03-11T00:00:00Z"), &policy, jst(), false).unwrap_err(),
            LoanDenial::OutsideLoanWindow
        );
    }

    #[test]
    fn overlapping_windows_resolve_deterministically() {
        let policy = LoanPolicy {
            friday_only: true,
            loan_period_days: 2,
            open_periods: vec![
                OpenPeriod {
                    start_at: at("2026-03-04T00:00:00Z"),
                    end_at: at("2026-03-06T23:59:59.999Z"),
                    loan_period_days: 3,
                },
                OpenPeriod {
                    start_at: at("2026-03-01T00:00:00Z"),
                    end_at: at("2026-03-31T23:59:59.999Z"),
                    loan_period_days: 10,
                },
            ],
        };
        let now = at("2026-03-05T10:00:00Z");
        let first = decide(now, &policy, jst(), false).unwrap();
        for _ in 0..10 {
            assert_eq!(decide(now, &policy, jst(), false).unwrap(), first);
        }
        assert_eq!(first.loan_period_days, 10);
    }

    #[test]
    fn due_date_is_exact_day_multiples_from_now() {
        let policy = LoanPolicy {
            friday_only: false,
            loan_period_days: 365,
            open_periods: vec![],
        };
        let now = at("2026-02-19T13:37:42.123Z");
        let grant = decide(now, &policy, jst(), false).unwrap();
        assert_eq!(grant.due_at - now, Duration::days(365));
    }
}
