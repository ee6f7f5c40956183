use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::api::{ExceptionRuleDto, PolicyUpdateRequest};

pub const DEFAULT_LOAN_PERIOD_DAYS: i32 = 2;
pub const MIN_LOAN_PERIOD_DAYS: i32 = 1;
pub const MAX_LOAN_PERIOD_DAYS: i32 = 365;

/// A dated override of the default loan rules. Bounds are the whole
/// calendar days of the submitted date strings, in UTC.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OpenPeriod {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub loan_period_days: i32,
}

impl OpenPeriod {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.start_at <= at && at <= self.end_at
    }
}

/// The current loan rules. Only enabled exception windows are present;
/// retired generations never leave the store.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LoanPolicy {
    pub friday_only: bool,
    pub loan_period_days: i32,
    pub open_periods: Vec<OpenPeriod>,
}

impl Default for LoanPolicy {
    fn default() -> Self {
        Self {
            friday_only: true,
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            open_periods: Vec::new(),
        }
    }
}

impl LoanPolicy {
    /// The exception window covering `at`, if any. When windows overlap the
    /// earliest start wins, then the earliest end, then submission order,
    /// so the same input always resolves to the same window.
    pub fn active_period(&self, at: DateTime<Utc>) -> Option<&OpenPeriod> {
        self.open_periods
            .iter()
            .enumerate()
            .filter(|(_, period)| period.covers(at))
            .min_by_key(|(index, period)| (period.start_at, period.end_at, *index))
            .map(|(_, period)| period)
    }
}

/// A validated replacement for the whole policy, ready to persist.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PolicyUpdate {
    pub friday_only: bool,
    pub loan_period_days: i32,
    pub open_periods: Vec<OpenPeriod>,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PolicyValidationError {
    #[error("loanPeriodDays must be an integer between 1 and 365")]
    InvalidLoanPeriodDays,

    #[error("exceptionRules[{0}].loanPeriodDays must be an integer between 1 and 365")]
    InvalidRuleLoanPeriodDays(usize),

    #[error("exceptionRules[{0}] has an invalid date, expected YYYY-MM-DD")]
    InvalidRuleDate(usize),

    #[error("exceptionRules[{0}].startDate must not be after endDate")]
    RuleStartAfterEnd(usize),

    #[error("exceptionStartDate and exceptionEndDate must be provided together")]
    IncompleteLegacyRange,

    #[error("exceptionStartDate or exceptionEndDate is invalid, expected YYYY-MM-DD")]
    InvalidLegacyDate,

    #[error("exceptionStartDate must not be after exceptionEndDate")]
    LegacyStartAfterEnd,

    #[error("exceptionEndDate must not be in the past")]
    LegacyEndInPast,

    #[error("exceptionLoanPeriodDays must be an integer between 1 and 365")]
    InvalidExceptionLoanPeriodDays,
}

/// Validates an admin policy update and normalizes it into a [`PolicyUpdate`].
///
/// A request without an `exceptionRules` array is taken from the older flat
/// single-window client shape and normalized into a one-element list. Only
/// that legacy path rejects a window ending before `now`.
pub fn validate_update(
    request: &PolicyUpdateRequest,
    now: DateTime<Utc>,
) -> Result<PolicyUpdate, PolicyValidationError> {
    if !loan_days_in_range(request.loan_period_days) {
        return Err(PolicyValidationError::InvalidLoanPeriodDays);
    }

    let open_periods = match &request.exception_rules {
        Some(rules) => validate_rules(rules)?,
        None => validate_legacy_rule(request, now)?,
    };

    Ok(PolicyUpdate {
        friday_only: request.friday_only,
        loan_period_days: request.loan_period_days,
        open_periods,
    })
}

fn validate_rules(rules: &[ExceptionRuleDto]) -> Result<Vec<OpenPeriod>, PolicyValidationError> {
    let mut periods = Vec::with_capacity(rules.len());
    for (index, rule) in rules.iter().enumerate() {
        let start_at = parse_day_start(&rule.start_date)
            .ok_or(PolicyValidationError::InvalidRuleDate(index))?;
        let end_at = parse_day_end(&rule.end_date)
            .ok_or(PolicyValidationError::InvalidRuleDate(index))?;
        if start_at > end_at {
            return Err(PolicyValidationError::RuleStartAfterEnd(index));
        }
        if !loan_days_in_range(rule.loan_period_days) {
            return Err(PolicyValidationError::InvalidRuleLoanPeriodDays(index));
        }
        periods.push(OpenPeriod {
            start_at,
            end_at,
            loan_period_days: rule.loan_period_days,
        });
    }
    Ok(periods)
}

fn validate_legacy_rule(
    request: &PolicyUpdateRequest,
    now: DateTime<Utc>,
) -> Result<Vec<OpenPeriod>, PolicyValidationError> {
    let start_text = request
        .exception_start_date
        .as_deref()
        .filter(|text| !text.is_empty());
    let end_text = request
        .exception_end_date
        .as_deref()
        .filter(|text| !text.is_empty());

    let (start_text, end_text) = match (start_text, end_text) {
        (Some(start), Some(end)) => (start, end),
        (None, None) => return Ok(Vec::new()),
        _ => return Err(PolicyValidationError::IncompleteLegacyRange),
    };

    let start_at = parse_day_start(start_text).ok_or(PolicyValidationError::InvalidLegacyDate)?;
    let end_at = parse_day_end(end_text).ok_or(PolicyValidationError::InvalidLegacyDate)?;
    if start_at > end_at {
        return Err(PolicyValidationError::LegacyStartAfterEnd);
    }
    if end_at < now {
        return Err(PolicyValidationError::LegacyEndInPast);
    }

    let loan_period_days = request
        .exception_loan_period_days
        .filter(|days| loan_days_in_range(*days))
        .ok_or(PolicyValidationError::InvalidExceptionLoanPeriodDays)?;

    Ok(vec![OpenPeriod {
        start_at,
        end_at,
        loan_period_days,
    }])
}

fn loan_days_in_range(days: i32) -> bool {
    (MIN_LOAN_PERIOD_DAYS..=MAX_LOAN_PERIOD_DAYS).contains(&days)
}

/// `YYYY-MM-DD` only; anything longer or shorter is rejected.
fn parse_date_only(text: &str) -> Option<NaiveDate> {
    if text.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()
}

pub fn parse_day_start(text: &str) -> Option<DateTime<Utc>> {
    let date = parse_date_only(text)?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

pub fn parse_day_end(text: &str) -> Option<DateTime<Utc>> {
    let date = parse_date_only(text)?;
    Some(Utc.from_utc_datetime(&date.and_hms_milli_opt(23, 59, 59, 999)?))
}

pub fn format_day(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod policy_tests {
    use super::*;

    fn base_request() -> PolicyUpdateRequest {
        PolicyUpdateRequest {
            friday_only: true,
            loan_period_days: 2,
            exception_rules: None,
            exception_start_date: None,
            exception_end_date: None,
            exception_loan_period_days: None,
        }
    }

    fn at(text: &str) -> DateTime<Utc> {
        text.parse().expect("valid RFC3339 timestamp")
    }

    #[test]
    fn update_without_exceptions_normalizes_to_empty_window_list() {
        let update = validate_update(&base_request(), at("2026-02-01T00:00:00Z")).unwrap();
        assert!(update.friday_only);
        assert_eq!(update.loan_period_days, 2);
        assert_eq!(update.open_periods, vec![]);
    }

    #[test]
    fn loan_period_days_out_of_range_is_rejected() {
        for days in [0, -1, 366] {
            let request = PolicyUpdateRequest {
                loan_period_days: days,
                ..base_request()
            };
            assert_eq!(
                validate_update(&request, at("2026-02-01T00:00:00Z")),
                Err(PolicyValidationError::InvalidLoanPeriodDays)
            );
        }
    }

    #[test]
    fn rules_are_parsed_into_whole_day_bounds() {
        let request = PolicyUpdateRequest {
            exception_rules: Some(vec![ExceptionRuleDto {
                start_date: "2026-03-01".to_string(),
                end_date: "2026-03-10".to_string(),
                loan_period_days: 14,
            }]),
            ..base_request()
        };
        let update = validate_update(&request, at("2026-02-01T00:00:00Z")).unwrap();
        assert_eq!(
            update.open_periods,
            vec![OpenPeriod {
                start_at: at("2026-03-01T00:00:00Z"),
                end_at: at("2026-03-10T23:59:59.999Z"),
                loan_period_days: 14,
            }]
        );
    }

    #[test]
    fn rule_with_reversed_dates_is_rejected() {
        let request = PolicyUpdateRequest {
            exception_rules: Some(vec![ExceptionRuleDto {
                start_date: "2026-03-10".to_string(),
                end_date: "2026-03-01".to_string(),
                loan_period_days: 14,
            }]),
            ..base_request()
        };
        assert_eq!(
            validate_update(&request, at("2026-02-01T00:00:00Z")),
            Err(PolicyValidationError::RuleStartAfterEnd(0))
        );
    }

    #[test]
    fn rule_with_malformed_date_is_rejected() {
        for bad_date in ["2026/03/01", "2026-3-1", "not-a-date", "2026-03-01T00:00:00Z"] {
            let request = PolicyUpdateRequest {
                exception_rules: Some(vec![ExceptionRuleDto {
                    start_date: bad_date.to_string(),
                    end_date: "2026-03-10".to_string(),
                    loan_period_days: 14,
                }]),
                ..base_request()
            };
            assert_eq!(
                validate_update(&request, at("2026-02-01T00:00:00Z")),
                Err(PolicyValidationError::InvalidRuleDate(0)),
                "{bad_date} should not parse"
            );
        }
    }

    #[test]
    fn rule_loan_days_out_of_range_names_the_rule() {
        let request = PolicyUpdateRequest {
            exception_rules: Some(vec![
                ExceptionRuleDto {
                    start_date: "2026-03-01".to_string(),
                    end_date: "2026-03-10".to_string(),
                    loan_period_days: 14,
                },
                ExceptionRuleDto {
                    start_date: "2026-04-01".to_string(),
                    end_date: "2026-04-10".to_string(),
                    loan_period_days: 400,
                },
            ]),
            ..base_request()
        };
        assert_eq!(
            validate_update(&request, at("2026-02-01T00:00:00Z")),
            Err(PolicyValidationError::InvalidRuleLoanPeriodDays(1))
        );
    }

    #[test]
    fn legacy_shape_normalizes_into_one_window() {
        let request = PolicyUpdateRequest {
            exception_start_date: Some("2026-03-01".to_string()),
            exception_end_date: Some("2026-03-10".to_string()),
            exception_loan_period_days: Some(7),
            ..base_request()
        };
        let update = validate_update(&request, at("2026-02-01T00:00:00Z")).unwrap();
        assert_eq!(update.open_periods.len(), 1);
        assert_eq!(update.open_periods[0].loan_period_days, 7);
    }

    #[test]
    fn legacy_shape_requires_both_dates() {
        let request = PolicyUpdateRequest {
            exception_start_date: Some("2026-03-01".to_string()),
            exception_loan_period_days: Some(7),
            ..base_request()
        };
        assert_eq!(
            validate_update(&request, at("2026-02-01T00:00:00Z")),
            Err(PolicyValidationError::IncompleteLegacyRange)
        );
    }

    #[test]
    fn legacy_shape_rejects_windows_already_over() {
        let request = PolicyUpdateRequest {
            exception_start_date: Some("2026-01-01".to_string()),
            exception_end_date: Some("2026-01-10".to_string()),
            exception_loan_period_days: Some(7),
            ..base_request()
        };
        assert_eq!(
            validate_update(&request, at("2026-02-01T00:00:00Z")),
            Err(PolicyValidationError::LegacyEndInPast)
        );
    }

    #[test]
    fn empty_legacy_dates_mean_no_windows() {
        let request = PolicyUpdateRequest {
            exception_start_date: Some(String::new()),
            exception_end_date: Some(String::new()),
            ..base_request()
        };
        let update = validate_update(&request, at("2026-02-01T00:00:00Z")).unwrap();
        assert_eq!(update.open_periods, vec![]);
    }

    #[test]
    fn active_period_prefers_earliest_start_then_earliest_end() {
        let wide = OpenPeriod {
            start_at: at("2026-03-01T00:00:00Z"),
            end_at: at("2026-03-31T23:59:59.999Z"),
            loan_period_days: 10,
        };
        let narrow = OpenPeriod {
            start_at: at("2026-03-04T00:00:00Z"),
            end_at: at("2026-03-06T23:59:59.999Z"),
            loan_period_days: 3,
        };
        let policy = LoanPolicy {
            friday_only: true,
            loan_period_days: 2,
            open_periods: vec![narrow.clone(), wide.clone()],
        };

        // Both cover the instant; the earlier start wins regardless of order.
        let picked = policy.active_period(at("2026-03-05T12:00:00Z")).unwrap();
        assert_eq!(picked, &wide);

        let reordered = LoanPolicy {
            open_periods: vec![wide.clone(), narrow],
            ..policy
        };
        let picked = reordered.active_period(at("2026-03-05T12:00:00Z")).unwrap();
        assert_eq!(picked, &wide);
    }

    #[test]
    fn active_period_is_none_outside_every_window() {
        let policy = LoanPolicy {
            friday_only: true,
            loan_period_days: 2,
            open_periods: vec![OpenPeriod {
                start_at: at("2026-03-01T00:00:00Z"),
                end_at: at("2026-03-10T23:59:59.999Z"),
                loan_period_days: 14,
            }],
        };
        assert!(policy.active_period(at("2026-02-28T23:59:59Z")).is_none());
        assert!(policy.active_period(at("2026-03-11T00:00:00Z")).is_none());
    }
}
