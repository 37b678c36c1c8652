use crate::{ScopeLimit, ScopePeriodSeconds, ScopeRule, ThrottlerOptions};

#[test]
fn scope_limit_try_from_validates_min_1() {
    let limit = ScopeLimit::try_from(1u32).unwrap();
    assert_eq!(*limit, 1u32);

    assert_eq!(
        ScopeLimit::try_from(0u32).unwrap_err(),
        "Scope limit must be at least 1"
    );
}

#[test]
fn scope_period_try_from_validates_positive_finite() {
    let period = ScopePeriodSeconds::try_from(0.5f64).unwrap();
    assert_eq!(*period, 0.5f64);

    assert_eq!(
        ScopePeriodSeconds::try_from(0f64).unwrap_err(),
        "Scope period must be greater than 0"
    );
    assert_eq!(
        ScopePeriodSeconds::try_from(-1f64).unwrap_err(),
        "Scope period must be greater than 0"
    );
    assert_eq!(
        ScopePeriodSeconds::try_from(f64::NAN).unwrap_err(),
        "Scope period must be greater than 0"
    );
    assert_eq!(
        ScopePeriodSeconds::try_from(f64::INFINITY).unwrap_err(),
        "Scope period must be greater than 0"
    );
}

#[test]
fn scope_rule_new_validates_both_fields() {
    let rule = ScopeRule::new(20, 60.0).unwrap();
    assert_eq!(*rule.limit, 20);
    assert_eq!(*rule.period, 60.0);

    assert!(ScopeRule::new(0, 60.0).is_err());
    assert!(ScopeRule::new(20, 0.0).is_err());
}

#[test]
fn default_options_match_documented_platform_limits() {
    let options = ThrottlerOptions::default();

    assert_eq!(*options.per_chat.limit, 1);
    assert_eq!(*options.per_chat.period, 1.0);
    assert_eq!(*options.per_group.limit, 20);
    assert_eq!(*options.per_group.period, 60.0);
    assert_eq!(*options.broadcast.limit, 30);
    assert_eq!(*options.broadcast.period, 1.0);
}
