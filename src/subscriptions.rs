// ============================================================================
// SUBSCRIPTION LIFECYCLE RULES
// ============================================================================
//
// Pure decision logic for the subscription state machine. The SQL layer
// enforces the same guards in its WHERE clauses; these functions are the
// single place the rules are written down and unit-tested.

use chrono::{DateTime, Months, Utc};

use crate::models::{BillingCycle, SubscriptionStatus};

/// One calendar billing cycle forward from `from`. Month arithmetic clamps
/// to the last day of shorter months (Jan 31 + 1 month = Feb 28/29).
pub fn cycle_end(from: DateTime<Utc>, cycle: BillingCycle) -> DateTime<Utc> {
    match cycle {
        BillingCycle::Monthly => from + Months::new(1),
        BillingCycle::Yearly => from + Months::new(12),
    }
}

/// Activation is legal from `pending` only.
pub fn can_activate(status: SubscriptionStatus) -> bool {
    matches!(status, SubscriptionStatus::Pending)
}

/// Cancellation is legal from `active` only.
pub fn can_cancel(status: SubscriptionStatus) -> bool {
    matches!(status, SubscriptionStatus::Active)
}

/// Renewal is legal from `active` or `expired`.
pub fn can_renew(status: SubscriptionStatus) -> bool {
    matches!(
        status,
        SubscriptionStatus::Active | SubscriptionStatus::Expired
    )
}

/// Validity window granted when a pending subscription is confirmed. The
/// clock restarts at the activation instant, so a payment that lands days
/// after checkout still buys a full cycle.
pub fn activation_window(
    now: DateTime<Utc>,
    cycle: BillingCycle,
) -> (DateTime<Utc>, DateTime<Utc>) {
    (now, cycle_end(now, cycle))
}

/// Renewal extends from the later of now and the current window end, so
/// renewing early never loses paid-for time.
pub fn renewal_end(
    current_ends_at: DateTime<Utc>,
    now: DateTime<Utc>,
    cycle: BillingCycle,
) -> DateTime<Utc> {
    cycle_end(current_ends_at.max(now), cycle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn monthly_cycle_follows_the_calendar() {
        assert_eq!(
            cycle_end(at(2024, 1, 15), BillingCycle::Monthly),
            at(2024, 2, 15)
        );
        // End-of-month clamping, leap year.
        assert_eq!(
            cycle_end(at(2024, 1, 31), BillingCycle::Monthly),
            at(2024, 2, 29)
        );
        assert_eq!(
            cycle_end(at(2025, 1, 31), BillingCycle::Monthly),
            at(2025, 2, 28)
        );
    }

    #[test]
    fn yearly_cycle_follows_the_calendar() {
        assert_eq!(
            cycle_end(at(2024, 3, 10), BillingCycle::Yearly),
            at(2025, 3, 10)
        );
        assert_eq!(
            cycle_end(at(2024, 2, 29), BillingCycle::Yearly),
            at(2025, 2, 28)
        );
    }

    #[test]
    fn activation_is_legal_from_pending_only() {
        assert!(can_activate(SubscriptionStatus::Pending));
        assert!(!can_activate(SubscriptionStatus::Active));
        assert!(!can_activate(SubscriptionStatus::Cancelled));
        assert!(!can_activate(SubscriptionStatus::Expired));
        assert!(!can_activate(SubscriptionStatus::Inactive));
    }

    #[test]
    fn cancellation_is_legal_from_active_only() {
        assert!(can_cancel(SubscriptionStatus::Active));
        assert!(!can_cancel(SubscriptionStatus::Pending));
        assert!(!can_cancel(SubscriptionStatus::Cancelled));
        assert!(!can_cancel(SubscriptionStatus::Expired));
        assert!(!can_cancel(SubscriptionStatus::Inactive));
    }

    #[test]
    fn renewal_is_legal_from_active_or_expired_only() {
        assert!(can_renew(SubscriptionStatus::Active));
        assert!(can_renew(SubscriptionStatus::Expired));
        assert!(!can_renew(SubscriptionStatus::Pending));
        assert!(!can_renew(SubscriptionStatus::Cancelled));
        assert!(!can_renew(SubscriptionStatus::Inactive));
    }

    #[test]
    fn activation_restarts_the_clock_at_confirmation_time() {
        // Checkout happened Jan 1; payment confirmed Jan 10. The window must
        // run from Jan 10, not from checkout.
        let confirmed = at(2024, 1, 10);
        let (starts_at, ends_at) = activation_window(confirmed, BillingCycle::Monthly);
        assert_eq!(starts_at, confirmed);
        assert_eq!(ends_at, at(2024, 2, 10));
    }

    #[test]
    fn early_renewal_extends_from_the_current_window_end() {
        let ends_at = at(2024, 6, 30);
        let now = at(2024, 6, 20);
        assert_eq!(
            renewal_end(ends_at, now, BillingCycle::Monthly),
            at(2024, 7, 30)
        );
    }

    #[test]
    fn late_renewal_extends_from_now() {
        let ends_at = at(2024, 6, 30);
        let now = at(2024, 8, 5);
        assert_eq!(
            renewal_end(ends_at, now, BillingCycle::Monthly),
            at(2024, 9, 5)
        );
    }
}
