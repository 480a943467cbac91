//! Best-effort analytics tracking. A tracking failure must never fail the
//! request that triggered it, so every error here is logged and dropped.

use serde_json::Value;
use uuid::Uuid;

use crate::database::Database;
use crate::models::{AnalyticsEventType, NewAnalyticsEvent};
use crate::visitor::VisitorContext;

/// A review-page hit reached through a QR code counts as a scan, not a view.
pub fn classify_page_view(source: Option<&str>) -> AnalyticsEventType {
    match source {
        Some("qr") => AnalyticsEventType::Scan,
        _ => AnalyticsEventType::View,
    }
}

/// Appends one analytics event for the business and, for scans, bumps the
/// scan counter. Swallows every error.
pub async fn track_event(
    db: &Database,
    business_id: Uuid,
    event_type: AnalyticsEventType,
    visitor: &VisitorContext,
    additional_data: Option<Value>,
) {
    let geo = visitor.geo.as_ref();
    let event = NewAnalyticsEvent {
        id: Uuid::new_v4(),
        business_id,
        event_type,
        ip_address: visitor.ip_address.clone(),
        user_agent: visitor.user_agent.clone(),
        device_type: visitor.device_type,
        browser: visitor.browser.clone(),
        os: visitor.os.clone(),
        country: geo.and_then(|g| g.country.clone()),
        region: geo.and_then(|g| g.region.clone()),
        city: geo.and_then(|g| g.city.clone()),
        latitude: geo.and_then(|g| g.latitude),
        longitude: geo.and_then(|g| g.longitude),
        referrer: visitor.referrer.clone(),
        additional_data,
    };

    if let Err(err) = db.insert_event(event).await {
        log::warn!(
            "Failed to record {:?} event for business {}: {}",
            event_type,
            business_id,
            err
        );
    }

    if event_type == AnalyticsEventType::Scan {
        if let Err(err) = db.increment_scan_count(business_id).await {
            log::warn!(
                "Failed to bump scan counter for business {}: {}",
                business_id,
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qr_source_classifies_as_scan() {
        assert_eq!(classify_page_view(Some("qr")), AnalyticsEventType::Scan);
        assert_eq!(classify_page_view(Some("link")), AnalyticsEventType::View);
        assert_eq!(classify_page_view(None), AnalyticsEventType::View);
    }
}
