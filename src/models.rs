use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

// ============================================================================
// ENUMS
// ============================================================================

/// Tenant role (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, postgres_types::ToSql, postgres_types::FromSql)]
#[sqlx(type_name = "user_role", rename_all = "snake_case")]
#[postgres(name = "user_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    MasterAdmin,
    User,
}

/// Device class parsed from the user agent (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, postgres_types::ToSql, postgres_types::FromSql)]
#[sqlx(type_name = "device_type", rename_all = "snake_case")]
#[postgres(name = "device_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Mobile,
    Tablet,
    Desktop,
    Unknown,
}

/// Tracked event kinds (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, postgres_types::ToSql, postgres_types::FromSql)]
#[sqlx(type_name = "analytics_event_type", rename_all = "snake_case")]
#[postgres(name = "analytics_event_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsEventType {
    View,
    Scan,
    ReviewSubmit,
    Redirect,
}

/// Plan billing cycle (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, postgres_types::ToSql, postgres_types::FromSql)]
#[sqlx(type_name = "billing_cycle", rename_all = "snake_case")]
#[postgres(name = "billing_cycle", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

/// Subscription lifecycle state (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, postgres_types::ToSql, postgres_types::FromSql)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[postgres(name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Cancelled,
    Expired,
    Inactive,
}

/// Declared type of a stored setting value; drives decoding (also a Postgres enum)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type, postgres_types::ToSql, postgres_types::FromSql)]
#[sqlx(type_name = "setting_type", rename_all = "snake_case")]
#[postgres(name = "setting_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SettingType {
    String,
    Json,
    Boolean,
    Integer,
    Decimal,
}

// ============================================================================
// TENANTS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// BUSINESSES
// ============================================================================

/// A tenant's storefront entity; owns reviews, analytics events and platform links
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Business {
    pub id: Uuid,
    pub user_id: Uuid,
    pub slug: String,
    pub business_name: String,
    pub full_name: String,
    pub address: String,
    pub state: String,
    pub city: String,
    pub area: String,
    pub pincode: String,
    pub mobile_number: String,
    pub telephone_number: Option<String>,
    pub email: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub business_hours: Option<Value>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub total_scans: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Business {
    /// Derives a URL-safe slug from the business name and a creation instant.
    /// Called once at the creation call site; the stored slug is immutable
    /// afterwards unless the caller explicitly asks for regeneration.
    pub fn generate_slug(name: &str, at: DateTime<Utc>) -> String {
        let mut slug = String::with_capacity(name.len() + 12);
        let mut last_dash = true;
        for ch in name.chars() {
            if ch.is_ascii_alphanumeric() {
                slug.push(ch.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                slug.push('-');
                last_dash = true;
            }
        }
        let trimmed = slug.trim_end_matches('-');
        format!("{}-{}", trimmed, at.timestamp())
    }
}

/// Helper struct used when inserting a new business
#[derive(Debug, Clone)]
pub struct NewBusiness {
    pub id: Uuid,
    pub user_id: Uuid,
    pub slug: String,
    pub business_name: String,
    pub full_name: String,
    pub address: String,
    pub state: String,
    pub city: String,
    pub area: String,
    pub pincode: String,
    pub mobile_number: String,
    pub telephone_number: Option<String>,
    pub email: String,
    pub website: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub business_hours: Option<Value>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// REVIEW PLATFORMS
// ============================================================================

/// External review site catalog entry (Google, Facebook, ...)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReviewPlatform {
    pub id: Uuid,
    pub name: String,
    pub icon: Option<String>,
    pub color: String,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-(business, platform) link row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BusinessPlatform {
    pub id: Uuid,
    pub business_id: Uuid,
    pub platform_id: Uuid,
    pub business_link: Option<String>,
    pub review_link: Option<String>,
    pub additional_data: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Platform link joined with its catalog entry, as shown on the review page
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BusinessPlatformView {
    pub platform_id: Uuid,
    pub name: String,
    pub color: String,
    pub icon: Option<String>,
    pub business_link: Option<String>,
    pub review_link: Option<String>,
    pub is_active: bool,
}

// ============================================================================
// REVIEWS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: Uuid,
    pub business_id: Uuid,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub rating: i32,
    pub review_text: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: DeviceType,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub location: Option<String>,
    pub is_approved: bool,
    pub is_featured: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Helper struct used when inserting a new review
#[derive(Debug, Clone)]
pub struct NewReview {
    pub id: Uuid,
    pub business_id: Uuid,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub rating: i32,
    pub review_text: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_type: DeviceType,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub location: Option<String>,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Approved-review aggregates for a business
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewStats {
    pub average_rating: f64,
    pub total_reviews: i64,
    /// Counts for ratings 1..=5, in order
    pub star_distribution: [i64; 5],
}

// ============================================================================
// ANALYTICS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnalyticsEvent {
    pub id: Uuid,
    pub business_id: Uuid,
    pub event_type: AnalyticsEventType,
    pub ip_address: String,
    pub user_agent: String,
    pub device_type: Option<DeviceType>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub referrer: Option<String>,
    pub additional_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// Helper struct used when appending an analytics event
#[derive(Debug, Clone)]
pub struct NewAnalyticsEvent {
    pub id: Uuid,
    pub business_id: Uuid,
    pub event_type: AnalyticsEventType,
    pub ip_address: String,
    pub user_agent: String,
    pub device_type: Option<DeviceType>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub referrer: Option<String>,
    pub additional_data: Option<Value>,
}

/// One grouped count line (device, browser, OS or event type)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CountByKey {
    pub key: String,
    pub count: i64,
}

/// Grouped count by coarse location
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LocationCount {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub count: i64,
}

/// Per-day event counts for charting
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyCount {
    pub day: chrono::NaiveDate,
    pub event_type: AnalyticsEventType,
    pub count: i64,
}

/// Full aggregation payload for a business analytics dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub devices: Vec<CountByKey>,
    pub browsers: Vec<CountByKey>,
    pub operating_systems: Vec<CountByKey>,
    pub locations: Vec<LocationCount>,
    pub events: Vec<CountByKey>,
    pub daily: Vec<DailyCount>,
}

// ============================================================================
// PLANS & SUBSCRIPTIONS
// ============================================================================

/// Sentinel used by plan limits to mean "unlimited"
pub const UNLIMITED: i32 = -1;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub billing_cycle: BillingCycle,
    pub business_limit: i32,
    pub review_limit_per_month: i32,
    pub analytics_retention_days: i32,
    pub features: Value,
    pub is_popular: bool,
    pub is_active: bool,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn can_create_business(&self, current_count: i64) -> bool {
        self.business_limit == UNLIMITED || current_count < i64::from(self.business_limit)
    }

    pub fn can_submit_review(&self, monthly_count: i64) -> bool {
        self.review_limit_per_month == UNLIMITED
            || monthly_count < i64::from(self.review_limit_per_month)
    }

    pub fn remaining_business_slots(&self, current_count: i64) -> i64 {
        if self.business_limit == UNLIMITED {
            return i64::from(UNLIMITED);
        }
        (i64::from(self.business_limit) - current_count).max(0)
    }

    pub fn remaining_review_slots(&self, monthly_count: i64) -> i64 {
        if self.review_limit_per_month == UNLIMITED {
            return i64::from(UNLIMITED);
        }
        (i64::from(self.review_limit_per_month) - monthly_count).max(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub amount: f64,
    pub billing_cycle: BillingCycle,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
    pub payment_details: Option<Value>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Helper struct used when inserting a new subscription
#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub subscription_id: String,
    pub status: SubscriptionStatus,
    pub amount: f64,
    pub billing_cycle: BillingCycle,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub next_billing_date: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
    pub payment_details: Option<Value>,
}

/// Current usage against plan quotas
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub business_count: i64,
    pub monthly_review_count: i64,
    pub business_limit: i32,
    pub review_limit_per_month: i32,
    pub can_create_business: bool,
    pub can_submit_review: bool,
    pub remaining_business_slots: i64,
    pub remaining_review_slots: i64,
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Setting {
    pub key: String,
    pub value: Option<String>,
    pub value_type: SettingType,
    pub description: Option<String>,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// REQUEST/RESPONSE DTOs
// ============================================================================

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now(),
        }
    }
}

/// Payload to register a business under a tenant
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBusinessRequest {
    #[validate(length(min = 2, max = 255))]
    pub business_name: String,
    #[validate(length(min = 2, max = 255))]
    pub full_name: String,
    #[validate(length(min = 5))]
    pub address: String,
    #[validate(length(min = 2, max = 120))]
    pub state: String,
    #[validate(length(min = 2, max = 120))]
    pub city: String,
    #[validate(length(min = 1, max = 120))]
    pub area: String,
    #[validate(length(min = 3, max = 16))]
    pub pincode: String,
    #[validate(length(min = 5, max = 20))]
    pub mobile_number: String,
    pub telephone_number: Option<String>,
    #[validate(email)]
    pub email: String,
    #[validate(url)]
    pub website: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 120))]
    pub category: Option<String>,
    pub business_hours: Option<Value>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Optional explicit slug; generated from the name when absent
    pub slug: Option<String>,
}

impl CreateBusinessRequest {
    pub fn into_new_business(self, user_id: Uuid) -> NewBusiness {
        let now = Utc::now();
        let slug = match self.slug.filter(|s| !s.trim().is_empty()) {
            Some(slug) => slug,
            None => Business::generate_slug(&self.business_name, now),
        };

        NewBusiness {
            id: Uuid::new_v4(),
            user_id,
            slug,
            business_name: self.business_name,
            full_name: self.full_name,
            address: self.address,
            state: self.state,
            city: self.city,
            area: self.area,
            pincode: self.pincode,
            mobile_number: self.mobile_number,
            telephone_number: self.telephone_number,
            email: self.email,
            website: self.website,
            description: self.description,
            category: self.category,
            business_hours: self.business_hours,
            latitude: self.latitude,
            longitude: self.longitude,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Payload to update a business profile. The slug never changes on update
/// unless `regenerate_slug` is set, in which case it is recomputed from the
/// (possibly updated) business name.
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateBusinessRequest {
    #[validate(length(min = 2, max = 255))]
    pub business_name: String,
    #[validate(length(min = 2, max = 255))]
    pub full_name: String,
    #[validate(length(min = 5))]
    pub address: String,
    #[validate(length(min = 2, max = 120))]
    pub state: String,
    #[validate(length(min = 2, max = 120))]
    pub city: String,
    #[validate(length(min = 1, max = 120))]
    pub area: String,
    #[validate(length(min = 3, max = 16))]
    pub pincode: String,
    #[validate(length(min = 5, max = 20))]
    pub mobile_number: String,
    pub telephone_number: Option<String>,
    #[validate(email)]
    pub email: String,
    #[validate(url)]
    pub website: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 120))]
    pub category: Option<String>,
    pub business_hours: Option<Value>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub regenerate_slug: bool,
}

impl UpdateBusinessRequest {
    pub fn apply_to_existing(&self, existing: &mut Business) {
        existing.business_name = self.business_name.clone();
        existing.full_name = self.full_name.clone();
        existing.address = self.address.clone();
        existing.state = self.state.clone();
        existing.city = self.city.clone();
        existing.area = self.area.clone();
        existing.pincode = self.pincode.clone();
        existing.mobile_number = self.mobile_number.clone();
        existing.telephone_number = self.telephone_number.clone();
        existing.email = self.email.clone();
        existing.website = self.website.clone();
        existing.description = self.description.clone();
        existing.category = self.category.clone();
        existing.business_hours = self.business_hours.clone();
        existing.latitude = self.latitude;
        existing.longitude = self.longitude;
        let now = Utc::now();
        if self.regenerate_slug {
            existing.slug = Business::generate_slug(&existing.business_name, now);
        }
        existing.updated_at = now;
    }
}

/// Public review submission form
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReviewRequest {
    pub rating: Option<i64>,
    pub review_text: Option<String>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

/// Client action directive returned after a successful review submission
#[derive(Debug, Serialize)]
pub struct SubmitReviewResponse {
    pub success: bool,
    pub review_id: Uuid,
    pub rating: i32,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_delay: Option<i64>,
    pub message: String,
}

/// One platform link in a bulk platform upsert
#[derive(Debug, Deserialize)]
pub struct PlatformLinkInput {
    pub platform_id: Uuid,
    pub business_link: Option<String>,
    pub review_link: Option<String>,
    pub additional_data: Option<Value>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Bulk upsert of a business's platform links
#[derive(Debug, Deserialize)]
pub struct UpsertPlatformsRequest {
    pub platforms: Vec<PlatformLinkInput>,
}

/// Query params for the suggestions endpoint
#[derive(Debug, Deserialize)]
pub struct SuggestionsQuery {
    pub rating: Option<i32>,
    pub keywords: Option<String>,
}

/// Request to start a subscription on a plan
#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub plan_id: Uuid,
    pub payment_method: Option<String>,
    pub payment_id: Option<String>,
    pub payment_details: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    pub reason: Option<String>,
}

/// Request to write a setting
#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: Value,
    pub value_type: SettingType,
    pub description: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

// ============================================================================
// COMPOSITE RESPONSE TYPES
// ============================================================================

/// Everything the public review page needs in one payload
#[derive(Debug, Serialize)]
pub struct ReviewPagePayload {
    pub business: Business,
    pub platforms: Vec<BusinessPlatformView>,
    pub stats: ReviewStats,
    pub recent_reviews: Vec<Review>,
    pub settings: BTreeMap<String, Value>,
}

/// Active subscription with its plan and usage
#[derive(Debug, Serialize)]
pub struct SubscriptionWithUsage {
    pub subscription: UserSubscription,
    pub plan: Plan,
    pub usage: UsageStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slug_is_url_safe_and_timestamped() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let slug = Business::generate_slug("Acme Cafe & Grill!", at);
        assert_eq!(slug, format!("acme-cafe-grill-{}", at.timestamp()));
        assert!(slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
    }

    #[test]
    fn slug_differs_at_different_times() {
        let a = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 1).unwrap();
        assert_ne!(
            Business::generate_slug("Acme Cafe", a),
            Business::generate_slug("Acme Cafe", b)
        );
    }

    fn plan_with_limits(business_limit: i32, review_limit: i32) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            name: "Test".into(),
            description: None,
            price: 0.0,
            billing_cycle: BillingCycle::Monthly,
            business_limit,
            review_limit_per_month: review_limit,
            analytics_retention_days: 30,
            features: serde_json::json!([]),
            is_popular: false,
            is_active: true,
            sort_order: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn plan_quota_sentinel_means_unlimited() {
        let plan = plan_with_limits(UNLIMITED, UNLIMITED);
        assert!(plan.can_create_business(1_000_000));
        assert!(plan.can_submit_review(1_000_000));
        assert_eq!(plan.remaining_business_slots(5), -1);
        assert_eq!(plan.remaining_review_slots(5), -1);
    }

    #[test]
    fn plan_quota_limits_are_exclusive_at_the_cap() {
        let plan = plan_with_limits(1, 100);
        assert!(plan.can_create_business(0));
        assert!(!plan.can_create_business(1));
        assert!(plan.can_submit_review(99));
        assert!(!plan.can_submit_review(100));
        assert_eq!(plan.remaining_review_slots(99), 1);
        assert_eq!(plan.remaining_review_slots(150), 0);
    }
}
