use std::{borrow::Cow, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Connection, Executor, PgPool, Row,
};
use uuid::Uuid;

use crate::models::{
    AnalyticsSummary, Business, BusinessPlatform, BusinessPlatformView, CountByKey, DailyCount,
    LocationCount, NewAnalyticsEvent, NewBusiness, NewReview, NewSubscription, Plan, Review,
    ReviewPlatform, ReviewStats, Setting, SettingType, SubscriptionStatus, User, UserSubscription,
};
use crate::settings::SettingsStore;

const BUSINESS_COLUMNS: &str = r#"
    id,
    user_id,
    slug,
    business_name,
    full_name,
    address,
    state,
    city,
    area,
    pincode,
    mobile_number,
    telephone_number,
    email,
    website,
    description,
    category,
    business_hours,
    latitude,
    longitude,
    is_active,
    total_scans,
    created_at,
    updated_at
"#;

const REVIEW_COLUMNS: &str = r#"
    id,
    business_id,
    customer_name,
    customer_email,
    customer_phone,
    rating,
    review_text,
    ip_address,
    user_agent,
    device_type,
    browser,
    os,
    location,
    is_approved,
    is_featured,
    approved_at,
    approved_by,
    created_at,
    updated_at
"#;

const SUBSCRIPTION_COLUMNS: &str = r#"
    id,
    user_id,
    plan_id,
    subscription_id,
    status,
    amount,
    billing_cycle,
    starts_at,
    ends_at,
    next_billing_date,
    payment_method,
    payment_id,
    payment_details,
    cancelled_at,
    cancellation_reason,
    created_at,
    updated_at
"#;

const PLAN_COLUMNS: &str = r#"
    id,
    name,
    description,
    price,
    billing_cycle,
    business_limit,
    review_limit_per_month,
    analytics_retention_days,
    features,
    is_popular,
    is_active,
    sort_order,
    created_at,
    updated_at
"#;

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = match PgPoolOptions::new()
            .max_connections(10)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(600)))
            .test_before_acquire(true)
            .connect(database_url)
            .await
        {
            Ok(pool) => pool,
            Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("3D000")) => {
                log::info!("Database missing, attempting to create it");
                create_database_if_missing(database_url).await?;

                PgPoolOptions::new()
                    .max_connections(10)
                    .min_connections(2)
                    .acquire_timeout(Duration::from_secs(5))
                    .idle_timeout(Some(Duration::from_secs(600)))
                    .test_before_acquire(true)
                    .connect(database_url)
                    .await?
            }
            Err(err) => return Err(err),
        };

        // Run embedded migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    // ========================================================================
    // USERS
    // ========================================================================

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        let record = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, name, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Inserts the tenant row when it does not exist yet. Identity lives in an
    /// external provider; we only keep what foreign keys need.
    pub async fn ensure_user(
        &self,
        user_id: Uuid,
        email: &str,
        name: &str,
    ) -> Result<User, sqlx::Error> {
        let record = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET updated_at = NOW()
            RETURNING id, email, name, role, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(email)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    // ========================================================================
    // BUSINESSES
    // ========================================================================

    pub async fn create_business(&self, business: NewBusiness) -> Result<Business, sqlx::Error> {
        let NewBusiness {
            id,
            user_id,
            slug,
            business_name,
            full_name,
            address,
            state,
            city,
            area,
            pincode,
            mobile_number,
            telephone_number,
            email,
            website,
            description,
            category,
            business_hours,
            latitude,
            longitude,
            is_active,
            created_at,
            updated_at,
        } = business;

        let record = sqlx::query_as::<_, Business>(&format!(
            r#"
            INSERT INTO businesses (
                id,
                user_id,
                slug,
                business_name,
                full_name,
                address,
                state,
                city,
                area,
                pincode,
                mobile_number,
                telephone_number,
                email,
                website,
                description,
                category,
                business_hours,
                latitude,
                longitude,
                is_active,
                created_at,
                updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16, $17, $18, $19, $20,
                $21, $22
            )
            RETURNING {BUSINESS_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(slug)
        .bind(business_name)
        .bind(full_name)
        .bind(address)
        .bind(state)
        .bind(city)
        .bind(area)
        .bind(pincode)
        .bind(mobile_number)
        .bind(telephone_number)
        .bind(email)
        .bind(website)
        .bind(description)
        .bind(category)
        .bind(business_hours)
        .bind(latitude)
        .bind(longitude)
        .bind(is_active)
        .bind(created_at)
        .bind(updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_business_by_id(
        &self,
        business_id: Uuid,
    ) -> Result<Option<Business>, sqlx::Error> {
        let record = sqlx::query_as::<_, Business>(&format!(
            r#"
            SELECT {BUSINESS_COLUMNS}
            FROM businesses
            WHERE id = $1
            "#
        ))
        .bind(business_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Public review-page lookup: inactive businesses are invisible here.
    pub async fn get_active_business_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<Business>, sqlx::Error> {
        let record = sqlx::query_as::<_, Business>(&format!(
            r#"
            SELECT {BUSINESS_COLUMNS}
            FROM businesses
            WHERE slug = $1 AND is_active = TRUE
            "#
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn list_businesses_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Business>, sqlx::Error> {
        let records = sqlx::query_as::<_, Business>(&format!(
            r#"
            SELECT {BUSINESS_COLUMNS}
            FROM businesses
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn count_businesses_for_user(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM businesses WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    pub async fn update_business(&self, business: Business) -> Result<Business, sqlx::Error> {
        let record = sqlx::query_as::<_, Business>(&format!(
            r#"
            UPDATE businesses
            SET
                slug = $2,
                business_name = $3,
                full_name = $4,
                address = $5,
                state = $6,
                city = $7,
                area = $8,
                pincode = $9,
                mobile_number = $10,
                telephone_number = $11,
                email = $12,
                website = $13,
                description = $14,
                category = $15,
                business_hours = $16,
                latitude = $17,
                longitude = $18,
                is_active = $19,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {BUSINESS_COLUMNS}
            "#
        ))
        .bind(business.id)
        .bind(business.slug)
        .bind(business.business_name)
        .bind(business.full_name)
        .bind(business.address)
        .bind(business.state)
        .bind(business.city)
        .bind(business.area)
        .bind(business.pincode)
        .bind(business.mobile_number)
        .bind(business.telephone_number)
        .bind(business.email)
        .bind(business.website)
        .bind(business.description)
        .bind(business.category)
        .bind(business.business_hours)
        .bind(business.latitude)
        .bind(business.longitude)
        .bind(business.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn delete_business(&self, business_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM businesses WHERE id = $1"#)
            .bind(business_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    /// Atomic counter bump; scans race freely across workers.
    pub async fn increment_scan_count(&self, business_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE businesses
            SET total_scans = total_scans + 1, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(business_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ========================================================================
    // REVIEW PLATFORMS
    // ========================================================================

    pub async fn list_platforms(&self) -> Result<Vec<ReviewPlatform>, sqlx::Error> {
        let records = sqlx::query_as::<_, ReviewPlatform>(
            r#"
            SELECT id, name, icon, color, is_active, sort_order, created_at, updated_at
            FROM review_platforms
            WHERE is_active = TRUE
            ORDER BY sort_order ASC, name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn list_business_platforms(
        &self,
        business_id: Uuid,
    ) -> Result<Vec<BusinessPlatformView>, sqlx::Error> {
        let records = sqlx::query_as::<_, BusinessPlatformView>(
            r#"
            SELECT
                rp.id AS platform_id,
                rp.name,
                rp.color,
                rp.icon,
                bp.business_link,
                bp.review_link,
                bp.is_active
            FROM business_platforms bp
            INNER JOIN review_platforms rp ON rp.id = bp.platform_id
            WHERE bp.business_id = $1 AND rp.is_active = TRUE
            ORDER BY rp.sort_order ASC, rp.name ASC
            "#,
        )
        .bind(business_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_business_platform_by_name(
        &self,
        business_id: Uuid,
        platform_name: &str,
    ) -> Result<Option<BusinessPlatformView>, sqlx::Error> {
        let record = sqlx::query_as::<_, BusinessPlatformView>(
            r#"
            SELECT
                rp.id AS platform_id,
                rp.name,
                rp.color,
                rp.icon,
                bp.business_link,
                bp.review_link,
                bp.is_active
            FROM business_platforms bp
            INNER JOIN review_platforms rp ON rp.id = bp.platform_id
            WHERE bp.business_id = $1
              AND LOWER(rp.name) = LOWER($2)
              AND bp.is_active = TRUE
              AND rp.is_active = TRUE
            "#,
        )
        .bind(business_id)
        .bind(platform_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Review link used by the routing decision; empty strings count as
    /// unconfigured.
    pub async fn get_review_link(
        &self,
        business_id: Uuid,
        platform_name: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let link = self
            .get_business_platform_by_name(business_id, platform_name)
            .await?
            .and_then(|p| p.review_link)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty());

        Ok(link)
    }

    pub async fn upsert_business_platform(
        &self,
        business_id: Uuid,
        platform_id: Uuid,
        business_link: Option<String>,
        review_link: Option<String>,
        additional_data: Option<serde_json::Value>,
        is_active: bool,
    ) -> Result<BusinessPlatform, sqlx::Error> {
        let record = sqlx::query_as::<_, BusinessPlatform>(
            r#"
            INSERT INTO business_platforms (
                business_id,
                platform_id,
                business_link,
                review_link,
                additional_data,
                is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (business_id, platform_id) DO UPDATE
            SET
                business_link = EXCLUDED.business_link,
                review_link = EXCLUDED.review_link,
                additional_data = EXCLUDED.additional_data,
                is_active = EXCLUDED.is_active,
                updated_at = NOW()
            RETURNING
                id,
                business_id,
                platform_id,
                business_link,
                review_link,
                additional_data,
                is_active,
                created_at,
                updated_at
            "#,
        )
        .bind(business_id)
        .bind(platform_id)
        .bind(business_link)
        .bind(review_link)
        .bind(additional_data)
        .bind(is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    // ========================================================================
    // REVIEWS
    // ========================================================================

    pub async fn insert_review(&self, review: NewReview) -> Result<Review, sqlx::Error> {
        let NewReview {
            id,
            business_id,
            customer_name,
            customer_email,
            customer_phone,
            rating,
            review_text,
            ip_address,
            user_agent,
            device_type,
            browser,
            os,
            location,
            is_approved,
            created_at,
        } = review;

        let record = sqlx::query_as::<_, Review>(&format!(
            r#"
            INSERT INTO reviews (
                id,
                business_id,
                customer_name,
                customer_email,
                customer_phone,
                rating,
                review_text,
                ip_address,
                user_agent,
                device_type,
                browser,
                os,
                location,
                is_approved,
                created_at,
                updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $15
            )
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(business_id)
        .bind(customer_name)
        .bind(customer_email)
        .bind(customer_phone)
        .bind(rating)
        .bind(review_text)
        .bind(ip_address)
        .bind(user_agent)
        .bind(device_type)
        .bind(browser)
        .bind(os)
        .bind(location)
        .bind(is_approved)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_review(&self, review_id: Uuid) -> Result<Option<Review>, sqlx::Error> {
        let record = sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE id = $1
            "#
        ))
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn list_reviews_for_business(
        &self,
        business_id: Uuid,
        approved_only: bool,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Review>, sqlx::Error> {
        let records = sqlx::query_as::<_, Review>(&format!(
            r#"
            SELECT {REVIEW_COLUMNS}
            FROM reviews
            WHERE business_id = $1 AND (NOT $2 OR is_approved = TRUE)
            ORDER BY is_featured DESC, created_at DESC
            LIMIT $3 OFFSET $4
            "#
        ))
        .bind(business_id)
        .bind(approved_only)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn review_stats(&self, business_id: Uuid) -> Result<ReviewStats, sqlx::Error> {
        let record = sqlx::query(
            r#"
            SELECT
                COALESCE(AVG(rating), 0)::DOUBLE PRECISION AS average_rating,
                COUNT(*) AS total_reviews,
                COUNT(*) FILTER (WHERE rating = 1) AS stars_1,
                COUNT(*) FILTER (WHERE rating = 2) AS stars_2,
                COUNT(*) FILTER (WHERE rating = 3) AS stars_3,
                COUNT(*) FILTER (WHERE rating = 4) AS stars_4,
                COUNT(*) FILTER (WHERE rating = 5) AS stars_5
            FROM reviews
            WHERE business_id = $1 AND is_approved = TRUE
            "#,
        )
        .bind(business_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(ReviewStats {
            average_rating: record.try_get::<f64, _>("average_rating")?,
            total_reviews: record.try_get::<i64, _>("total_reviews")?,
            star_distribution: [
                record.try_get::<i64, _>("stars_1")?,
                record.try_get::<i64, _>("stars_2")?,
                record.try_get::<i64, _>("stars_3")?,
                record.try_get::<i64, _>("stars_4")?,
                record.try_get::<i64, _>("stars_5")?,
            ],
        })
    }

    pub async fn set_review_approval(
        &self,
        review_id: Uuid,
        approved: bool,
        approver_id: Option<Uuid>,
    ) -> Result<Review, sqlx::Error> {
        let record = sqlx::query_as::<_, Review>(&format!(
            r#"
            UPDATE reviews
            SET
                is_approved = $2,
                approved_at = CASE WHEN $2 THEN NOW() ELSE NULL END,
                approved_by = CASE WHEN $2 THEN $3 ELSE NULL END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review_id)
        .bind(approved)
        .bind(approver_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn toggle_review_featured(&self, review_id: Uuid) -> Result<Review, sqlx::Error> {
        let record = sqlx::query_as::<_, Review>(&format!(
            r#"
            UPDATE reviews
            SET is_featured = NOT is_featured, updated_at = NOW()
            WHERE id = $1
            RETURNING {REVIEW_COLUMNS}
            "#
        ))
        .bind(review_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn delete_review(&self, review_id: Uuid) -> Result<(), sqlx::Error> {
        let result = sqlx::query(r#"DELETE FROM reviews WHERE id = $1"#)
            .bind(review_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(sqlx::Error::RowNotFound);
        }

        Ok(())
    }

    /// Reviews received across all of a user's businesses in the current
    /// calendar month; compared against the plan's monthly quota.
    pub async fn monthly_review_count_for_user(&self, user_id: Uuid) -> Result<i64, sqlx::Error> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM reviews r
            INNER JOIN businesses b ON b.id = r.business_id
            WHERE b.user_id = $1 AND r.created_at >= DATE_TRUNC('month', NOW())
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // ========================================================================
    // ANALYTICS
    // ========================================================================

    pub async fn insert_event(&self, event: NewAnalyticsEvent) -> Result<(), sqlx::Error> {
        let NewAnalyticsEvent {
            id,
            business_id,
            event_type,
            ip_address,
            user_agent,
            device_type,
            browser,
            os,
            country,
            region,
            city,
            latitude,
            longitude,
            referrer,
            additional_data,
        } = event;

        sqlx::query(
            r#"
            INSERT INTO analytics_events (
                id,
                business_id,
                event_type,
                ip_address,
                user_agent,
                device_type,
                browser,
                os,
                country,
                region,
                city,
                latitude,
                longitude,
                referrer,
                additional_data
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15
            )
            "#,
        )
        .bind(id)
        .bind(business_id)
        .bind(event_type)
        .bind(ip_address)
        .bind(user_agent)
        .bind(device_type)
        .bind(browser)
        .bind(os)
        .bind(country)
        .bind(region)
        .bind(city)
        .bind(latitude)
        .bind(longitude)
        .bind(referrer)
        .bind(additional_data)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn analytics_summary(
        &self,
        business_id: Uuid,
        days: i64,
    ) -> Result<AnalyticsSummary, sqlx::Error> {
        let devices = self
            .grouped_counts(business_id, days, "COALESCE(device_type::TEXT, 'unknown')")
            .await?;
        let browsers = self
            .grouped_counts(business_id, days, "COALESCE(browser, 'unknown')")
            .await?;
        let operating_systems = self
            .grouped_counts(business_id, days, "COALESCE(os, 'unknown')")
            .await?;
        let events = self
            .grouped_counts(business_id, days, "event_type::TEXT")
            .await?;

        let locations = sqlx::query_as::<_, LocationCount>(
            r#"
            SELECT country, region, city, COUNT(*) AS count
            FROM analytics_events
            WHERE business_id = $1 AND created_at >= NOW() - ($2 * INTERVAL '1 day')
            GROUP BY country, region, city
            ORDER BY count DESC
            LIMIT 50
            "#,
        )
        .bind(business_id)
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        let daily = sqlx::query_as::<_, DailyCount>(
            r#"
            SELECT created_at::DATE AS day, event_type, COUNT(*) AS count
            FROM analytics_events
            WHERE business_id = $1 AND created_at >= NOW() - ($2 * INTERVAL '1 day')
            GROUP BY day, event_type
            ORDER BY day ASC, event_type ASC
            "#,
        )
        .bind(business_id)
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        Ok(AnalyticsSummary {
            devices,
            browsers,
            operating_systems,
            locations,
            events,
            daily,
        })
    }

    async fn grouped_counts(
        &self,
        business_id: Uuid,
        days: i64,
        key_expr: &str,
    ) -> Result<Vec<CountByKey>, sqlx::Error> {
        let records = sqlx::query_as::<_, CountByKey>(&format!(
            r#"
            SELECT {key_expr} AS key, COUNT(*) AS count
            FROM analytics_events
            WHERE business_id = $1 AND created_at >= NOW() - ($2 * INTERVAL '1 day')
            GROUP BY key
            ORDER BY count DESC
            "#
        ))
        .bind(business_id)
        .bind(days)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Retention sweep; returns the number of purged events.
    pub async fn purge_events_older_than(&self, days: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM analytics_events
            WHERE created_at < NOW() - ($1 * INTERVAL '1 day')
            "#,
        )
        .bind(days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    // ========================================================================
    // PLANS & SUBSCRIPTIONS
    // ========================================================================

    pub async fn list_plans(&self) -> Result<Vec<Plan>, sqlx::Error> {
        let records = sqlx::query_as::<_, Plan>(&format!(
            r#"
            SELECT {PLAN_COLUMNS}
            FROM plans
            WHERE is_active = TRUE
            ORDER BY sort_order ASC, price ASC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, sqlx::Error> {
        let record = sqlx::query_as::<_, Plan>(&format!(
            r#"
            SELECT {PLAN_COLUMNS}
            FROM plans
            WHERE id = $1
            "#
        ))
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn create_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<UserSubscription, sqlx::Error> {
        let NewSubscription {
            id,
            user_id,
            plan_id,
            subscription_id,
            status,
            amount,
            billing_cycle,
            starts_at,
            ends_at,
            next_billing_date,
            payment_method,
            payment_id,
            payment_details,
        } = subscription;

        let record = sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            INSERT INTO user_subscriptions (
                id,
                user_id,
                plan_id,
                subscription_id,
                status,
                amount,
                billing_cycle,
                starts_at,
                ends_at,
                next_billing_date,
                payment_method,
                payment_id,
                payment_details
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                $11, $12, $13
            )
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(plan_id)
        .bind(subscription_id)
        .bind(status)
        .bind(amount)
        .bind(billing_cycle)
        .bind(starts_at)
        .bind(ends_at)
        .bind(next_billing_date)
        .bind(payment_method)
        .bind(payment_id)
        .bind(payment_details)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_subscription(
        &self,
        subscription_id: Uuid,
    ) -> Result<Option<UserSubscription>, sqlx::Error> {
        let record = sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM user_subscriptions
            WHERE id = $1
            "#
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn get_active_subscription_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Option<UserSubscription>, sqlx::Error> {
        let record = sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM user_subscriptions
            WHERE user_id = $1 AND status = 'active' AND ends_at > NOW()
            ORDER BY ends_at DESC
            LIMIT 1
            "#
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    /// Guarded transition: only a pending subscription can be activated.
    /// The validity window restarts at the activation instant, so time spent
    /// pending never eats into the paid cycle.
    pub async fn activate_subscription(
        &self,
        subscription_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
        payment_id: Option<String>,
        payment_details: Option<serde_json::Value>,
    ) -> Result<UserSubscription, sqlx::Error> {
        let record = sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            UPDATE user_subscriptions
            SET
                status = 'active',
                starts_at = $2,
                ends_at = $3,
                next_billing_date = $3,
                payment_id = COALESCE($4, payment_id),
                payment_details = COALESCE($5, payment_details),
                cancelled_at = NULL,
                cancellation_reason = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .bind(starts_at)
        .bind(ends_at)
        .bind(payment_id)
        .bind(payment_details)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Guarded transition: only an active subscription can be cancelled.
    /// The validity window is left untouched; access runs out at `ends_at`.
    pub async fn cancel_subscription(
        &self,
        subscription_id: Uuid,
        reason: Option<String>,
    ) -> Result<UserSubscription, sqlx::Error> {
        let record = sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            UPDATE user_subscriptions
            SET
                status = 'cancelled',
                cancelled_at = NOW(),
                cancellation_reason = $2,
                next_billing_date = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status = 'active'
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .bind(reason)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    pub async fn renew_subscription(
        &self,
        subscription_id: Uuid,
        new_ends_at: DateTime<Utc>,
        next_billing_date: Option<DateTime<Utc>>,
    ) -> Result<UserSubscription, sqlx::Error> {
        let record = sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            UPDATE user_subscriptions
            SET
                status = 'active',
                ends_at = $2,
                next_billing_date = $3,
                cancelled_at = NULL,
                cancellation_reason = NULL,
                updated_at = NOW()
            WHERE id = $1 AND status IN ('active', 'expired')
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(subscription_id)
        .bind(new_ends_at)
        .bind(next_billing_date)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Marks overdue active subscriptions as expired; returns how many rows
    /// transitioned.
    pub async fn expire_overdue_subscriptions(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE user_subscriptions
            SET status = 'expired', updated_at = NOW()
            WHERE status = $1 AND ends_at < NOW()
            "#,
        )
        .bind(SubscriptionStatus::Active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

// ============================================================================
// SETTINGS STORE
// ============================================================================

#[async_trait]
impl SettingsStore for Database {
    async fn fetch_setting(&self, key: &str) -> Result<Option<Setting>, sqlx::Error> {
        let record = sqlx::query_as::<_, Setting>(
            r#"
            SELECT key, value, value_type, description, is_public, created_at, updated_at
            FROM settings
            WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn upsert_setting(
        &self,
        key: &str,
        value: Option<String>,
        value_type: SettingType,
        description: Option<String>,
        is_public: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, value_type, description, is_public)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (key) DO UPDATE
            SET
                value = EXCLUDED.value,
                value_type = EXCLUDED.value_type,
                description = COALESCE(EXCLUDED.description, settings.description),
                is_public = EXCLUDED.is_public,
                updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(value_type)
        .bind(description)
        .bind(is_public)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_public_settings(&self) -> Result<Vec<Setting>, sqlx::Error> {
        let records = sqlx::query_as::<_, Setting>(
            r#"
            SELECT key, value, value_type, description, is_public, created_at, updated_at
            FROM settings
            WHERE is_public = TRUE
            ORDER BY key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }
}

async fn create_database_if_missing(database_url: &str) -> Result<(), sqlx::Error> {
    let options: PgConnectOptions = database_url.parse()?;
    let database_name = options
        .get_database()
        .map(|name| name.to_string())
        .unwrap_or_else(|| "postgres".to_string());

    // If we're already targeting the default maintenance database, nothing to do.
    if database_name.eq_ignore_ascii_case("postgres") {
        return Ok(());
    }

    let maintenance_options = options.clone().database("postgres");

    let mut connection = sqlx::postgres::PgConnection::connect_with(&maintenance_options).await?;

    let escaped_name = database_name.replace('"', "\"");
    let create_stmt = format!("CREATE DATABASE \"{}\"", escaped_name);

    match connection.execute(create_stmt.as_str()).await {
        Ok(_) => {
            log::info!("Created database '{}'", database_name);
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.code() == Some(Cow::Borrowed("42P04")) => {
            log::info!("Database '{}' already exists", database_name);
            Ok(())
        }
        Err(err) => Err(err),
    }
}
