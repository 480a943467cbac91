use actix_web::{delete, get, post, put, web, Either, HttpRequest, HttpResponse, Responder};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::clients::suggestions::{SuggestionError, SuggestionsClient, DEFAULT_SUGGESTION_COUNT};
use crate::database::Database;
use crate::models::{
    AnalyticsEventType, ApiResponse, CancelSubscriptionRequest,
    CreateBusinessRequest, CreateSubscriptionRequest, NewSubscription, ReviewPagePayload,
    SubmitReviewRequest, SubmitReviewResponse, SubscriptionStatus, SubscriptionWithUsage,
    UpdateBusinessRequest, UpdateSettingRequest, UpsertPlatformsRequest, UsageStats, UserRole,
};
use crate::reviews::{decide_directive, validate_submission, Directive};
use crate::settings::SettingsService;
use crate::subscriptions::{
    activation_window, can_activate, can_cancel, can_renew, cycle_end, renewal_end,
};
use crate::tracking::{classify_page_view, track_event};
use crate::visitor::VisitorContext;

/// Base URL of the public review pages, used when building QR payloads.
#[derive(Clone)]
pub struct PublicBaseUrl(pub String);

fn extract_user_id(req: &HttpRequest) -> Result<Uuid, String> {
    req.headers()
        .get("X-User-Id")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| "Missing or invalid X-User-Id header".to_string())
}

/// The business must exist and belong to the caller, unless the caller is a
/// master admin.
async fn authorize_business(
    db: &Database,
    business_id: Uuid,
    user_id: Uuid,
) -> Result<crate::models::Business, HttpResponse> {
    let business = match db.get_business_by_id(business_id).await {
        Ok(Some(business)) => business,
        Ok(None) => {
            return Err(HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Business not found".into())))
        }
        Err(err) => {
            log::error!("Failed to fetch business: {err:?}");
            return Err(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch business".into())));
        }
    };

    if business.user_id == user_id {
        return Ok(business);
    }

    match db.get_user(user_id).await {
        Ok(Some(user)) if user.role == UserRole::MasterAdmin => Ok(business),
        Ok(_) => Err(HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("Not authorized for this business".into()))),
        Err(err) => {
            log::error!("Failed to fetch user: {err:?}");
            Err(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch user".into())))
        }
    }
}

async fn require_admin(db: &Database, user_id: Uuid) -> Result<(), HttpResponse> {
    match db.get_user(user_id).await {
        Ok(Some(user)) if user.role == UserRole::MasterAdmin => Ok(()),
        Ok(_) => Err(HttpResponse::Forbidden()
            .json(ApiResponse::<()>::error("Admin access required".into()))),
        Err(err) => {
            log::error!("Failed to fetch user: {err:?}");
            Err(HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch user".into())))
        }
    }
}

// ============================================================================
// HEALTH CHECK
// ============================================================================

#[get("/health")]
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": "review-saas-service",
        "timestamp": chrono::Utc::now()
    }))
}

// ============================================================================
// PUBLIC REVIEW PAGE
// ============================================================================

#[derive(Deserialize)]
pub struct PageQuery {
    pub source: Option<String>,
}

#[get("/businesses/{slug}")]
pub async fn get_review_page(
    db: web::Data<Database>,
    settings: web::Data<SettingsService>,
    slug: web::Path<String>,
    query: web::Query<PageQuery>,
    req: HttpRequest,
) -> impl Responder {
    let slug = slug.into_inner();
    let business = match db.get_active_business_by_slug(&slug).await {
        Ok(Some(business)) => business,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Business not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch business: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch business".into()));
        }
    };

    let platforms = match db.list_business_platforms(business.id).await {
        Ok(platforms) => platforms,
        Err(err) => {
            log::error!("Failed to fetch platforms: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to load review page".into()));
        }
    };

    let stats = match db.review_stats(business.id).await {
        Ok(stats) => stats,
        Err(err) => {
            log::error!("Failed to fetch review stats: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to load review page".into()));
        }
    };

    let recent_reviews = match db.list_reviews_for_business(business.id, true, 10, 0).await {
        Ok(reviews) => reviews,
        Err(err) => {
            log::error!("Failed to fetch reviews: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to load review page".into()));
        }
    };

    let public_settings = match settings.public_settings().await {
        Ok(settings) => settings,
        Err(err) => {
            log::error!("Failed to fetch public settings: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to load review page".into()));
        }
    };

    let visitor = VisitorContext::from_request(&req);
    let event_type = classify_page_view(query.source.as_deref());
    track_event(&db, business.id, event_type, &visitor, None).await;

    HttpResponse::Ok().json(ApiResponse::success(ReviewPagePayload {
        business,
        platforms,
        stats,
        recent_reviews,
        settings: public_settings,
    }))
}

#[get("/businesses/{slug}/qr")]
pub async fn get_qr_target(
    db: web::Data<Database>,
    base_url: web::Data<PublicBaseUrl>,
    slug: web::Path<String>,
) -> impl Responder {
    let slug = slug.into_inner();
    match db.get_active_business_by_slug(&slug).await {
        Ok(Some(business)) => {
            let url = format!("{}/{}?source=qr", base_url.0.trim_end_matches('/'), business.slug);
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({
                "slug": business.slug,
                "business_name": business.business_name,
                "url": url,
            })))
        }
        Ok(None) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Business not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch business: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch business".into()))
        }
    }
}

// ============================================================================
// REVIEW SUBMISSION
// ============================================================================

#[derive(Deserialize)]
pub struct PaginationQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Page size for public review listings: default 10, capped at 100.
fn public_review_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(10).clamp(1, 100)
}

#[get("/businesses/{slug}/reviews")]
pub async fn list_public_reviews(
    db: web::Data<Database>,
    slug: web::Path<String>,
    query: web::Query<PaginationQuery>,
) -> impl Responder {
    let slug = slug.into_inner();
    let business = match db.get_active_business_by_slug(&slug).await {
        Ok(Some(business)) => business,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Business not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch business: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch business".into()));
        }
    };

    let limit = public_review_limit(query.limit);
    let offset = query.offset.unwrap_or(0).max(0);

    match db
        .list_reviews_for_business(business.id, true, limit, offset)
        .await
    {
        Ok(reviews) => HttpResponse::Ok().json(ApiResponse::success(reviews)),
        Err(err) => {
            log::error!("Failed to list reviews: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to list reviews".into()))
        }
    }
}

#[post("/businesses/{slug}/reviews")]
pub async fn submit_review(
    db: web::Data<Database>,
    settings: web::Data<SettingsService>,
    slug: web::Path<String>,
    payload: Either<web::Json<SubmitReviewRequest>, web::Form<SubmitReviewRequest>>,
    req: HttpRequest,
) -> impl Responder {
    let slug = slug.into_inner();

    // Slug resolution happens before any validation of the body.
    let business = match db.get_active_business_by_slug(&slug).await {
        Ok(Some(business)) => business,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Business not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch business: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to submit review".into()));
        }
    };

    let (min_length, max_length) = match (
        settings.min_review_length().await,
        settings.max_review_length().await,
    ) {
        (Ok(min), Ok(max)) => (min, max),
        (Err(err), _) | (_, Err(err)) => {
            log::error!("Failed to load review length settings: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to submit review".into()));
        }
    };

    let validated = match validate_submission(&payload.into_inner(), min_length, max_length) {
        Ok(validated) => validated,
        Err(errors) => {
            return HttpResponse::UnprocessableEntity().json(serde_json::json!({
                "success": false,
                "errors": errors,
            }))
        }
    };

    let auto_approve = match settings.auto_approve_reviews().await {
        Ok(auto_approve) => auto_approve,
        Err(err) => {
            log::error!("Failed to load auto-approve setting: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to submit review".into()));
        }
    };

    let visitor = VisitorContext::from_request(&req);
    let new_review = crate::models::NewReview {
        id: Uuid::new_v4(),
        business_id: business.id,
        customer_name: validated.customer_name,
        customer_email: validated.customer_email,
        customer_phone: validated.customer_phone,
        rating: validated.rating,
        review_text: validated.review_text,
        ip_address: Some(visitor.ip_address.clone()),
        user_agent: Some(visitor.user_agent.clone()).filter(|ua| !ua.is_empty()),
        device_type: visitor
            .device_type
            .unwrap_or(crate::models::DeviceType::Unknown),
        browser: visitor.browser.clone(),
        os: visitor.os.clone(),
        location: None,
        is_approved: auto_approve,
        created_at: Utc::now(),
    };

    let review = match db.insert_review(new_review).await {
        Ok(review) => review,
        Err(err) => {
            log::error!("Failed to store review: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to submit review".into()));
        }
    };

    // Google is the only platform reviews are ever routed out to.
    let google_link = match db.get_review_link(business.id, "Google").await {
        Ok(link) => link,
        Err(err) => {
            log::warn!("Failed to resolve Google review link: {err:?}");
            None
        }
    };
    let delay = settings.redirect_delay().await.unwrap_or(3);
    let directive = decide_directive(review.rating, google_link.as_deref(), delay);

    track_event(
        &db,
        business.id,
        AnalyticsEventType::ReviewSubmit,
        &visitor,
        Some(serde_json::json!({
            "review_id": review.id,
            "rating": review.rating,
        })),
    )
    .await;

    let (redirect_url, redirect_delay) = match &directive {
        Directive::Redirect { url, delay } => (Some(url.clone()), Some(*delay)),
        Directive::ThankYou { .. } => (None, None),
    };

    HttpResponse::Created().json(SubmitReviewResponse {
        success: true,
        review_id: review.id,
        rating: review.rating,
        action: directive.action(),
        redirect_url,
        redirect_delay,
        message: directive.message().to_string(),
    })
}

// ============================================================================
// REVIEW SUGGESTIONS
// ============================================================================

fn suggestions_disabled_body() -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "message": "Review suggestions are not enabled",
    })
}

#[get("/businesses/{slug}/suggestions")]
pub async fn get_review_suggestions(
    db: web::Data<Database>,
    settings: web::Data<SettingsService>,
    client: web::Data<SuggestionsClient>,
    slug: web::Path<String>,
    query: web::Query<crate::models::SuggestionsQuery>,
) -> impl Responder {
    let slug = slug.into_inner();
    let business = match db.get_active_business_by_slug(&slug).await {
        Ok(Some(business)) => business,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Business not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch business: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch business".into()));
        }
    };

    match settings.suggestions_enabled().await {
        Ok(true) => {}
        Ok(false) => return HttpResponse::BadRequest().json(suggestions_disabled_body()),
        Err(err) => {
            log::error!("Failed to load suggestions setting: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Unable to generate review suggestions".into()));
        }
    }

    let rating = query.rating.unwrap_or(5).clamp(1, 5);
    let keywords: Vec<String> = query
        .keywords
        .as_deref()
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();

    let model = match settings.openai_model().await {
        Ok(model) => model,
        Err(err) => {
            log::error!("Failed to load model setting: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Unable to generate review suggestions".into()));
        }
    };

    match client
        .generate_review_suggestions(&model, &business, rating, &keywords, DEFAULT_SUGGESTION_COUNT)
        .await
    {
        Ok(suggestions) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "suggestions": suggestions,
        })),
        Err(SuggestionError::MissingApiKey) => {
            log::error!("Suggestions requested but no API key is configured");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Review suggestions are not configured".into()))
        }
        Err(err) => {
            log::error!("Suggestion generation failed: {err}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Unable to generate review suggestions".into()))
        }
    }
}

// ============================================================================
// PLATFORM REDIRECT
// ============================================================================

#[get("/businesses/{slug}/redirect/{platform}")]
pub async fn redirect_to_platform(
    db: web::Data<Database>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> impl Responder {
    let (slug, platform_name) = path.into_inner();
    let business = match db.get_active_business_by_slug(&slug).await {
        Ok(Some(business)) => business,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Business not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch business: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to resolve redirect".into()));
        }
    };

    let link = match db.get_review_link(business.id, &platform_name).await {
        Ok(Some(link)) => link,
        Ok(None) => {
            return HttpResponse::NotFound().json(ApiResponse::<()>::error(
                "No review link configured for this platform".into(),
            ))
        }
        Err(err) => {
            log::error!("Failed to resolve review link: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to resolve redirect".into()));
        }
    };

    let visitor = VisitorContext::from_request(&req);
    track_event(
        &db,
        business.id,
        AnalyticsEventType::Redirect,
        &visitor,
        Some(serde_json::json!({ "platform": platform_name })),
    )
    .await;

    HttpResponse::Found()
        .insert_header(("Location", link))
        .finish()
}

// ============================================================================
// SETTINGS
// ============================================================================

#[get("/settings/public")]
pub async fn get_public_settings(settings: web::Data<SettingsService>) -> impl Responder {
    match settings.public_settings().await {
        Ok(values) => HttpResponse::Ok().json(ApiResponse::success(values)),
        Err(err) => {
            log::error!("Failed to fetch public settings: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch settings".into()))
        }
    }
}

#[put("/admin/settings/{key}")]
pub async fn update_setting(
    db: web::Data<Database>,
    settings: web::Data<SettingsService>,
    key: web::Path<String>,
    payload: web::Json<UpdateSettingRequest>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    if let Err(response) = require_admin(&db, user_id).await {
        return response;
    }

    let key = key.into_inner();
    let body = payload.into_inner();
    match settings
        .set(&key, &body.value, body.value_type, body.description, body.is_public)
        .await
    {
        Ok(()) => HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "key": key }))),
        Err(err) => {
            log::error!("Failed to update setting {key}: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to update setting".into()))
        }
    }
}

// ============================================================================
// BUSINESS MANAGEMENT
// ============================================================================

#[post("/businesses")]
pub async fn create_business(
    db: web::Data<Database>,
    payload: web::Json<CreateBusinessRequest>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    let body = payload.into_inner();
    if let Err(e) = body.validate() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error(format!("Validation failed: {}", e)));
    }

    if let Err(err) = db.ensure_user(user_id, &body.email, &body.full_name).await {
        log::error!("Failed to ensure user record: {err:?}");
        return HttpResponse::InternalServerError()
            .json(ApiResponse::<()>::error("Failed to create business".into()));
    }

    // Plan quota check: the active subscription's plan bounds how many
    // businesses a tenant may hold. Without a subscription the tenant gets a
    // single business.
    let business_count = match db.count_businesses_for_user(user_id).await {
        Ok(count) => count,
        Err(err) => {
            log::error!("Failed to count businesses: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to create business".into()));
        }
    };
    let allowed = match db.get_active_subscription_for_user(user_id).await {
        Ok(Some(subscription)) => match db.get_plan(subscription.plan_id).await {
            Ok(Some(plan)) => plan.can_create_business(business_count),
            Ok(None) => false,
            Err(err) => {
                log::error!("Failed to fetch plan: {err:?}");
                return HttpResponse::InternalServerError()
                    .json(ApiResponse::<()>::error("Failed to create business".into()));
            }
        },
        Ok(None) => business_count < 1,
        Err(err) => {
            log::error!("Failed to fetch subscription: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to create business".into()));
        }
    };
    if !allowed {
        return HttpResponse::Forbidden().json(ApiResponse::<()>::error(
            "Business limit reached for the current plan".into(),
        ));
    }

    match db.create_business(body.into_new_business(user_id)).await {
        Ok(business) => HttpResponse::Created().json(ApiResponse::success(business)),
        Err(err) => {
            log::error!("Failed to create business: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to create business".into()))
        }
    }
}

#[get("/businesses")]
pub async fn list_my_businesses(db: web::Data<Database>, req: HttpRequest) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    match db.list_businesses_for_user(user_id).await {
        Ok(businesses) => HttpResponse::Ok().json(ApiResponse::success(businesses)),
        Err(err) => {
            log::error!("Failed to list businesses: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to list businesses".into()))
        }
    }
}

#[put("/businesses/{business_id}")]
pub async fn update_business(
    db: web::Data<Database>,
    business_id: web::Path<Uuid>,
    payload: web::Json<UpdateBusinessRequest>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    let body = payload.into_inner();
    if let Err(e) = body.validate() {
        return HttpResponse::BadRequest()
            .json(ApiResponse::<()>::error(format!("Validation failed: {}", e)));
    }

    let mut business = match authorize_business(&db, business_id.into_inner(), user_id).await {
        Ok(business) => business,
        Err(response) => return response,
    };

    body.apply_to_existing(&mut business);

    match db.update_business(business).await {
        Ok(business) => HttpResponse::Ok().json(ApiResponse::success(business)),
        Err(err) => {
            log::error!("Failed to update business: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to update business".into()))
        }
    }
}

#[delete("/businesses/{business_id}")]
pub async fn delete_business(
    db: web::Data<Database>,
    business_id: web::Path<Uuid>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    let business = match authorize_business(&db, business_id.into_inner(), user_id).await {
        Ok(business) => business,
        Err(response) => return response,
    };

    match db.delete_business(business.id).await {
        Ok(()) => HttpResponse::Ok()
            .json(ApiResponse::success(serde_json::json!({ "deleted": business.id }))),
        Err(sqlx::Error::RowNotFound) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Business not found".into()))
        }
        Err(err) => {
            log::error!("Failed to delete business: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to delete business".into()))
        }
    }
}

// ============================================================================
// PLATFORM LINKS
// ============================================================================

#[get("/platforms")]
pub async fn list_platforms(db: web::Data<Database>) -> impl Responder {
    match db.list_platforms().await {
        Ok(platforms) => HttpResponse::Ok().json(ApiResponse::success(platforms)),
        Err(err) => {
            log::error!("Failed to list platforms: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to list platforms".into()))
        }
    }
}

#[post("/businesses/{business_id}/platforms")]
pub async fn upsert_business_platforms(
    db: web::Data<Database>,
    business_id: web::Path<Uuid>,
    payload: web::Json<UpsertPlatformsRequest>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    let business = match authorize_business(&db, business_id.into_inner(), user_id).await {
        Ok(business) => business,
        Err(response) => return response,
    };

    let mut stored = Vec::new();
    for link in payload.into_inner().platforms {
        match db
            .upsert_business_platform(
                business.id,
                link.platform_id,
                link.business_link,
                link.review_link,
                link.additional_data,
                link.is_active,
            )
            .await
        {
            Ok(record) => stored.push(record),
            Err(err) => {
                log::error!("Failed to upsert platform link: {err:?}");
                return HttpResponse::InternalServerError()
                    .json(ApiResponse::<()>::error("Failed to save platform links".into()));
            }
        }
    }

    HttpResponse::Ok().json(ApiResponse::success(stored))
}

// ============================================================================
// REVIEW MODERATION
// ============================================================================

#[get("/admin/businesses/{business_id}/reviews")]
pub async fn list_all_reviews(
    db: web::Data<Database>,
    business_id: web::Path<Uuid>,
    query: web::Query<PaginationQuery>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    let business = match authorize_business(&db, business_id.into_inner(), user_id).await {
        Ok(business) => business,
        Err(response) => return response,
    };

    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let offset = query.offset.unwrap_or(0).max(0);

    match db
        .list_reviews_for_business(business.id, false, limit, offset)
        .await
    {
        Ok(reviews) => HttpResponse::Ok().json(ApiResponse::success(reviews)),
        Err(err) => {
            log::error!("Failed to list reviews: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to list reviews".into()))
        }
    }
}

async fn moderate_review(
    db: &Database,
    review_id: Uuid,
    user_id: Uuid,
    approved: bool,
) -> HttpResponse {
    let review = match db.get_review(review_id).await {
        Ok(Some(review)) => review,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Review not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch review: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to moderate review".into()));
        }
    };

    if let Err(response) = authorize_business(db, review.business_id, user_id).await {
        return response;
    }

    match db
        .set_review_approval(review_id, approved, approved.then_some(user_id))
        .await
    {
        Ok(review) => HttpResponse::Ok().json(ApiResponse::success(review)),
        Err(err) => {
            log::error!("Failed to update review approval: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to moderate review".into()))
        }
    }
}

#[post("/admin/reviews/{review_id}/approve")]
pub async fn approve_review(
    db: web::Data<Database>,
    review_id: web::Path<Uuid>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    moderate_review(&db, review_id.into_inner(), user_id, true).await
}

#[post("/admin/reviews/{review_id}/disapprove")]
pub async fn disapprove_review(
    db: web::Data<Database>,
    review_id: web::Path<Uuid>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    moderate_review(&db, review_id.into_inner(), user_id, false).await
}

#[post("/admin/reviews/{review_id}/toggle-featured")]
pub async fn toggle_featured_review(
    db: web::Data<Database>,
    review_id: web::Path<Uuid>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    let review_id = review_id.into_inner();

    let review = match db.get_review(review_id).await {
        Ok(Some(review)) => review,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Review not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch review: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to update review".into()));
        }
    };
    if let Err(response) = authorize_business(&db, review.business_id, user_id).await {
        return response;
    }

    match db.toggle_review_featured(review_id).await {
        Ok(review) => HttpResponse::Ok().json(ApiResponse::success(review)),
        Err(err) => {
            log::error!("Failed to toggle featured flag: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to update review".into()))
        }
    }
}

#[delete("/admin/reviews/{review_id}")]
pub async fn delete_review(
    db: web::Data<Database>,
    review_id: web::Path<Uuid>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    let review_id = review_id.into_inner();

    let review = match db.get_review(review_id).await {
        Ok(Some(review)) => review,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Review not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch review: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to delete review".into()));
        }
    };
    if let Err(response) = authorize_business(&db, review.business_id, user_id).await {
        return response;
    }

    match db.delete_review(review_id).await {
        Ok(()) => HttpResponse::Ok()
            .json(ApiResponse::success(serde_json::json!({ "deleted": review_id }))),
        Err(sqlx::Error::RowNotFound) => {
            HttpResponse::NotFound().json(ApiResponse::<()>::error("Review not found".into()))
        }
        Err(err) => {
            log::error!("Failed to delete review: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to delete review".into()))
        }
    }
}

// ============================================================================
// ANALYTICS
// ============================================================================

#[derive(Deserialize)]
pub struct AnalyticsQuery {
    pub days: Option<i64>,
}

#[get("/businesses/{business_id}/analytics")]
pub async fn get_business_analytics(
    db: web::Data<Database>,
    business_id: web::Path<Uuid>,
    query: web::Query<AnalyticsQuery>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    let business = match authorize_business(&db, business_id.into_inner(), user_id).await {
        Ok(business) => business,
        Err(response) => return response,
    };

    let days = query.days.unwrap_or(30).clamp(1, 365);
    match db.analytics_summary(business.id, days).await {
        Ok(summary) => HttpResponse::Ok().json(ApiResponse::success(summary)),
        Err(err) => {
            log::error!("Failed to build analytics summary: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to load analytics".into()))
        }
    }
}

// ============================================================================
// PLANS & SUBSCRIPTIONS
// ============================================================================

#[get("/plans")]
pub async fn list_plans(db: web::Data<Database>) -> impl Responder {
    match db.list_plans().await {
        Ok(plans) => HttpResponse::Ok().json(ApiResponse::success(plans)),
        Err(err) => {
            log::error!("Failed to list plans: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to list plans".into()))
        }
    }
}

#[get("/subscription")]
pub async fn get_current_subscription(db: web::Data<Database>, req: HttpRequest) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    let subscription = match db.get_active_subscription_for_user(user_id).await {
        Ok(Some(subscription)) => subscription,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("No active subscription".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch subscription: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch subscription".into()));
        }
    };

    let plan = match db.get_plan(subscription.plan_id).await {
        Ok(Some(plan)) => plan,
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Plan not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch plan: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch subscription".into()));
        }
    };

    let (business_count, monthly_review_count) = match (
        db.count_businesses_for_user(user_id).await,
        db.monthly_review_count_for_user(user_id).await,
    ) {
        (Ok(businesses), Ok(reviews)) => (businesses, reviews),
        (Err(err), _) | (_, Err(err)) => {
            log::error!("Failed to compute usage: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to fetch subscription".into()));
        }
    };

    let usage = UsageStats {
        business_count,
        monthly_review_count,
        business_limit: plan.business_limit,
        review_limit_per_month: plan.review_limit_per_month,
        can_create_business: plan.can_create_business(business_count),
        can_submit_review: plan.can_submit_review(monthly_review_count),
        remaining_business_slots: plan.remaining_business_slots(business_count),
        remaining_review_slots: plan.remaining_review_slots(monthly_review_count),
    };

    HttpResponse::Ok().json(ApiResponse::success(SubscriptionWithUsage {
        subscription,
        plan,
        usage,
    }))
}

#[post("/subscriptions")]
pub async fn create_subscription(
    db: web::Data<Database>,
    payload: web::Json<CreateSubscriptionRequest>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };

    let body = payload.into_inner();
    let plan = match db.get_plan(body.plan_id).await {
        Ok(Some(plan)) if plan.is_active => plan,
        Ok(_) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Plan not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch plan: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to create subscription".into()));
        }
    };

    let now = Utc::now();
    let ends_at = cycle_end(now, plan.billing_cycle);
    // Free plans need no payment round-trip and start active straight away.
    let status = if plan.price == 0.0 {
        SubscriptionStatus::Active
    } else {
        SubscriptionStatus::Pending
    };

    let new_subscription = NewSubscription {
        id: Uuid::new_v4(),
        user_id,
        plan_id: plan.id,
        subscription_id: format!("sub_{}", Uuid::new_v4().simple()),
        status,
        amount: plan.price,
        billing_cycle: plan.billing_cycle,
        starts_at: now,
        ends_at,
        next_billing_date: Some(ends_at),
        payment_method: body.payment_method,
        payment_id: body.payment_id,
        payment_details: body.payment_details,
    };

    match db.create_subscription(new_subscription).await {
        Ok(subscription) => HttpResponse::Created().json(ApiResponse::success(subscription)),
        Err(err) => {
            log::error!("Failed to create subscription: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to create subscription".into()))
        }
    }
}

#[derive(Deserialize)]
pub struct ActivateSubscriptionRequest {
    pub payment_id: Option<String>,
    pub payment_details: Option<serde_json::Value>,
}

#[post("/subscriptions/{subscription_id}/activate")]
pub async fn activate_subscription(
    db: web::Data<Database>,
    subscription_id: web::Path<Uuid>,
    payload: web::Json<ActivateSubscriptionRequest>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    let subscription_id = subscription_id.into_inner();

    let subscription = match db.get_subscription(subscription_id).await {
        Ok(Some(subscription)) if subscription.user_id == user_id => subscription,
        Ok(Some(_)) => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("Not your subscription".into()))
        }
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Subscription not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch subscription: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to activate subscription".into()));
        }
    };

    if !can_activate(subscription.status) {
        return HttpResponse::Conflict().json(ApiResponse::<()>::error(
            "Only a pending subscription can be activated".into(),
        ));
    }

    // Payment confirmation restarts the validity window; the cycle starts
    // now, not at checkout time.
    let (starts_at, ends_at) = activation_window(Utc::now(), subscription.billing_cycle);

    let body = payload.into_inner();
    match db
        .activate_subscription(
            subscription_id,
            starts_at,
            ends_at,
            body.payment_id,
            body.payment_details,
        )
        .await
    {
        Ok(subscription) => HttpResponse::Ok().json(ApiResponse::success(subscription)),
        Err(sqlx::Error::RowNotFound) => HttpResponse::Conflict().json(ApiResponse::<()>::error(
            "Only a pending subscription can be activated".into(),
        )),
        Err(err) => {
            log::error!("Failed to activate subscription: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to activate subscription".into()))
        }
    }
}

#[post("/subscriptions/{subscription_id}/cancel")]
pub async fn cancel_subscription(
    db: web::Data<Database>,
    subscription_id: web::Path<Uuid>,
    payload: web::Json<CancelSubscriptionRequest>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    let subscription_id = subscription_id.into_inner();

    let subscription = match db.get_subscription(subscription_id).await {
        Ok(Some(subscription)) if subscription.user_id == user_id => subscription,
        Ok(Some(_)) => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("Not your subscription".into()))
        }
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Subscription not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch subscription: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to cancel subscription".into()));
        }
    };

    if !can_cancel(subscription.status) {
        return HttpResponse::Conflict().json(ApiResponse::<()>::error(
            "Only an active subscription can be cancelled".into(),
        ));
    }

    match db
        .cancel_subscription(subscription_id, payload.into_inner().reason)
        .await
    {
        Ok(subscription) => HttpResponse::Ok().json(ApiResponse::success(subscription)),
        Err(sqlx::Error::RowNotFound) => HttpResponse::Conflict().json(ApiResponse::<()>::error(
            "Only an active subscription can be cancelled".into(),
        )),
        Err(err) => {
            log::error!("Failed to cancel subscription: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to cancel subscription".into()))
        }
    }
}

#[post("/subscriptions/{subscription_id}/renew")]
pub async fn renew_subscription(
    db: web::Data<Database>,
    subscription_id: web::Path<Uuid>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    let subscription_id = subscription_id.into_inner();

    let subscription = match db.get_subscription(subscription_id).await {
        Ok(Some(subscription)) if subscription.user_id == user_id => subscription,
        Ok(Some(_)) => {
            return HttpResponse::Forbidden()
                .json(ApiResponse::<()>::error("Not your subscription".into()))
        }
        Ok(None) => {
            return HttpResponse::NotFound()
                .json(ApiResponse::<()>::error("Subscription not found".into()))
        }
        Err(err) => {
            log::error!("Failed to fetch subscription: {err:?}");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to renew subscription".into()));
        }
    };

    if !can_renew(subscription.status) {
        return HttpResponse::Conflict().json(ApiResponse::<()>::error(
            "Only an active or expired subscription can be renewed".into(),
        ));
    }

    // Renewal extends from the later of now and the current window end, so
    // renewing early never loses paid-for time.
    let new_ends_at = renewal_end(subscription.ends_at, Utc::now(), subscription.billing_cycle);

    match db
        .renew_subscription(subscription_id, new_ends_at, Some(new_ends_at))
        .await
    {
        Ok(subscription) => HttpResponse::Ok().json(ApiResponse::success(subscription)),
        Err(sqlx::Error::RowNotFound) => HttpResponse::Conflict().json(ApiResponse::<()>::error(
            "Only an active or expired subscription can be renewed".into(),
        )),
        Err(err) => {
            log::error!("Failed to renew subscription: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Failed to renew subscription".into()))
        }
    }
}

// ============================================================================
// MAINTENANCE
// ============================================================================

#[post("/admin/subscriptions/sweep")]
pub async fn sweep_subscriptions(db: web::Data<Database>, req: HttpRequest) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    if let Err(response) = require_admin(&db, user_id).await {
        return response;
    }

    match db.expire_overdue_subscriptions().await {
        Ok(expired) => {
            log::info!("Subscription sweep expired {expired} subscriptions");
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "expired": expired })))
        }
        Err(err) => {
            log::error!("Subscription sweep failed: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Subscription sweep failed".into()))
        }
    }
}

#[derive(Deserialize)]
pub struct PurgeQuery {
    pub days: Option<i64>,
}

/// Retention window for the analytics purge: default 90 days, minimum 1.
fn purge_retention_days(requested: Option<i64>) -> i64 {
    requested.unwrap_or(90).max(1)
}

#[post("/admin/analytics/purge")]
pub async fn purge_analytics(
    db: web::Data<Database>,
    query: web::Query<PurgeQuery>,
    req: HttpRequest,
) -> impl Responder {
    let user_id = match extract_user_id(&req) {
        Ok(user_id) => user_id,
        Err(e) => return HttpResponse::BadRequest().json(ApiResponse::<()>::error(e)),
    };
    if let Err(response) = require_admin(&db, user_id).await {
        return response;
    }

    let days = purge_retention_days(query.days);
    match db.purge_events_older_than(days).await {
        Ok(purged) => {
            log::info!("Purged {purged} analytics events older than {days} days");
            HttpResponse::Ok().json(ApiResponse::success(serde_json::json!({ "purged": purged })))
        }
        Err(err) => {
            log::error!("Analytics purge failed: {err:?}");
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("Analytics purge failed".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use actix_web::FromRequest;

    #[test]
    fn public_review_listing_defaults_to_ten() {
        assert_eq!(public_review_limit(None), 10);
        assert_eq!(public_review_limit(Some(50)), 50);
        assert_eq!(public_review_limit(Some(0)), 1);
        assert_eq!(public_review_limit(Some(500)), 100);
    }

    #[test]
    fn analytics_purge_defaults_to_ninety_days() {
        assert_eq!(purge_retention_days(None), 90);
        assert_eq!(purge_retention_days(Some(30)), 30);
        assert_eq!(purge_retention_days(Some(0)), 1);
    }

    #[test]
    fn disabled_suggestions_reply_carries_a_message() {
        let body = suggestions_disabled_body();
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
        assert!(body.get("error").is_none());
    }

    #[actix_rt::test]
    async fn review_submission_accepts_form_encoded_bodies() {
        let (req, mut payload) = TestRequest::post()
            .insert_header(("content-type", "application/x-www-form-urlencoded"))
            .set_payload("rating=5&review_text=Great+food+and+friendly+staff&customer_name=Asha")
            .to_http_parts();

        let body = Either::<web::Json<SubmitReviewRequest>, web::Form<SubmitReviewRequest>>::from_request(
            &req,
            &mut payload,
        )
        .await
        .unwrap()
        .into_inner();

        assert_eq!(body.rating, Some(5));
        assert_eq!(body.review_text.as_deref(), Some("Great food and friendly staff"));
        assert_eq!(body.customer_name.as_deref(), Some("Asha"));
        assert!(body.customer_email.is_none());
    }

    #[actix_rt::test]
    async fn review_submission_still_accepts_json_bodies() {
        let (req, mut payload) = TestRequest::post()
            .insert_header(("content-type", "application/json"))
            .set_payload(r#"{"rating":4,"review_text":"Quick service and a clean room"}"#)
            .to_http_parts();

        let body = Either::<web::Json<SubmitReviewRequest>, web::Form<SubmitReviewRequest>>::from_request(
            &req,
            &mut payload,
        )
        .await
        .unwrap()
        .into_inner();

        assert_eq!(body.rating, Some(4));
        assert_eq!(body.review_text.as_deref(), Some("Quick service and a clean room"));
    }
}
