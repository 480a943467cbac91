//! Review submission validation and the rating-based routing decision.
//!
//! Ratings 4 and 5 are routed to the business's Google review link when one
//! is configured; ratings 1 through 3 are always kept internal. The threshold
//! is a fixed policy, not a setting.

use serde::Serialize;
use std::collections::BTreeMap;
use validator::ValidateEmail;

use crate::models::SubmitReviewRequest;

/// Lowest rating that qualifies for an external redirect.
pub const HIGH_RATING_THRESHOLD: i64 = 4;

pub const REDIRECT_MESSAGE: &str =
    "Thank you for your positive review! You will be redirected to leave a review on Google.";
pub const POSITIVE_MESSAGE: &str = "Thank you for your positive review!";
pub const FEEDBACK_MESSAGE: &str =
    "Thank you for your feedback. We appreciate your input and will work to improve.";

// ============================================================================
// VALIDATION
// ============================================================================

/// Per-field validation errors, serialized as `{field: [messages]}`
#[derive(Debug, Default, Serialize)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }
}

/// A submission that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
    pub rating: i32,
    pub review_text: String,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}

/// Validates a review submission against the settings-configured text length
/// bounds. Returns the full per-field error set; nothing is persisted on
/// failure.
pub fn validate_submission(
    req: &SubmitReviewRequest,
    min_length: usize,
    max_length: usize,
) -> Result<ValidatedSubmission, FieldErrors> {
    let mut errors = FieldErrors::default();

    let rating = match req.rating {
        None => {
            errors.add("rating", "The rating field is required.");
            0
        }
        Some(r) if !(1..=5).contains(&r) => {
            errors.add("rating", "The rating must be between 1 and 5.");
            0
        }
        Some(r) => r as i32,
    };

    let review_text = req.review_text.as_deref().unwrap_or("").trim().to_string();
    if review_text.is_empty() {
        errors.add("review_text", "The review text field is required.");
    } else {
        let len = review_text.chars().count();
        if len < min_length {
            errors.add(
                "review_text",
                format!("The review text must be at least {} characters.", min_length),
            );
        } else if len > max_length {
            errors.add(
                "review_text",
                format!("The review text may not be greater than {} characters.", max_length),
            );
        }
    }

    let customer_name = normalize_optional(&req.customer_name);
    if let Some(name) = &customer_name {
        if name.chars().count() > 255 {
            errors.add("customer_name", "The customer name may not be greater than 255 characters.");
        }
    }

    let customer_email = normalize_optional(&req.customer_email);
    if let Some(email) = &customer_email {
        if email.chars().count() > 255 {
            errors.add("customer_email", "The customer email may not be greater than 255 characters.");
        } else if !email.validate_email() {
            errors.add("customer_email", "The customer email must be a valid email address.");
        }
    }

    let customer_phone = normalize_optional(&req.customer_phone);
    if let Some(phone) = &customer_phone {
        if phone.chars().count() > 20 {
            errors.add("customer_phone", "The customer phone may not be greater than 20 characters.");
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidatedSubmission {
        rating,
        review_text,
        customer_name,
        customer_email,
        customer_phone,
    })
}

fn normalize_optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

// ============================================================================
// ROUTING DECISION
// ============================================================================

/// Client-facing next action after a stored review
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    Redirect { url: String, delay: i64 },
    ThankYou { message: &'static str },
}

impl Directive {
    pub fn action(&self) -> &'static str {
        match self {
            Directive::Redirect { .. } => "redirect",
            Directive::ThankYou { .. } => "thank_you",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Directive::Redirect { .. } => REDIRECT_MESSAGE,
            Directive::ThankYou { message } => message,
        }
    }
}

/// The routing decision. `google_review_link` is the business's active Google
/// platform review link, when configured; low ratings never consult it.
pub fn decide_directive(rating: i32, google_review_link: Option<&str>, delay: i64) -> Directive {
    if i64::from(rating) >= HIGH_RATING_THRESHOLD {
        match google_review_link.map(str::trim).filter(|l| !l.is_empty()) {
            Some(link) => Directive::Redirect {
                url: link.to_string(),
                delay,
            },
            None => Directive::ThankYou {
                message: POSITIVE_MESSAGE,
            },
        }
    } else {
        Directive::ThankYou {
            message: FEEDBACK_MESSAGE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(rating: i64, text: &str) -> SubmitReviewRequest {
        SubmitReviewRequest {
            rating: Some(rating),
            review_text: Some(text.to_string()),
            customer_name: None,
            customer_email: None,
            customer_phone: None,
        }
    }

    #[test]
    fn low_ratings_never_redirect() {
        for rating in 1..=3 {
            let directive = decide_directive(rating, Some("https://g.page/acme/review"), 3);
            assert_eq!(directive.action(), "thank_you");
            assert_eq!(directive.message(), FEEDBACK_MESSAGE);
        }
    }

    #[test]
    fn high_ratings_redirect_to_configured_google_link() {
        for rating in 4..=5 {
            let directive = decide_directive(rating, Some("https://g.page/acme/review"), 3);
            assert_eq!(
                directive,
                Directive::Redirect {
                    url: "https://g.page/acme/review".to_string(),
                    delay: 3
                }
            );
            assert_eq!(directive.action(), "redirect");
        }
    }

    #[test]
    fn high_ratings_fall_back_without_a_link() {
        for link in [None, Some(""), Some("   ")] {
            let directive = decide_directive(5, link, 3);
            assert_eq!(directive.action(), "thank_you");
            assert_eq!(directive.message(), POSITIVE_MESSAGE);
        }
    }

    #[test]
    fn rejects_text_outside_configured_bounds() {
        let short = validate_submission(&request(5, "short"), 10, 500);
        assert!(short.unwrap_err().has("review_text"));

        let long_text = "x".repeat(501);
        let long = validate_submission(&request(5, &long_text), 10, 500);
        assert!(long.unwrap_err().has("review_text"));

        let at_min = validate_submission(&request(5, &"x".repeat(10)), 10, 500);
        assert!(at_min.is_ok());

        let at_max = validate_submission(&request(5, &"x".repeat(500)), 10, 500);
        assert!(at_max.is_ok());
    }

    #[test]
    fn rejects_missing_or_out_of_range_rating() {
        let mut req = request(5, "Great coffee and service!");
        req.rating = None;
        assert!(validate_submission(&req, 10, 500).unwrap_err().has("rating"));

        for bad in [0, 6, -1] {
            let req = request(bad, "Great coffee and service!");
            assert!(validate_submission(&req, 10, 500).unwrap_err().has("rating"));
        }
    }

    #[test]
    fn rejects_invalid_customer_email() {
        let mut req = request(4, "Great coffee and service!");
        req.customer_email = Some("not-an-email".to_string());
        assert!(validate_submission(&req, 10, 500)
            .unwrap_err()
            .has("customer_email"));
    }

    #[test]
    fn blank_optional_fields_are_dropped() {
        let mut req = request(4, "Great coffee and service!");
        req.customer_name = Some("   ".to_string());
        req.customer_email = Some(String::new());
        let validated = validate_submission(&req, 10, 500).unwrap();
        assert!(validated.customer_name.is_none());
        assert!(validated.customer_email.is_none());
    }

    #[test]
    fn collects_all_field_errors_at_once() {
        let req = SubmitReviewRequest {
            rating: Some(9),
            review_text: Some("hi".to_string()),
            customer_name: None,
            customer_email: Some("nope".to_string()),
            customer_phone: Some("123456789012345678901".to_string()),
        };
        let errors = validate_submission(&req, 10, 500).unwrap_err();
        assert!(errors.has("rating"));
        assert!(errors.has("review_text"));
        assert!(errors.has("customer_email"));
        assert!(errors.has("customer_phone"));
    }
}
