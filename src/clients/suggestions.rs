//! Chat-completion client used to generate candidate review text.
//!
//! The model output is free-form, so everything that comes back goes through
//! [`parse_suggestions`], which degrades from marker-prefixed lines to
//! paragraphs to a fixed set of templates.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::Business;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_API_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_SUGGESTION_COUNT: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum SuggestionError {
    #[error("suggestions API key not configured")]
    MissingApiKey,
    #[error("suggestion request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("suggestion API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Clone)]
pub struct SuggestionsClient {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
}

impl SuggestionsClient {
    pub fn new(api_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    /// Requests review suggestions for a business. High temperature on
    /// purpose: the same business should not get the same three suggestions
    /// every time.
    pub async fn generate_review_suggestions(
        &self,
        model: &str,
        business: &Business,
        rating: i32,
        keywords: &[String],
        count: usize,
    ) -> Result<Vec<String>, SuggestionError> {
        let api_key = self.api_key.as_deref().ok_or(SuggestionError::MissingApiKey)?;

        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: "You are a helpful assistant that generates authentic, unique, and \
                              positive review suggestions for businesses. Each review should be \
                              different in style, length, and focus. Never repeat the same review \
                              or use similar phrases."
                        .to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_review_prompt(business, rating, keywords, count),
                },
            ],
            max_tokens: 800,
            temperature: 0.9,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SuggestionError::Api { status, body });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let content = completion
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(parse_suggestions(&content, &business.business_name, count))
    }
}

fn build_review_prompt(
    business: &Business,
    rating: i32,
    keywords: &[String],
    count: usize,
) -> String {
    let mut prompt = format!(
        "Generate {} unique, authentic review suggestions for the following business:\n\n",
        count
    );
    prompt.push_str(&format!("Business Name: {}\n", business.business_name));
    prompt.push_str(&format!(
        "Business Type: {}\n",
        business.category.as_deref().unwrap_or("General business")
    ));
    prompt.push_str(&format!("Location: {}, {}\n", business.city, business.state));
    prompt.push_str(&format!(
        "Description: {}\n",
        business.description.as_deref().unwrap_or("General business")
    ));
    prompt.push_str(&format!("Rating: {} stars\n", rating));

    let keyword_text = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    if !keyword_text.is_empty() {
        prompt.push_str(&format!("Focus Keywords: {}\n", keyword_text));
    }

    prompt.push_str("\nRequirements:\n");
    prompt.push_str(&format!("- Generate exactly {} different review suggestions\n", count));
    prompt.push_str("- Each review should be 30-100 words long\n");
    prompt.push_str("- Make each review unique in style, tone, and focus\n");
    prompt.push_str("- Include specific details that customers might mention\n");
    prompt.push_str("- Use natural, conversational language\n");
    prompt.push_str("- Avoid repetitive phrases or similar structures\n");
    prompt.push_str("- Make reviews sound genuine and authentic\n");
    if !keyword_text.is_empty() {
        prompt.push_str("- Naturally incorporate the focus keywords where appropriate\n");
    }
    prompt.push_str("\nFormat each review on a separate line starting with 'Review:' followed by the review text.\n");

    prompt
}

/// Normalizes free-form model output into at most `count` suggestions.
///
/// Tries marker-prefixed lines (`Review:`, `1.`, `2)`) first, falls back to
/// blank-line-delimited paragraphs when fewer than two lines matched, and as
/// a last resort returns generic templates naming the business.
pub fn parse_suggestions(content: &str, business_name: &str, count: usize) -> Vec<String> {
    let mut suggestions = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if let Some(stripped) = strip_marker(line) {
            if stripped.chars().count() > 20 {
                suggestions.push(stripped.to_string());
            }
        } else if line.chars().count() > 30 && suggestions.len() < count {
            suggestions.push(line.to_string());
        }
    }

    if suggestions.len() < 2 {
        suggestions = content
            .split("\n\n")
            .map(str::trim)
            .filter(|p| p.chars().count() > 30)
            .map(str::to_string)
            .collect();
    }

    if suggestions.is_empty() {
        suggestions = fallback_suggestions(business_name);
    }

    suggestions.truncate(count);
    suggestions
}

/// Strips a `Review:` prefix or a `1.` / `1)` list marker; `None` when the
/// line carries neither.
fn strip_marker(line: &str) -> Option<&str> {
    if let Some(rest) = line
        .strip_prefix("Review:")
        .or_else(|| line.strip_prefix("review:"))
        .or_else(|| line.strip_prefix("REVIEW:"))
    {
        return Some(rest.trim());
    }

    let digits: usize = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return Some(rest.trim());
        }
    }
    None
}

fn fallback_suggestions(business_name: &str) -> Vec<String> {
    vec![
        format!(
            "Great experience at {}! The service was excellent and I would definitely recommend it to others.",
            business_name
        ),
        "Very satisfied with my visit. The staff was friendly and professional. Will be coming back soon!"
            .to_string(),
        format!(
            "Outstanding service and quality. {} exceeded my expectations in every way.",
            business_name
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_marker_prefixed_lines() {
        let content = "Review: The coffee here is consistently excellent and the staff remembers my order.\n\
                       Review: Cozy atmosphere, fast service, and fair prices. A neighborhood gem.\n\
                       Review: Best espresso in the area. The baristas really know their craft.";
        let suggestions = parse_suggestions(content, "Acme Cafe", 3);
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions[0].starts_with("The coffee here"));
        assert!(!suggestions.iter().any(|s| s.contains("Review:")));
    }

    #[test]
    fn parses_numbered_list_markers() {
        let content = "1. Wonderful spot with friendly staff and a relaxed vibe every single visit.\n\
                       2) Their pastries are baked fresh daily and it absolutely shows in the taste.";
        let suggestions = parse_suggestions(content, "Acme Cafe", 3);
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions[0].starts_with("Wonderful spot"));
        assert!(suggestions[1].starts_with("Their pastries"));
    }

    #[test]
    fn falls_back_to_paragraphs_when_markers_are_missing() {
        let content = "I had a genuinely lovely time here and the team went out of their way to help.\n\n\
                       Everything arrived quickly and exactly as ordered, which is rarer than it should be.";
        let suggestions = parse_suggestions(content, "Acme Cafe", 3);
        assert_eq!(suggestions.len(), 2);
        assert!(suggestions[0].starts_with("I had a genuinely"));
    }

    #[test]
    fn falls_back_to_templates_on_unusable_output() {
        let suggestions = parse_suggestions("ok", "Acme Cafe", 3);
        assert_eq!(suggestions.len(), 3);
        assert!(suggestions[0].contains("Acme Cafe"));
    }

    #[test]
    fn truncates_to_the_requested_count() {
        let content = "Review: A truly dependable place that I have recommended to many colleagues.\n\
                       Review: Excellent value and the quality never seems to dip between visits.\n\
                       Review: Staff are attentive without hovering, which I really appreciate.\n\
                       Review: The seasonal menu keeps things interesting month after month.";
        assert_eq!(parse_suggestions(content, "Acme Cafe", 2).len(), 2);
    }

    #[test]
    fn prompt_embeds_business_details_and_keywords() {
        let business = sample_business();
        let prompt = build_review_prompt(
            &business,
            5,
            &["coffee".to_string(), "service".to_string()],
            3,
        );
        assert!(prompt.contains("Business Name: Acme Cafe"));
        assert!(prompt.contains("Location: Springfield, IL"));
        assert!(prompt.contains("Rating: 5 stars"));
        assert!(prompt.contains("Focus Keywords: coffee, service"));
    }

    #[test]
    fn missing_key_is_a_configuration_error() {
        let client = SuggestionsClient::new(None, Some("   ".to_string()));
        assert!(client.api_key.is_none());
    }

    fn sample_business() -> Business {
        use chrono::Utc;
        use uuid::Uuid;
        let now = Utc::now();
        Business {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            slug: "acme-cafe-1700000000".to_string(),
            business_name: "Acme Cafe".to_string(),
            full_name: "Jordan Acme".to_string(),
            address: "1 Main St".to_string(),
            state: "IL".to_string(),
            city: "Springfield".to_string(),
            area: "Downtown".to_string(),
            pincode: "62701".to_string(),
            mobile_number: "5551234567".to_string(),
            telephone_number: None,
            email: "owner@acme.example".to_string(),
            website: None,
            description: Some("Neighborhood coffee shop".to_string()),
            category: Some("Cafe".to_string()),
            business_hours: None,
            latitude: None,
            longitude: None,
            is_active: true,
            total_scans: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
