//! Visitor context extraction: client IP, user-agent classification and an
//! optional geolocation lookup.

use actix_web::HttpRequest;
use serde::Serialize;

use crate::models::DeviceType;

/// Everything we know about the visitor behind one request
#[derive(Debug, Clone, Serialize)]
pub struct VisitorContext {
    pub ip_address: String,
    pub user_agent: String,
    pub device_type: Option<DeviceType>,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub referrer: Option<String>,
    pub geo: Option<GeoLocation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeoLocation {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl VisitorContext {
    /// Builds the context from request metadata alone; never fails, unknown
    /// fields stay `None`.
    pub fn from_request(req: &HttpRequest) -> Self {
        let ip_address = client_ip(req);
        let user_agent = header_value(req, "User-Agent").unwrap_or_default();
        let referrer = header_value(req, "Referer");

        let device_type = parse_device_type(&user_agent);
        let browser = parse_browser(&user_agent);
        let os = parse_os(&user_agent);

        Self {
            ip_address,
            user_agent,
            device_type,
            browser,
            os,
            referrer,
            geo: lookup_geo(),
        }
    }
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First hop of X-Forwarded-For when present, else the peer address.
fn client_ip(req: &HttpRequest) -> String {
    if let Some(forwarded) = header_value(req, "X-Forwarded-For") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Geolocation is resolved out of band in this deployment; the hook stays so
/// call sites already carry the fields.
fn lookup_geo() -> Option<GeoLocation> {
    None
}

// ============================================================================
// USER-AGENT CLASSIFICATION
// ============================================================================

pub fn parse_device_type(user_agent: &str) -> Option<DeviceType> {
    if user_agent.trim().is_empty() {
        return None;
    }
    let ua = user_agent.to_lowercase();
    if ua.contains("ipad") || (ua.contains("tablet") && !ua.contains("mobile")) {
        Some(DeviceType::Tablet)
    } else if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        Some(DeviceType::Mobile)
    } else {
        Some(DeviceType::Desktop)
    }
}

pub fn parse_browser(user_agent: &str) -> Option<String> {
    let ua = user_agent.to_lowercase();
    // Order matters: Edge and Opera UAs also advertise Chrome and Safari.
    let browser = if ua.contains("edg/") || ua.contains("edge") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("chrome") || ua.contains("crios") {
        "Chrome"
    } else if ua.contains("firefox") || ua.contains("fxios") {
        "Firefox"
    } else if ua.contains("safari") {
        "Safari"
    } else if ua.trim().is_empty() {
        return None;
    } else {
        "Other"
    };
    Some(browser.to_string())
}

pub fn parse_os(user_agent: &str) -> Option<String> {
    let ua = user_agent.to_lowercase();
    let os = if ua.contains("android") {
        "Android"
    } else if ua.contains("iphone") || ua.contains("ipad") || ua.contains("ios") {
        "iOS"
    } else if ua.contains("windows") {
        "Windows"
    } else if ua.contains("mac os") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("linux") {
        "Linux"
    } else if ua.trim().is_empty() {
        return None;
    } else {
        "Other"
    };
    Some(os.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    const IPHONE_UA: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
    const DESKTOP_CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
        AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const IPAD_UA: &str = "Mozilla/5.0 (iPad; CPU OS 16_6 like Mac OS X) \
        AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.6 Mobile/15E148 Safari/604.1";

    #[test]
    fn classifies_common_user_agents() {
        assert_eq!(parse_device_type(IPHONE_UA), Some(DeviceType::Mobile));
        assert_eq!(parse_device_type(DESKTOP_CHROME_UA), Some(DeviceType::Desktop));
        assert_eq!(parse_device_type(IPAD_UA), Some(DeviceType::Tablet));

        assert_eq!(parse_browser(IPHONE_UA).as_deref(), Some("Safari"));
        assert_eq!(parse_browser(DESKTOP_CHROME_UA).as_deref(), Some("Chrome"));

        assert_eq!(parse_os(IPHONE_UA).as_deref(), Some("iOS"));
        assert_eq!(parse_os(DESKTOP_CHROME_UA).as_deref(), Some("Windows"));
    }

    #[test]
    fn empty_user_agent_stays_unknown() {
        assert_eq!(parse_device_type(""), None);
        assert_eq!(parse_browser(""), None);
        assert_eq!(parse_os(""), None);
    }

    #[test]
    fn edge_is_not_mistaken_for_chrome() {
        let ua = "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 \
            (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0";
        assert_eq!(parse_browser(ua).as_deref(), Some("Edge"));
    }

    #[test]
    fn forwarded_header_wins_over_peer_address() {
        let req = TestRequest::default()
            .insert_header(("X-Forwarded-For", "203.0.113.9, 10.0.0.1"))
            .insert_header(("User-Agent", DESKTOP_CHROME_UA))
            .to_http_request();
        let ctx = VisitorContext::from_request(&req);
        assert_eq!(ctx.ip_address, "203.0.113.9");
        assert_eq!(ctx.device_type, Some(DeviceType::Desktop));
    }

    #[test]
    fn missing_headers_produce_empty_context() {
        let req = TestRequest::default().to_http_request();
        let ctx = VisitorContext::from_request(&req);
        assert!(ctx.user_agent.is_empty());
        assert!(ctx.referrer.is_none());
        assert!(ctx.device_type.is_none());
        assert!(ctx.geo.is_none());
    }
}
