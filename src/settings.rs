//! Key/value application settings with typed decoding and an in-process cache.
//!
//! Settings are stored as strings alongside a declared `SettingType` and
//! decoded on read. Reads go through a one-hour cache; writes invalidate the
//! written key and the public-settings snapshot so the next read is fresh.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::models::{Setting, SettingType};

const CACHE_TTL: Duration = Duration::from_secs(3600);

// ============================================================================
// STORE ABSTRACTION
// ============================================================================

/// Persistence backend for settings; the service owns caching and decoding.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn fetch_setting(&self, key: &str) -> Result<Option<Setting>, sqlx::Error>;

    async fn upsert_setting(
        &self,
        key: &str,
        value: Option<String>,
        value_type: SettingType,
        description: Option<String>,
        is_public: bool,
    ) -> Result<(), sqlx::Error>;

    async fn fetch_public_settings(&self) -> Result<Vec<Setting>, sqlx::Error>;
}

// ============================================================================
// TYPED DECODE / ENCODE
// ============================================================================

/// Decodes a raw stored value according to its declared type. Values that do
/// not parse as their declared type fall back to the raw string so a bad row
/// never turns into a panic.
pub fn decode_value(raw: &str, value_type: SettingType) -> Value {
    match value_type {
        SettingType::String => Value::String(raw.to_string()),
        SettingType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        SettingType::Decimal => raw
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        SettingType::Boolean => {
            let truthy = matches!(raw.trim(), "1" | "true" | "on" | "yes");
            Value::Bool(truthy)
        }
        SettingType::Json => {
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
        }
    }
}

/// Encodes a JSON value into the stored string form for its declared type.
pub fn encode_value(value: &Value, value_type: SettingType) -> Option<String> {
    if value.is_null() {
        return None;
    }
    match value_type {
        SettingType::Boolean => {
            let truthy = match value {
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_i64() == Some(1),
                Value::String(s) => matches!(s.trim(), "1" | "true" | "on" | "yes"),
                _ => false,
            };
            Some(if truthy { "1" } else { "0" }.to_string())
        }
        SettingType::Json => Some(value.to_string()),
        _ => Some(match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }),
    }
}

// ============================================================================
// CACHED SERVICE
// ============================================================================

struct CachedValue {
    value: Value,
    cached_at: Instant,
}

struct CachedPublic {
    settings: BTreeMap<String, Value>,
    cached_at: Instant,
}

/// Settings facade shared across handlers. Cheap to clone.
#[derive(Clone)]
pub struct SettingsService {
    store: Arc<dyn SettingsStore>,
    cache: Arc<RwLock<HashMap<String, CachedValue>>>,
    public_cache: Arc<RwLock<Option<CachedPublic>>>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            cache: Arc::new(RwLock::new(HashMap::new())),
            public_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Returns the decoded value for `key`, or `Value::Null` when the key does
    /// not exist. Hits the store only when the cache entry is missing or older
    /// than the TTL.
    pub async fn get(&self, key: &str) -> Result<Value, sqlx::Error> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = cache.get(key) {
                if entry.cached_at.elapsed() < CACHE_TTL {
                    return Ok(entry.value.clone());
                }
            }
        }

        let value = match self.store.fetch_setting(key).await? {
            Some(setting) => setting
                .value
                .as_deref()
                .map(|raw| decode_value(raw, setting.value_type))
                .unwrap_or(Value::Null),
            None => Value::Null,
        };

        let mut cache = self.cache.write().await;
        cache.insert(
            key.to_string(),
            CachedValue {
                value: value.clone(),
                cached_at: Instant::now(),
            },
        );
        Ok(value)
    }

    pub async fn get_int(&self, key: &str, default: i64) -> Result<i64, sqlx::Error> {
        Ok(self.get(key).await?.as_i64().unwrap_or(default))
    }

    pub async fn get_bool(&self, key: &str, default: bool) -> Result<bool, sqlx::Error> {
        Ok(self.get(key).await?.as_bool().unwrap_or(default))
    }

    pub async fn get_str(&self, key: &str, default: &str) -> Result<String, sqlx::Error> {
        Ok(self
            .get(key)
            .await?
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| default.to_string()))
    }

    /// Upserts a setting and invalidates the cached key plus the cached
    /// public-settings snapshot, so reads after a write see the new value.
    pub async fn set(
        &self,
        key: &str,
        value: &Value,
        value_type: SettingType,
        description: Option<String>,
        is_public: bool,
    ) -> Result<(), sqlx::Error> {
        let encoded = encode_value(value, value_type);
        self.store
            .upsert_setting(key, encoded, value_type, description, is_public)
            .await?;

        self.cache.write().await.remove(key);
        *self.public_cache.write().await = None;
        Ok(())
    }

    /// Decoded map of every public setting, cached as one snapshot.
    pub async fn public_settings(&self) -> Result<BTreeMap<String, Value>, sqlx::Error> {
        {
            let cache = self.public_cache.read().await;
            if let Some(entry) = cache.as_ref() {
                if entry.cached_at.elapsed() < CACHE_TTL {
                    return Ok(entry.settings.clone());
                }
            }
        }

        let mut settings = BTreeMap::new();
        for setting in self.store.fetch_public_settings().await? {
            let value = setting
                .value
                .as_deref()
                .map(|raw| decode_value(raw, setting.value_type))
                .unwrap_or(Value::Null);
            settings.insert(setting.key, value);
        }

        *self.public_cache.write().await = Some(CachedPublic {
            settings: settings.clone(),
            cached_at: Instant::now(),
        });
        Ok(settings)
    }

    // Well-known keys with their shipped defaults.

    pub async fn min_review_length(&self) -> Result<usize, sqlx::Error> {
        Ok(self.get_int("min_review_length", 10).await?.max(0) as usize)
    }

    pub async fn max_review_length(&self) -> Result<usize, sqlx::Error> {
        Ok(self.get_int("max_review_length", 500).await?.max(0) as usize)
    }

    pub async fn auto_approve_reviews(&self) -> Result<bool, sqlx::Error> {
        self.get_bool("auto_approve_reviews", false).await
    }

    pub async fn redirect_delay(&self) -> Result<i64, sqlx::Error> {
        self.get_int("redirect_delay", 3).await
    }

    pub async fn suggestions_enabled(&self) -> Result<bool, sqlx::Error> {
        self.get_bool("review_suggestions_enabled", false).await
    }

    pub async fn openai_model(&self) -> Result<String, sqlx::Error> {
        self.get_str("openai_model", "gpt-3.5-turbo").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    struct InMemoryStore {
        rows: Mutex<HashMap<String, Setting>>,
        fetch_count: Mutex<usize>,
    }

    impl InMemoryStore {
        fn new() -> Self {
            Self {
                rows: Mutex::new(HashMap::new()),
                fetch_count: Mutex::new(0),
            }
        }

        fn seed(&self, key: &str, value: &str, value_type: SettingType, is_public: bool) {
            let now = Utc::now();
            self.rows.lock().unwrap().insert(
                key.to_string(),
                Setting {
                    key: key.to_string(),
                    value: Some(value.to_string()),
                    value_type,
                    description: None,
                    is_public,
                    created_at: now,
                    updated_at: now,
                },
            );
        }

        fn fetches(&self) -> usize {
            *self.fetch_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl SettingsStore for InMemoryStore {
        async fn fetch_setting(&self, key: &str) -> Result<Option<Setting>, sqlx::Error> {
            *self.fetch_count.lock().unwrap() += 1;
            Ok(self.rows.lock().unwrap().get(key).cloned())
        }

        async fn upsert_setting(
            &self,
            key: &str,
            value: Option<String>,
            value_type: SettingType,
            description: Option<String>,
            is_public: bool,
        ) -> Result<(), sqlx::Error> {
            let now = Utc::now();
            self.rows.lock().unwrap().insert(
                key.to_string(),
                Setting {
                    key: key.to_string(),
                    value,
                    value_type,
                    description,
                    is_public,
                    created_at: now,
                    updated_at: now,
                },
            );
            Ok(())
        }

        async fn fetch_public_settings(&self) -> Result<Vec<Setting>, sqlx::Error> {
            Ok(self
                .rows
                .lock()
                .unwrap()
                .values()
                .filter(|s| s.is_public)
                .cloned()
                .collect())
        }
    }

    fn service_with(store: InMemoryStore) -> (SettingsService, Arc<InMemoryStore>) {
        let store = Arc::new(store);
        (SettingsService::new(store.clone()), store)
    }

    #[test]
    fn decodes_values_by_declared_type() {
        assert_eq!(decode_value("42", SettingType::Integer), Value::from(42));
        assert_eq!(decode_value("1", SettingType::Boolean), Value::Bool(true));
        assert_eq!(decode_value("0", SettingType::Boolean), Value::Bool(false));
        assert_eq!(decode_value("3.5", SettingType::Decimal), Value::from(3.5));
        assert_eq!(
            decode_value("hello", SettingType::String),
            Value::String("hello".to_string())
        );
        assert_eq!(
            decode_value(r#"{"a":1}"#, SettingType::Json),
            serde_json::json!({"a": 1})
        );
    }

    #[test]
    fn malformed_values_fall_back_to_the_raw_string() {
        assert_eq!(
            decode_value("not-a-number", SettingType::Integer),
            Value::String("not-a-number".to_string())
        );
        assert_eq!(
            decode_value("{broken", SettingType::Json),
            Value::String("{broken".to_string())
        );
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache() {
        let store = InMemoryStore::new();
        store.seed("redirect_delay", "3", SettingType::Integer, true);
        let (service, store) = service_with(store);

        assert_eq!(service.get_int("redirect_delay", 0).await.unwrap(), 3);
        assert_eq!(service.get_int("redirect_delay", 0).await.unwrap(), 3);
        assert_eq!(store.fetches(), 1);
    }

    #[tokio::test]
    async fn missing_keys_use_the_caller_default() {
        let (service, _) = service_with(InMemoryStore::new());
        assert_eq!(service.get_int("min_review_length", 10).await.unwrap(), 10);
        assert!(!service.get_bool("auto_approve_reviews", false).await.unwrap());
        assert_eq!(service.get("nope").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn set_invalidates_the_cached_key() {
        let store = InMemoryStore::new();
        store.seed("max_review_length", "500", SettingType::Integer, false);
        let (service, _) = service_with(store);

        assert_eq!(service.get_int("max_review_length", 0).await.unwrap(), 500);
        service
            .set(
                "max_review_length",
                &Value::from(750),
                SettingType::Integer,
                None,
                false,
            )
            .await
            .unwrap();
        assert_eq!(service.get_int("max_review_length", 0).await.unwrap(), 750);
    }

    #[tokio::test]
    async fn public_snapshot_excludes_private_settings_and_refreshes_on_write() {
        let store = InMemoryStore::new();
        store.seed("company_name", "Review SAAS", SettingType::String, true);
        store.seed("openai_api_key", "sk-secret", SettingType::String, false);
        let (service, _) = service_with(store);

        let public = service.public_settings().await.unwrap();
        assert_eq!(public.get("company_name"), Some(&Value::from("Review SAAS")));
        assert!(!public.contains_key("openai_api_key"));

        service
            .set(
                "company_name",
                &Value::from("Acme Reviews"),
                SettingType::String,
                None,
                true,
            )
            .await
            .unwrap();
        let public = service.public_settings().await.unwrap();
        assert_eq!(public.get("company_name"), Some(&Value::from("Acme Reviews")));
    }

    #[tokio::test]
    async fn boolean_writes_are_stored_as_flags() {
        let (service, store) = service_with(InMemoryStore::new());
        service
            .set(
                "review_suggestions_enabled",
                &Value::Bool(true),
                SettingType::Boolean,
                None,
                false,
            )
            .await
            .unwrap();
        let row = store
            .rows
            .lock()
            .unwrap()
            .get("review_suggestions_enabled")
            .cloned()
            .unwrap();
        assert_eq!(row.value.as_deref(), Some("1"));
        assert!(service.suggestions_enabled().await.unwrap());
    }
}
