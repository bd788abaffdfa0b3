//! Redis client
//!
//! `ConnectionManager` reconnects on its own, so every method just clones
//! the handle and issues commands. All writes carry a TTL; nothing in this
//! cache lives forever.

use chrono::Utc;
use redis::aio::ConnectionManager;

use crate::ai::{ChatMessage, Role};
use crate::config::Settings;

use super::{
    keys, merge_and_cap, CacheError, CachedMessage, ContextCache, RateLimitDecision,
    RateLimitStatus, SessionContext,
};

/// TTL and limit knobs, split from the connection so the `Settings` wiring
/// stays testable without a Redis.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Session- and pair-keyed context lists.
    pub context_ttl: u64,
    /// Last-session pointer. Outlives the contexts it points at, so a
    /// returning user can be routed even after their context expired.
    pub last_session_ttl: u64,
    pub rate_limit_window: u64,
    pub rate_limit_requests: u32,
    pub rate_limit_enabled: bool,
    pub max_messages: usize,
}

impl From<&Settings> for CacheConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            context_ttl: settings.session_context_ttl,
            last_session_ttl: settings.user_session_ttl,
            rate_limit_window: settings.rate_limit_ttl,
            rate_limit_requests: settings.rate_limit_requests,
            rate_limit_enabled: settings.rate_limit_enabled,
            max_messages: settings.context_max_messages,
        }
    }
}

/// Redis-backed recency cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
    config: CacheConfig,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    pub async fn connect(settings: &Settings) -> Result<Self, CacheError> {
        let client = redis::Client::open(settings.redis_url.as_str())?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            config: CacheConfig::from(settings),
        })
    }

    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    fn parse_json<T: serde::de::DeserializeOwned>(
        key: &str,
        raw: &str,
    ) -> Result<T, CacheError> {
        serde_json::from_str(raw).map_err(|e| CacheError::Corrupt {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl ContextCache for RedisCache {
    async fn session_context(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionContext>, CacheError> {
        let key = keys::session_context(session_id);
        match self.get_raw(&key).await? {
            Some(raw) => Ok(Some(Self::parse_json(&key, &raw)?)),
            None => Ok(None),
        }
    }

    async fn set_session_context(
        &self,
        session_id: &str,
        user_id: i64,
        coach_id: i64,
        messages: Vec<CachedMessage>,
    ) -> Result<(), CacheError> {
        let now = Utc::now();
        let context = SessionContext {
            session_id: session_id.to_string(),
            user_id,
            coach_id,
            messages,
            created_at: now,
            updated_at: now,
        };
        let key = keys::session_context(session_id);
        let raw = serde_json::to_string(&context).map_err(|e| CacheError::Corrupt {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.set_raw(&key, &raw, self.config.context_ttl).await?;

        // Every session context write refreshes the owner's last-session
        // pointer, not just session creation.
        self.set_last_session(user_id, session_id).await
    }

    async fn append_session_message(
        &self,
        session_id: &str,
        user_id: i64,
        coach_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), CacheError> {
        let key = keys::session_context(session_id);
        let mut context = match self.session_context(session_id).await? {
            Some(context) => context,
            None => SessionContext {
                session_id: session_id.to_string(),
                user_id,
                coach_id,
                messages: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        };

        context.messages = merge_and_cap(
            context.messages,
            CachedMessage::new(role, content),
            self.config.max_messages,
        );
        context.updated_at = Utc::now();

        let raw = serde_json::to_string(&context).map_err(|e| CacheError::Corrupt {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.set_raw(&key, &raw, self.config.context_ttl).await?;
        self.set_last_session(user_id, session_id).await
    }

    async fn recent_session_messages(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, CacheError> {
        let messages = match self.session_context(session_id).await? {
            Some(context) => context.messages,
            None => return Ok(Vec::new()),
        };

        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].iter().map(ChatMessage::from).collect())
    }

    async fn clear_session_context(&self, session_id: &str) -> Result<(), CacheError> {
        self.delete(&keys::session_context(session_id)).await
    }

    async fn pair_context(
        &self,
        user_id: i64,
        coach_id: i64,
    ) -> Result<Option<Vec<ChatMessage>>, CacheError> {
        let key = keys::user_coach_context(user_id, coach_id);
        match self.get_raw(&key).await? {
            Some(raw) => Ok(Some(Self::parse_json(&key, &raw)?)),
            None => Ok(None),
        }
    }

    async fn set_pair_context(
        &self,
        user_id: i64,
        coach_id: i64,
        messages: Vec<ChatMessage>,
    ) -> Result<(), CacheError> {
        let key = keys::user_coach_context(user_id, coach_id);
        let raw = serde_json::to_string(&messages).map_err(|e| CacheError::Corrupt {
            key: key.clone(),
            message: e.to_string(),
        })?;
        self.set_raw(&key, &raw, self.config.context_ttl).await
    }

    async fn append_pair_message(
        &self,
        user_id: i64,
        coach_id: i64,
        role: Role,
        content: &str,
    ) -> Result<(), CacheError> {
        let existing = self.pair_context(user_id, coach_id).await?.unwrap_or_default();
        let messages = merge_and_cap(
            existing,
            ChatMessage {
                role,
                content: content.to_string(),
            },
            self.config.max_messages,
        );
        self.set_pair_context(user_id, coach_id, messages).await
    }

    async fn last_session(&self, user_id: i64) -> Result<Option<String>, CacheError> {
        self.get_raw(&keys::user_last_session(user_id)).await
    }

    async fn set_last_session(&self, user_id: i64, session_id: &str) -> Result<(), CacheError> {
        self.set_raw(
            &keys::user_last_session(user_id),
            session_id,
            self.config.last_session_ttl,
        )
        .await
    }

    async fn check_rate_limit(
        &self,
        user_id: i64,
        endpoint: &str,
    ) -> Result<RateLimitDecision, CacheError> {
        if !self.config.rate_limit_enabled {
            return Ok(RateLimitDecision {
                allowed: true,
                remaining: -1,
            });
        }

        let key = keys::rate_limit(user_id, endpoint);
        let mut conn = self.conn.clone();

        // INCR then set the expiry only on the first hit, so the window
        // starts at the first request and is not extended by later ones.
        let count: i64 = redis::cmd("INCR").arg(&key).query_async(&mut conn).await?;
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(self.config.rate_limit_window)
                .query_async::<()>(&mut conn)
                .await?;
        }

        let limit = i64::from(self.config.rate_limit_requests);
        Ok(RateLimitDecision {
            allowed: count <= limit,
            remaining: (limit - count).max(0),
        })
    }

    async fn rate_limit_status(
        &self,
        user_id: i64,
        endpoint: &str,
    ) -> Result<RateLimitStatus, CacheError> {
        let key = keys::rate_limit(user_id, endpoint);
        let mut conn = self.conn.clone();

        let count: Option<i64> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
        let ttl: i64 = redis::cmd("TTL").arg(&key).query_async(&mut conn).await?;

        let used = count.unwrap_or(0);
        let limit = i64::from(self.config.rate_limit_requests);
        Ok(RateLimitStatus {
            limit: self.config.rate_limit_requests,
            remaining: (limit - used).max(0),
            reset_in: ttl.max(0),
        })
    }

    async fn persona_override(&self, coach_id: i64) -> Result<Option<String>, CacheError> {
        self.get_raw(&keys::coach_persona(coach_id)).await
    }

    async fn set_persona_override(
        &self,
        coach_id: i64,
        persona: &str,
    ) -> Result<(), CacheError> {
        // Personas change rarely; the longer TTL fits.
        self.set_raw(
            &keys::coach_persona(coach_id),
            persona,
            self.config.last_session_ttl,
        )
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.get_raw(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        self.set_raw(key, value, ttl_secs).await
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        redis::cmd("DEL").arg(key).query_async::<()>(&mut conn).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let found: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(found > 0)
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        if pong != "PONG" {
            return Err(CacheError::Corrupt {
                key: "PING".to_string(),
                message: format!("unexpected reply: {pong}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_ttls_come_from_the_right_settings() {
        let settings = Settings::default();
        let config = CacheConfig::from(&settings);

        // Context lists are short-lived; only the last-session pointer gets
        // the day-long TTL.
        assert_eq!(config.context_ttl, settings.session_context_ttl);
        assert_eq!(config.last_session_ttl, settings.user_session_ttl);
        assert_eq!(config.context_ttl, 3600);
        assert_eq!(config.last_session_ttl, 86400);

        assert_eq!(config.rate_limit_window, settings.rate_limit_ttl);
        assert_eq!(config.rate_limit_requests, settings.rate_limit_requests);
        assert_eq!(config.max_messages, settings.context_max_messages);
    }

    #[tokio::test]
    #[ignore = "needs a running Redis; set REDIS_URL"]
    async fn test_session_context_writes_refresh_last_session_pointer() {
        let mut settings = Settings::default();
        if let Ok(url) = std::env::var("REDIS_URL") {
            settings.redis_url = url;
        }
        let cache = RedisCache::connect(&settings).await.unwrap();

        let session_id = uuid::Uuid::new_v4().to_string();
        let user_id = 990_001;
        cache
            .append_session_message(&session_id, user_id, 3, Role::User, "hello")
            .await
            .unwrap();

        assert_eq!(
            cache.last_session(user_id).await.unwrap(),
            Some(session_id.clone())
        );

        cache.clear_session_context(&session_id).await.unwrap();
        cache
            .delete(&keys::user_last_session(user_id))
            .await
            .unwrap();
    }
}
