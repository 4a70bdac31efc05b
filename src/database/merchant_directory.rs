use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::callbacks::store::{MerchantDirectory, StoreError};
use crate::callbacks::types::{MerchantApp, MerchantProfile};
use crate::database::error::DatabaseError;

#[derive(Debug, FromRow)]
struct MerchantRow {
    merchant_id: i64,
    name: String,
    secret: String,
    callback_url: String,
    fail_callback: bool,
}

struct CachedLookup {
    fetched_at: Instant,
    profile: Option<MerchantProfile>,
}

/// Postgres-backed merchant directory with a small in-process cache.
///
/// Every discovered transaction needs a profile and profiles change rarely
/// (only through the merchant administration subsystem), so lookups are
/// cached per (app_key, app_id) for a TTL. Unknown credentials are cached
/// too; a misconfigured transaction would otherwise query on every sweep.
pub struct PgMerchantDirectory {
    pool: PgPool,
    ttl: Duration,
    cache: RwLock<HashMap<(String, String), CachedLookup>>,
}

impl PgMerchantDirectory {
    pub fn new(pool: PgPool, ttl: Duration) -> Self {
        Self {
            pool,
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn load_profile(
        &self,
        app_key: &str,
        app_id: &str,
    ) -> Result<Option<MerchantProfile>, StoreError> {
        let merchant = sqlx::query_as::<_, MerchantRow>(
            "SELECT m.id AS merchant_id, m.name, m.secret, \
                    COALESCE(m.callback_url, '') AS callback_url, m.fail_callback \
             FROM merchants m \
             INNER JOIN merchant_apps a ON a.merchant_id = m.id \
             WHERE a.app_key = $1 AND a.app_id = $2",
        )
        .bind(app_key)
        .bind(app_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        let Some(merchant) = merchant else {
            return Ok(None);
        };

        let apps = sqlx::query_as::<_, MerchantApp>(
            "SELECT a.app_id, a.app_key, COALESCE(a.callback_url, '') AS callback_url \
             FROM merchant_apps a \
             WHERE a.merchant_id = $1 \
             ORDER BY a.app_id ASC",
        )
        .bind(merchant.merchant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(Some(MerchantProfile {
            merchant_id: merchant.merchant_id,
            name: merchant.name,
            secret: merchant.secret,
            callback_url: merchant.callback_url,
            fail_callback: merchant.fail_callback,
            apps,
        }))
    }
}

#[async_trait]
impl MerchantDirectory for PgMerchantDirectory {
    async fn find_by_app(
        &self,
        app_key: &str,
        app_id: &str,
    ) -> Result<Option<MerchantProfile>, StoreError> {
        let key = (app_key.to_string(), app_id.to_string());

        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(&key) {
                if cached.fetched_at.elapsed() < self.ttl {
                    return Ok(cached.profile.clone());
                }
            }
        }

        let profile = self.load_profile(app_key, app_id).await?;

        let mut cache = self.cache.write().await;
        cache.insert(
            key,
            CachedLookup {
                fetched_at: Instant::now(),
                profile: profile.clone(),
            },
        );
        Ok(profile)
    }
}
