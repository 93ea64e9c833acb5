use crate::cache::KVCache;
use crate::error::{Error, Result};
use crate::{Member, Storage};
use faststr::FastStr;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub name:     FastStr,
    pub api_base: FastStr,
    pub api_key:  FastStr,
    // "type" is a reserved keyword in Rust, so we must rename it.
    // The `#[sqlx(rename = "type")]` attribute tells sqlx to map
    // the database column "type" to this field.
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub ty:       FastStr,
    pub icon:     FastStr,
}

#[derive(Debug, Default)]
pub struct ApplicationUpdate {
    pub api_base: Option<FastStr>,
    pub api_key:  Option<FastStr>,
    pub ty:       Option<FastStr>,
    pub icon:     Option<FastStr>,
}

const APPLICATION_COLUMNS: &str = "name, api_base, api_key, type, icon";

impl<C: KVCache<Application>> Storage<C> {
    pub async fn get_application(&self, name: &str) -> Result<Option<Application>> {
        if let Some(app) = self.cache.get(name).await {
            return Ok(Some(app));
        }

        let app = sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref a) = app {
            self.cache.set(&a.name, a.clone()).await;
        }
        Ok(app)
    }

    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        Ok(sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn create_application(&self, app: &Application) -> Result<()> {
        if self.get_application(&app.name).await?.is_some() {
            return Err(Error::Conflict(app.name.clone()));
        }
        sqlx::query(
            "INSERT INTO applications (name, api_base, api_key, type, icon) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(app.name.as_str())
        .bind(app.api_base.as_str())
        .bind(app.api_key.as_str())
        .bind(app.ty.as_str())
        .bind(app.icon.as_str())
        .execute(&self.pool)
        .await?;

        self.cache.set(&app.name, app.clone()).await;
        Ok(())
    }

    pub async fn update_application(
        &self,
        name: &str,
        update: ApplicationUpdate,
    ) -> Result<Application> {
        let Some(mut app) = self.get_application(name).await? else {
            return Err(Error::NotFound(name.to_owned().into()));
        };
        if let Some(api_base) = update.api_base {
            app.api_base = api_base;
        }
        if let Some(api_key) = update.api_key {
            app.api_key = api_key;
        }
        if let Some(ty) = update.ty {
            app.ty = ty;
        }
        if let Some(icon) = update.icon {
            app.icon = icon;
        }

        sqlx::query(
            "UPDATE applications SET api_base = $2, api_key = $3, type = $4, icon = $5 \
             WHERE name = $1",
        )
        .bind(name)
        .bind(app.api_base.as_str())
        .bind(app.api_key.as_str())
        .bind(app.ty.as_str())
        .bind(app.icon.as_str())
        .execute(&self.pool)
        .await?;

        self.cache.invalidate(name).await;
        self.cache.set(&app.name, app.clone()).await;
        Ok(app)
    }

    pub async fn delete_application(&self, name: &str) -> Result<()> {
        let res = sqlx::query("DELETE FROM applications WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(name.to_owned().into()));
        }
        self.cache.invalidate(name).await;
        Ok(())
    }

    pub async fn application_member_count(&self, name: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM member_applications WHERE application_name = $1",
        )
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    pub async fn members_for_application(&self, name: &str) -> Result<Vec<Member>> {
        Ok(sqlx::query_as::<_, Member>(
            "SELECT m.id, m.username, m.password_hash, m.email, m.department_name, \
                    m.is_active, m.is_superuser, m.date_joined, m.last_login \
             FROM members m \
             JOIN member_applications ma ON m.id = ma.member_id \
             WHERE ma.application_name = $1 \
             ORDER BY m.username",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Names from `names` that do not exist in the registry.
    pub async fn missing_applications(&self, names: &[FastStr]) -> Result<Vec<FastStr>> {
        if names.is_empty() {
            return Ok(vec![]);
        }
        let wanted: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        let rows: Vec<(FastStr,)> =
            sqlx::query_as("SELECT name FROM applications WHERE name = ANY($1)")
                .bind(&wanted)
                .fetch_all(&self.pool)
                .await?;
        let found: std::collections::HashSet<FastStr> =
            rows.into_iter().map(|row| row.0).collect();
        Ok(names
            .iter()
            .filter(|name| !found.contains(*name))
            .cloned()
            .collect())
    }

    pub async fn warm_up(&self) -> Result<()> {
        let records = self.list_applications().await?;
        for app in &records {
            self.cache.set(&app.name, app.clone()).await;
        }
        info!("warm-up complete: {} applications loaded.", records.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::lru::AppCache, tests::setup_db};

    #[tokio::test]
    #[ignore = "needs a live database"]
    async fn test_application_roundtrip() {
        let pool = setup_db().await;
        let storage = Storage {
            pool,
            cache: AppCache::init(),
        };
        let app = Application {
            name:     "smoke-test-app".into(),
            api_base: "http://dify.local/v1".into(),
            api_key:  "app-key".into(),
            ty:       "dify_agent".into(),
            icon:     "Waypoints".into(),
        };
        storage.create_application(&app).await.unwrap();
        let loaded = storage.get_application("smoke-test-app").await.unwrap();
        assert!(loaded.is_some());
        storage.delete_application("smoke-test-app").await.unwrap();
    }
}
