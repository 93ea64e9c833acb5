use crate::cache::KVCache;
use crate::error::{Error, Result};
use crate::{Application, Storage};
use chrono::{DateTime, Utc};
use faststr::FastStr;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Member {
    pub id:              i32,
    pub username:        FastStr,
    #[serde(skip_serializing)]
    pub password_hash:   FastStr,
    pub email:           FastStr,
    pub department_name: FastStr,
    pub is_active:       bool,
    pub is_superuser:    bool,
    pub date_joined:     DateTime<Utc>,
    // Nullable columns in SQL map to Option<T> in Rust.
    pub last_login:      Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct NewMember {
    pub username:        FastStr,
    pub password_hash:   FastStr,
    pub email:           FastStr,
    pub department_name: FastStr,
}

#[derive(Debug, Default)]
pub struct MemberUpdate {
    pub email:           Option<FastStr>,
    pub department_name: Option<FastStr>,
    pub is_active:       Option<bool>,
}

const MEMBER_COLUMNS: &str = "id, username, password_hash, email, department_name, \
                              is_active, is_superuser, date_joined, last_login";

impl<C: KVCache<Application>> Storage<C> {
    pub async fn get_member(&self, username: &str) -> Result<Option<Member>> {
        Ok(sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_members(&self) -> Result<Vec<Member>> {
        Ok(sqlx::query_as::<_, Member>(&format!(
            "SELECT {MEMBER_COLUMNS} FROM members ORDER BY username"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn create_member(&self, new: &NewMember) -> Result<Member> {
        if self.get_member(&new.username).await?.is_some() {
            return Err(Error::Conflict(new.username.clone()));
        }
        Ok(sqlx::query_as::<_, Member>(&format!(
            "INSERT INTO members (username, password_hash, email, department_name) \
             VALUES ($1, $2, $3, $4) RETURNING {MEMBER_COLUMNS}"
        ))
        .bind(new.username.as_str())
        .bind(new.password_hash.as_str())
        .bind(new.email.as_str())
        .bind(new.department_name.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn update_member(&self, username: &str, update: MemberUpdate) -> Result<Member> {
        let Some(mut member) = self.get_member(username).await? else {
            return Err(Error::NotFound(username.to_owned().into()));
        };
        if let Some(email) = update.email {
            member.email = email;
        }
        if let Some(department_name) = update.department_name {
            member.department_name = department_name;
        }
        if let Some(is_active) = update.is_active {
            member.is_active = is_active;
        }

        sqlx::query(
            "UPDATE members SET email = $2, department_name = $3, is_active = $4 \
             WHERE username = $1",
        )
        .bind(username)
        .bind(member.email.as_str())
        .bind(member.department_name.as_str())
        .bind(member.is_active)
        .execute(&self.pool)
        .await?;
        Ok(member)
    }

    /// Soft delete: the account is deactivated and loses its grants, but the
    /// row stays.
    pub async fn deactivate_member(&self, username: &str) -> Result<()> {
        let Some(member) = self.get_member(username).await? else {
            return Err(Error::NotFound(username.to_owned().into()));
        };
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE members SET is_active = FALSE WHERE id = $1")
            .bind(member.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM member_applications WHERE member_id = $1")
            .bind(member.id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn set_password(&self, username: &str, password_hash: &str) -> Result<()> {
        let res = sqlx::query("UPDATE members SET password_hash = $2 WHERE username = $1")
            .bind(username)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(Error::NotFound(username.to_owned().into()));
        }
        Ok(())
    }

    pub async fn record_login(&self, username: &str) -> Result<()> {
        sqlx::query("UPDATE members SET last_login = now() WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn applications_for_member(&self, member_id: i32) -> Result<Vec<Application>> {
        Ok(sqlx::query_as::<_, Application>(
            "SELECT a.name, a.api_base, a.api_key, a.type, a.icon \
             FROM applications a \
             JOIN member_applications ma ON a.name = ma.application_name \
             WHERE ma.member_id = $1 \
             ORDER BY a.name",
        )
        .bind(member_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn member_has_application(&self, member_id: i32, name: &str) -> Result<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM member_applications \
             WHERE member_id = $1 AND application_name = $2",
        )
        .bind(member_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    /// Replaces the member's grants with exactly `names`.
    pub async fn set_member_applications(
        &self,
        member_id: i32,
        names: &[FastStr],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM member_applications WHERE member_id = $1")
            .bind(member_id)
            .execute(&mut *tx)
            .await?;
        for name in names {
            sqlx::query(
                "INSERT INTO member_applications (member_id, application_name) VALUES ($1, $2)",
            )
            .bind(member_id)
            .bind(name.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn add_member_applications(
        &self,
        member_id: i32,
        names: &[FastStr],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for name in names {
            sqlx::query(
                "INSERT INTO member_applications (member_id, application_name) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(member_id)
            .bind(name.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_member_applications(
        &self,
        member_id: i32,
        names: &[FastStr],
    ) -> Result<()> {
        let wanted: Vec<String> = names.iter().map(|n| n.to_string()).collect();
        sqlx::query(
            "DELETE FROM member_applications \
             WHERE member_id = $1 AND application_name = ANY($2)",
        )
        .bind(member_id)
        .bind(&wanted)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::lru::AppCache, tests::setup_db};

    #[tokio::test]
    #[ignore = "needs a live database"]
    async fn test_member_lookup() {
        let pool = setup_db().await;
        let storage = Storage {
            pool,
            cache: AppCache::init(),
        };
        let members = storage.list_members().await.unwrap();
        println!("{members:?}");
    }
}
