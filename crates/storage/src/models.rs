use crate::cache::KVCache;
use crate::error::{Error, Result};
use crate::{Application, Storage};
use faststr::FastStr;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

/// A directly reachable OpenAI-compatible model. `show_name` is what members
/// pick from; `model_name` is what the upstream expects in the request body.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ModelInfo {
    pub id:          i32,
    pub show_name:   FastStr,
    pub model_name:  FastStr,
    pub api_base:    FastStr,
    pub api_key:     Option<FastStr>,
    pub model_type:  FastStr,
    pub provider:    FastStr,
    pub provider_id: FastStr,
}

#[derive(Debug)]
pub struct NewModel {
    pub show_name:   FastStr,
    pub model_name:  FastStr,
    pub api_base:    FastStr,
    pub api_key:     Option<FastStr>,
    pub model_type:  FastStr,
    pub provider:    FastStr,
    pub provider_id: FastStr,
}

#[derive(Debug, Default)]
pub struct ModelUpdate {
    pub show_name:   Option<FastStr>,
    pub model_name:  Option<FastStr>,
    pub api_base:    Option<FastStr>,
    pub api_key:     Option<FastStr>,
    pub model_type:  Option<FastStr>,
    pub provider:    Option<FastStr>,
    pub provider_id: Option<FastStr>,
}

const MODEL_COLUMNS: &str =
    "id, show_name, model_name, api_base, api_key, model_type, provider, provider_id";

impl<C: KVCache<Application>> Storage<C> {
    pub async fn get_model_by_show_name(&self, show_name: &str) -> Result<Option<ModelInfo>> {
        Ok(sqlx::query_as::<_, ModelInfo>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE show_name = $1"
        ))
        .bind(show_name)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn get_model(&self, id: i32) -> Result<Option<ModelInfo>> {
        Ok(sqlx::query_as::<_, ModelInfo>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(sqlx::query_as::<_, ModelInfo>(&format!(
            "SELECT {MODEL_COLUMNS} FROM models ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn create_model(&self, new: &NewModel) -> Result<ModelInfo> {
        if self.get_model_by_show_name(&new.show_name).await?.is_some() {
            return Err(Error::Conflict(new.show_name.clone()));
        }
        Ok(sqlx::query_as::<_, ModelInfo>(&format!(
            "INSERT INTO models \
             (show_name, model_name, api_base, api_key, model_type, provider, provider_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {MODEL_COLUMNS}"
        ))
        .bind(new.show_name.as_str())
        .bind(new.model_name.as_str())
        .bind(new.api_base.as_str())
        .bind(new.api_key.as_ref().map(|k| k.as_str()))
        .bind(new.model_type.as_str())
        .bind(new.provider.as_str())
        .bind(new.provider_id.as_str())
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn update_model(&self, id: i32, update: ModelUpdate) -> Result<ModelInfo> {
        let Some(mut model) = self.get_model(id).await? else {
            return Err(Error::NotFound(format!("model {id}").into()));
        };
        if let Some(show_name) = update.show_name {
            if show_name != model.show_name
                && self.get_model_by_show_name(&show_name).await?.is_some()
            {
                return Err(Error::Conflict(show_name));
            }
            model.show_name = show_name;
        }
        if let Some(model_name) = update.model_name {
            model.model_name = model_name;
        }
        if let Some(api_base) = update.api_base {
            model.api_base = api_base;
        }
        if let Some(api_key) = update.api_key {
            model.api_key = Some(api_key);
        }
        if let Some(model_type) = update.model_type {
            model.model_type = model_type;
        }
        if let Some(provider) = update.provider {
            model.provider = provider;
        }
        if let Some(provider_id) = update.provider_id {
            model.provider_id = provider_id;
        }

        sqlx::query(
            "UPDATE models SET show_name = $2, model_name = $3, api_base = $4, api_key = $5, \
             model_type = $6, provider = $7, provider_id = $8 WHERE id = $1",
        )
        .bind(id)
        .bind(model.show_name.as_str())
        .bind(model.model_name.as_str())
        .bind(model.api_base.as_str())
        .bind(model.api_key.as_ref().map(|k| k.as_str()))
        .bind(model.model_type.as_str())
        .bind(model.provider.as_str())
        .bind(model.provider_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(model)
    }

    /// Deletes a model and returns its display name.
    pub async fn delete_model(&self, id: i32) -> Result<FastStr> {
        let Some(model) = self.get_model(id).await? else {
            return Err(Error::NotFound(format!("model {id}").into()));
        };
        sqlx::query("DELETE FROM models WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(model.show_name)
    }
}
