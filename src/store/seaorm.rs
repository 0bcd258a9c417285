//! SeaORM-backed durable store
//!
//! One row per key in `kv_entries`. Writes are single-statement upserts, and
//! lease acquisition is a conditional upsert so two processes racing for the
//! same lease cannot both win.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use super::entity::{self, Column, Entity as KvEntries};
use super::{KeyValueStore, StoreKey};
use crate::database::Database;
use crate::errors::{StoreError, StoreResult};

#[derive(Clone)]
pub struct SeaOrmStore {
    connection: Arc<DatabaseConnection>,
}

impl SeaOrmStore {
    pub fn new(connection: Arc<DatabaseConnection>) -> Self {
        Self { connection }
    }

    pub fn from_database(database: &Database) -> Self {
        Self::new(database.connection())
    }

    fn encode(key: &StoreKey, value: &Value) -> StoreResult<String> {
        serde_json::to_string(value).map_err(|e| StoreError::encoding(key.render(), e))
    }
}

#[async_trait]
impl KeyValueStore for SeaOrmStore {
    async fn get(&self, key: &StoreKey) -> StoreResult<Option<Value>> {
        let row = KvEntries::find_by_id(key.render())
            .one(&*self.connection)
            .await?;

        match row {
            Some(model) => serde_json::from_str(&model.value)
                .map(Some)
                .map_err(|e| StoreError::encoding(key.render(), e)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &StoreKey, value: Value) -> StoreResult<()> {
        let model = entity::ActiveModel {
            key: Set(key.render()),
            value: Set(Self::encode(key, &value)?),
            expires_at: Set(None),
            updated_at: Set(Utc::now().timestamp_millis()),
        };

        KvEntries::insert(model)
            .on_conflict(
                OnConflict::column(Column::Key)
                    .update_columns([Column::Value, Column::ExpiresAt, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&*self.connection)
            .await?;

        trace!(key = %key, "stored value");
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        key: &StoreKey,
        holder: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = Utc::now().timestamp_millis();
        let holder_value = Self::encode(key, &Value::String(holder.to_string()))?;

        let model = entity::ActiveModel {
            key: Set(key.render()),
            value: Set(holder_value.clone()),
            expires_at: Set(Some(now + ttl.as_millis() as i64)),
            updated_at: Set(now),
        };

        // Only overwrite an existing lease that has expired or is already ours
        let takeover = Expr::col((KvEntries, Column::ExpiresAt)).is_not_null().and(
            Expr::col((KvEntries, Column::ExpiresAt))
                .lt(now)
                .or(Expr::col((KvEntries, Column::Value)).eq(holder_value)),
        );

        let result = KvEntries::insert(model)
            .on_conflict(
                OnConflict::column(Column::Key)
                    .update_columns([Column::Value, Column::ExpiresAt, Column::UpdatedAt])
                    .action_and_where(takeover)
                    .to_owned(),
            )
            .exec_without_returning(&*self.connection)
            .await;

        match result {
            Ok(rows) => Ok(rows > 0),
            Err(DbErr::RecordNotInserted) => Ok(false),
            Err(e) => Err(StoreError::Lease {
                key: key.render(),
                message: e.to_string(),
            }),
        }
    }

    async fn release_lease(&self, key: &StoreKey, holder: &str) -> StoreResult<()> {
        let holder_value = Self::encode(key, &Value::String(holder.to_string()))?;
        KvEntries::delete_many()
            .filter(Column::Key.eq(key.render()))
            .filter(Column::Value.eq(holder_value))
            .filter(Column::ExpiresAt.is_not_null())
            .exec(&*self.connection)
            .await?;
        Ok(())
    }
}
