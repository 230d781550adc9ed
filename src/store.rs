use std::future::Future;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};

use crate::entities::kv_entry;
use crate::error::AppError;

pub const DAILY_TASKS_KEY: &str = "daily-tasks";
pub const STEP_COUNT_KEY: &str = "dailyStepCount";
pub const STEP_DATE_KEY: &str = "stepDate";
pub const PROFILE_KEY: &str = "profile";

/// String key-value persistence shared by the trackers under disjoint keys.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, AppError>> + Send;

    fn set(&self, key: &str, value: String) -> impl Future<Output = Result<(), AppError>> + Send;

    fn remove(&self, key: &str) -> impl Future<Output = Result<(), AppError>> + Send;
}

pub struct SqliteStore {
    db: DatabaseConnection,
}

impl SqliteStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let entry = kv_entry::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await
            .map_err(|err| persistence_error("read", key, err))?;
        Ok(entry.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), AppError> {
        let active = kv_entry::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value),
            updated_at: Set(Utc::now()),
        };
        kv_entry::Entity::insert(active)
            .on_conflict(
                OnConflict::column(kv_entry::Column::Key)
                    .update_columns([kv_entry::Column::Value, kv_entry::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(|err| persistence_error("write", key, err))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        kv_entry::Entity::delete_by_id(key.to_string())
            .exec(&self.db)
            .await
            .map_err(|err| persistence_error("remove", key, err))?;
        Ok(())
    }
}

fn persistence_error(action: &str, key: &str, err: sea_orm::DbErr) -> AppError {
    AppError::Persistence(format!("{action} {key}: {err}"))
}

#[cfg(test)]
pub use memory::MemoryStore;
