//! Operator numbers configured at runtime.

use {
    async_trait::async_trait,
    chrono::Utc,
    serde::{Deserialize, Serialize},
};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase", default)]
pub struct WhatsAppSettings {
    /// Phone that receives forwarded visitor messages and handover requests.
    pub agent_phone: Option<String>,
    pub main_number: Option<String>,
    pub secondary_number: Option<String>,
}

impl WhatsAppSettings {
    /// All configured numbers, empty values skipped.
    pub fn numbers(&self) -> impl Iterator<Item = &str> {
        [&self.agent_phone, &self.main_number, &self.secondary_number]
            .into_iter()
            .filter_map(|n| n.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn whatsapp_settings(&self) -> Result<WhatsAppSettings>;
    async fn save_whatsapp_settings(&self, settings: &WhatsAppSettings) -> Result<()>;
}

pub struct SqliteSettingsStore {
    pool: sqlx::SqlitePool,
}

impl SqliteSettingsStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn whatsapp_settings(&self) -> Result<WhatsAppSettings> {
        let row = sqlx::query_as::<_, WhatsAppSettings>(
            "SELECT agent_phone, main_number, secondary_number FROM whatsapp_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.unwrap_or_default())
    }

    async fn save_whatsapp_settings(&self, s: &WhatsAppSettings) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO whatsapp_settings (id, agent_phone, main_number, secondary_number, updated_at)
               VALUES (1, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 agent_phone = excluded.agent_phone,
                 main_number = excluded.main_number,
                 secondary_number = excluded.secondary_number,
                 updated_at = excluded.updated_at"#,
        )
        .bind(&s.agent_phone)
        .bind(&s.main_number)
        .bind(&s.secondary_number)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
