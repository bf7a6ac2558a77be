use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_BATCH: usize = 100;
pub const USERNAME_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub count: usize,
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub site_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedAccount {
    pub index: usize,
    pub user_id: Uuid,
    pub username: String,
    pub password: String,
    pub profile_url: String,
    #[serde(skip)]
    pub qr_png: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchItem {
    Created(GeneratedAccount),
    Failed { index: usize, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub requested: usize,
    pub created: usize,
    pub failed: usize,
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    pub fn new(requested: usize) -> Self {
        Self {
            generated_at: Utc::now(),
            requested,
            created: 0,
            failed: 0,
            items: Vec::with_capacity(requested),
        }
    }

    pub fn push(&mut self, item: BatchItem) {
        match item {
            BatchItem::Created(_) => self.created += 1,
            BatchItem::Failed { .. } => self.failed += 1,
        }

        self.items.push(item);
    }

    pub fn accounts(&self) -> impl Iterator<Item = &GeneratedAccount> {
        self.items.iter().filter_map(|item| match item {
            BatchItem::Created(account) => Some(account),
            BatchItem::Failed { .. } => None,
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> {
        self.items.iter().filter_map(|item| match item {
            BatchItem::Failed { index, error } => Some((*index, error.as_str())),
            BatchItem::Created(_) => None,
        })
    }
}
