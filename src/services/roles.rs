//! Role lookup seam. The orchestrator only needs one string comparison
//! against the configured eligible role code.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::SqliteDatabase;
use crate::errors::Result;

#[async_trait]
pub trait RoleLookup: Send + Sync {
    /// The user's role code, or `None` when the user carries no role.
    async fn role_code(&self, user_id: &Uuid) -> Result<Option<String>>;
}

pub struct SqliteRoleLookup {
    db: Arc<SqliteDatabase>,
}

impl SqliteRoleLookup {
    pub fn new(db: Arc<SqliteDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RoleLookup for SqliteRoleLookup {
    async fn role_code(&self, user_id: &Uuid) -> Result<Option<String>> {
        self.db.get_role_code_by_user(user_id).await
    }
}
