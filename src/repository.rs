use crate::models::User;
use async_trait::async_trait;
use sqlx::PgPool;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// Repository Trait
///
/// The gateway's only view of the data store: resolving the profile (and so the role)
/// behind an identity provider user id. Everything else in the database belongs to the
/// content handlers mounted behind the gateway.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_user(&self, id: Uuid) -> Option<User>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer across the application state.
pub type RepositoryState = Arc<dyn Repository>;

/// PostgresRepository
///
/// Reads the `profiles` table mirrored from the identity provider's user list.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    /// get_user
    ///
    /// A lookup failure is treated like a missing profile: the caller ends up without a
    /// role, which can only ever narrow access.
    async fn get_user(&self, id: Uuid) -> Option<User> {
        sqlx::query_as::<_, User>("SELECT id, email, role FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(user_id = %id, error = %e, "profile lookup failed");
                None
            })
    }
}

/// InMemoryRepository
///
/// Fixed profile table for tests and local wiring without a database.
#[derive(Default, Clone)]
pub struct InMemoryRepository {
    users: HashMap<Uuid, User>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.users.insert(user.id, user);
        self
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Option<User> {
        self.users.get(&id).cloned()
    }
}
