//! Redis service for registrations awaiting OTP confirmation

use async_trait::async_trait;
use redis::{AsyncCommands, Client};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::user::PendingRegistration,
};

fn pending_key(id: Uuid) -> String {
    format!("registration:pending:{}", id)
}

fn email_key(email: &str) -> String {
    format!("registration:email:{}", email.trim().to_lowercase())
}

/// Registrations parked until their OTP is confirmed
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PendingRegistrations: Send + Sync {
    /// Store a pending registration, replacing any earlier one for the same email
    async fn store_pending(&self, pending: &PendingRegistration, expiration_seconds: u64) -> AppResult<()>;

    /// Load a pending registration; `None` once it has expired
    async fn get_pending(&self, id: Uuid) -> AppResult<Option<PendingRegistration>>;

    /// Id of the registration pending for `email`, if any
    async fn pending_id_for_email(&self, email: &str) -> AppResult<Option<Uuid>>;

    /// Drop a pending registration and its email index
    async fn remove_pending(&self, pending: &PendingRegistration) -> AppResult<()>;
}

#[derive(Clone)]
pub struct RedisService {
    client: Client,
}

impl RedisService {
    /// Create a new Redis service
    pub async fn new(url: &str) -> AppResult<Self> {
        let client = Client::open(url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;

        let service = Self { client };
        service.ping().await?;
        Ok(service)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to get Redis connection: {}", e)))
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.connection().await?;
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Redis connection test failed: {}", e)))?;
        Ok(())
    }

    async fn delete_key(&self, key: &str) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to delete key from Redis: {}", e)))
    }
}

#[async_trait]
impl PendingRegistrations for RedisService {
    async fn store_pending(&self, pending: &PendingRegistration, expiration_seconds: u64) -> AppResult<()> {
        let payload = serde_json::to_string(pending)
            .map_err(|e| AppError::Internal(format!("Failed to serialize registration: {}", e)))?;

        if let Some(previous) = self.pending_id_for_email(&pending.email).await? {
            if previous != pending.id {
                self.delete_key(&pending_key(previous)).await?;
            }
        }

        let mut conn = self.connection().await?;
        redis::pipe()
            .atomic()
            .set_ex(pending_key(pending.id), payload, expiration_seconds)
            .ignore()
            .set_ex(email_key(&pending.email), pending.id.to_string(), expiration_seconds)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to store registration in Redis: {}", e)))?;

        Ok(())
    }

    async fn get_pending(&self, id: Uuid) -> AppResult<Option<PendingRegistration>> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .get(pending_key(id))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read registration from Redis: {}", e)))?;

        payload
            .map(|p| {
                serde_json::from_str(&p)
                    .map_err(|e| AppError::Internal(format!("Corrupt pending registration: {}", e)))
            })
            .transpose()
    }

    async fn pending_id_for_email(&self, email: &str) -> AppResult<Option<Uuid>> {
        let mut conn = self.connection().await?;
        let id: Option<String> = conn
            .get(email_key(email))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read registration from Redis: {}", e)))?;

        Ok(id.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    async fn remove_pending(&self, pending: &PendingRegistration) -> AppResult<()> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(vec![pending_key(pending.id), email_key(&pending.email)])
            .await
            .map_err(|e| AppError::Internal(format!("Failed to delete registration from Redis: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        let id = Uuid::nil();
        assert_eq!(
            pending_key(id),
            "registration:pending:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(email_key(" Asha@Example.COM "), "registration:email:asha@example.com");
    }
}
