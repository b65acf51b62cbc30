use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Claims, CurrentUser};

/// Decides whether a caller may touch a project's assets
#[async_trait]
pub trait ProjectAuthorizer: Send + Sync {
    async fn can_edit(&self, project_id: &str, user: &CurrentUser) -> Result<bool>;

    async fn can_view(&self, project_id: &str, user: &CurrentUser) -> Result<bool> {
        self.can_edit(project_id, user).await
    }
}

/// Grants access to the owner of the project and nobody else
#[derive(Clone)]
pub struct OwnerAuthorizer {
    db: Database,
}

impl OwnerAuthorizer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProjectAuthorizer for OwnerAuthorizer {
    async fn can_edit(&self, project_id: &str, user: &CurrentUser) -> Result<bool> {
        let owner: Option<String> = sqlx::query_scalar("SELECT user_id FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(owner.as_deref() == Some(user.id.as_str()))
    }
}

/// Bearer token handling. Tokens are issued by the account service; this
/// side only needs the shared secret.
pub struct AuthService;

impl AuthService {
    /// Issue an access token for `user_id`
    pub fn issue_token(user_id: &str, config: &Config, ttl: Duration) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt.secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Validate JWT token
    pub fn validate_token(token: &str, config: &Config) -> Result<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(config.jwt.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))
    }
}
