use crate::{
    config::AuthConfig,
    error::{ApiError, Result},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Subject (user_id)
    pub sub: String,
    /// Company the user acts for
    pub company_id: String,
    pub role: String,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

pub struct JWTService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JWTService {
    pub fn new(config: Arc<AuthConfig>) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        Self {
            encoding_key,
            decoding_key,
        }
    }

    /// Issue a token for a company user, valid for `ttl`
    pub fn generate_token(
        &self,
        user_id: Uuid,
        company_id: Uuid,
        role: &str,
        ttl: Duration,
    ) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            company_id: company_id.to_string(),
            role: role.to_string(),
            exp: (OffsetDateTime::now_utc() + ttl).unix_timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ApiError::Internal(e.into()))?;

        Ok(token)
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ApiError::Unauthorized("Token has expired".to_string())
                }
                _ => ApiError::Unauthorized(format!("Invalid token: {}", e)),
            })?;

        Ok(token_data.claims)
    }

    /// Extract user_id from claims
    pub fn user_id_from_claims(claims: &Claims) -> Result<Uuid> {
        Uuid::parse_str(&claims.sub)
            .map_err(|e| ApiError::Unauthorized(format!("Invalid user_id: {}", e)))
    }

    /// Extract company_id from claims
    pub fn company_id_from_claims(claims: &Claims) -> Result<Uuid> {
        Uuid::parse_str(&claims.company_id)
            .map_err(|e| ApiError::Unauthorized(format!("Invalid companyId: {}", e)))
    }
}
