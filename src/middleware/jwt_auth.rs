use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    services::jwt_service::JWTService,
};
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

/// Request extension storing the verified caller and the company it acts for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyIdentity {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: String,
}

/// JWT authentication middleware
///
/// Validates the bearer token and stores the caller's [`CompanyIdentity`] in
/// request extensions. Every retirement route is company-scoped through it.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing Authorization header".to_string()))?;

    // Parse "Bearer <token>" format
    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::Unauthorized(
            "Invalid Authorization format, expected 'Bearer <token>'".to_string(),
        )
    })?;

    let claims = state.jwt_service.validate_token(token)?;

    let identity = CompanyIdentity {
        user_id: JWTService::user_id_from_claims(&claims)?,
        company_id: JWTService::company_id_from_claims(&claims)?,
        role: claims.role,
    };

    request.extensions_mut().insert(identity);

    Ok(next.run(request).await)
}

/// Axum extractor for the company identity.
/// Only works on routes protected by jwt_auth_middleware.
impl<S> FromRequestParts<S> for CompanyIdentity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CompanyIdentity>()
            .cloned()
            .ok_or_else(|| {
                ApiError::Unauthorized(
                    "Company identity not found - route must be protected by jwt_auth_middleware"
                        .to_string(),
                )
            })
    }
}
