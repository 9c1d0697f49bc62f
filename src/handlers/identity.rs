use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::errors::ServiceError;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLE_HEADER: &str = "x-user-role";
const ADMIN_ROLE: &str = "admin";

/// Identity propagated by the session subsystem's gateway. This service
/// trusts the headers; authentication itself lives upstream.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub role: String,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| {
                ServiceError::Unauthorized(format!("missing or invalid {USER_ID_HEADER} header"))
            })?;

        let role = parts
            .headers
            .get(USER_ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("customer")
            .to_string();

        Ok(CurrentUser { id, role })
    }
}

/// Gate for administrative routes: import creation, status transitions,
/// bulk operations, and manual stock adjustments.
#[derive(Debug, Clone)]
pub struct AdminUser {
    pub id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(ServiceError::Forbidden(
                "administrative role required".to_string(),
            ));
        }
        Ok(AdminUser { id: user.id })
    }
}
