use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::api::error::ApiError;
use crate::audit::ActionContext;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";

/// Caller identity taken from request headers.
///
/// Every ledger route needs a tenant; mutating routes additionally need a
/// user, checked with [`TenantContext::action_context`].
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: String,
    pub user_id: Option<String>,
    pub ip_address: String,
    pub user_agent: Option<String>,
}

impl TenantContext {
    pub fn require_user(&self) -> Result<&str, ApiError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", USER_HEADER)))
    }

    /// Audit context for a mutation performed by the calling user.
    pub fn action_context(&self) -> Result<ActionContext, ApiError> {
        let mut context = ActionContext::new(self.require_user()?, self.ip_address.clone());
        context.user_agent = self.user_agent.clone();
        Ok(context)
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = header(&parts.headers, TENANT_HEADER)
            .ok_or_else(|| ApiError::Unauthorized(format!("Missing {} header", TENANT_HEADER)))?;

        let ip_address = header(&parts.headers, "x-forwarded-for")
            .and_then(|forwarded| forwarded.split(',').next().map(|ip| ip.trim().to_string()))
            .unwrap_or_else(|| "unknown".to_string());

        Ok(TenantContext {
            tenant_id,
            user_id: header(&parts.headers, USER_HEADER),
            ip_address,
            user_agent: header(&parts.headers, "user-agent"),
        })
    }
}
