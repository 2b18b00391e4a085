use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{ErrorBody, ErrorDetail};

// ── Role ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Viewer,
    Operator,
    Admin,
}

impl Role {
    pub fn allows(self, required: Role) -> bool {
        matches!(
            (self, required),
            (Role::Admin, _)
                | (Role::Operator, Role::Viewer | Role::Operator)
                | (Role::Viewer, Role::Viewer)
        )
    }

    fn parse(raw: &str) -> Option<Role> {
        match raw.to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "operator" => Some(Role::Operator),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }
}

// ── AuthContext ──────────────────────────────────────────────────────

/// Identity attached to every authenticated request. All registry state is
/// scoped by `tenant_id`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub principal: String,
    pub role: Role,
    pub tenant_id: String,
    pub project_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub role: Role,
    pub tenant_id: String,
    /// Derived models of other projects are hidden from holders of a
    /// project-scoped token. `None` sees the whole tenant.
    pub project_id: Option<String>,
}

// ── AuthConfig ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
    pub default_tenant: String,
    pub tokens: Arc<HashMap<String, TokenGrant>>,
    pub rate_limits: Arc<Mutex<HashMap<String, RateWindow>>>,
    pub limit_per_minute: u64,
}

#[derive(Debug, Clone)]
pub struct RateWindow {
    pub window_start: Instant,
    pub count: u64,
}

impl AuthConfig {
    /// Auth off: every caller acts as an admin of `default_tenant`.
    pub fn disabled(default_tenant: &str) -> Self {
        Self {
            enabled: false,
            default_tenant: default_tenant.to_string(),
            tokens: Arc::new(HashMap::new()),
            rate_limits: Arc::new(Mutex::new(HashMap::new())),
            limit_per_minute: 0,
        }
    }

    /// Parses a comma separated `token:role[:tenant[:project]]` list.
    pub fn from_tokens(raw: &str, default_tenant: &str, limit_per_minute: u64) -> Self {
        let mut tokens = HashMap::new();
        for entry in raw.split(',') {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                continue;
            }
            let mut parts = trimmed.splitn(4, ':');
            let (Some(token), Some(role_raw)) = (parts.next(), parts.next()) else {
                tracing::warn!(entry=%trimmed, "invalid MODELREG_AUTH_TOKENS entry, expected token:role[:tenant[:project]]");
                continue;
            };
            let Some(role) = Role::parse(role_raw) else {
                tracing::warn!(role=%role_raw, "unknown role in MODELREG_AUTH_TOKENS, skipping");
                continue;
            };
            let tenant_id = parts
                .next()
                .filter(|t| !t.is_empty())
                .unwrap_or(default_tenant)
                .to_string();
            let project_id = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
            tokens.insert(
                token.to_string(),
                TokenGrant {
                    role,
                    tenant_id,
                    project_id,
                },
            );
        }

        Self {
            enabled: true,
            default_tenant: default_tenant.to_string(),
            tokens: Arc::new(tokens),
            rate_limits: Arc::new(Mutex::new(HashMap::new())),
            limit_per_minute,
        }
    }
}

// ── Environment parsing ─────────────────────────────────────────────

pub fn parse_auth_from_env(default_tenant: &str) -> AuthConfig {
    let Some(raw) = std::env::var("MODELREG_AUTH_TOKENS").ok() else {
        tracing::warn!("auth disabled: MODELREG_AUTH_TOKENS not set");
        return AuthConfig::disabled(default_tenant);
    };

    let limit_per_minute = std::env::var("MODELREG_AUTH_RATE_LIMIT_PER_MINUTE")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(600);

    AuthConfig::from_tokens(&raw, default_tenant, limit_per_minute)
}

// ── Middleware ───────────────────────────────────────────────────────
// Generic over any state type S that implements AsRef<AuthConfig>.
// Usage: `middleware::from_fn_with_state(app_state, auth_middleware::<MyAppState>)`

pub async fn auth_middleware<S>(
    State(state): State<S>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, std::convert::Infallible>
where
    S: AsRef<AuthConfig> + Clone + Send + Sync + 'static,
{
    let auth = state.as_ref();

    if !auth.enabled {
        let ctx = AuthContext {
            principal: "guest".into(),
            role: Role::Admin,
            tenant_id: auth.default_tenant.clone(),
            project_id: None,
        };
        req.extensions_mut().insert(ctx);
        return Ok(next.run(req).await);
    }

    let Some(token) = extract_token(&req) else {
        return Ok(unauthorized("missing token"));
    };

    let Some(grant) = auth.tokens.get(&token).cloned() else {
        return Ok(forbidden("invalid token"));
    };

    if auth.limit_per_minute > 0 {
        let mut guard = auth.rate_limits.lock().await;
        let entry = guard.entry(token.clone()).or_insert(RateWindow {
            window_start: Instant::now(),
            count: 0,
        });
        let now = Instant::now();
        if now.duration_since(entry.window_start) >= std::time::Duration::from_secs(60) {
            entry.window_start = now;
            entry.count = 0;
        }
        if entry.count >= auth.limit_per_minute {
            return Ok(too_many_requests());
        }
        entry.count += 1;
    }

    let ctx = AuthContext {
        principal: token,
        role: grant.role,
        tenant_id: grant.tenant_id,
        project_id: grant.project_id,
    };
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

fn extract_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .or_else(|| {
            req.headers()
                .get("x-api-key")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        })
}

// ── Role check ──────────────────────────────────────────────────────

/// `Err(403)` when the caller's role is below `required`.
pub fn require_role(ctx: &AuthContext, required: Role) -> Result<(), Response> {
    if ctx.role.allows(required) {
        Ok(())
    } else {
        Err(forbidden("insufficient permissions"))
    }
}

// ── Error helpers ───────────────────────────────────────────────────

fn error_response(status: StatusCode, code: &str, msg: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: code.to_string(),
            message: msg.to_string(),
            request_id: format!("req_{}", Uuid::new_v4()),
        },
    };
    (status, Json(body)).into_response()
}

pub fn unauthorized(msg: &str) -> Response {
    error_response(StatusCode::UNAUTHORIZED, "unauthenticated", msg)
}

pub fn forbidden(msg: &str) -> Response {
    error_response(StatusCode::FORBIDDEN, "permission_denied", msg)
}

pub fn too_many_requests() -> Response {
    error_response(StatusCode::TOO_MANY_REQUESTS, "rate_limited", "rate limited")
}
