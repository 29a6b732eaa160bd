use uuid::Uuid;

use crate::envelope::Action;

/// Tenant pricing/capacity tier, used by callers that need to branch on it
/// (e.g. rate limiting, feature gating) without re-parsing `tenant_id`.
///
/// `relay-core` does not resolve a `tenant_id` to a tier itself — that
/// requires a lookup against tenant data the messaging core has no business
/// owning. A resolver function is supplied by the embedding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenantTier {
    #[default]
    Standard,
    Premium,
    Enterprise,
}

/// A function the embedding service supplies to resolve a `tenant_id` into a
/// [`TenantTier`]. Defaults to [`TenantTier::Standard`] for tenants the
/// resolver doesn't recognise, so a missing or partial tenant directory
/// degrades gracefully instead of failing every dispatch.
pub type TenantTierResolver = std::sync::Arc<dyn Fn(&str) -> TenantTier + Send + Sync>;

/// Per-dispatch context handed to a handler alongside the [`Action`] itself.
///
/// Built once by the consumer worker immediately before invoking a handler,
/// carrying the identifiers a handler needs to log, trace, and authorize
/// without reaching back into the raw envelope for them.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub action_id: Uuid,
    pub action_type: String,
    pub tenant_id: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub tenant_tier: TenantTier,
    pub trace_id: Uuid,
    pub span: tracing::Span,
}

impl ExecutionContext {
    /// Derives a context from an inbound action. `trace_id` defaults to
    /// `action_id` when the producer didn't supply one, so every action —
    /// pseudo-synchronous or not — still has a usable trace identity.
    pub fn from_action(action: &Action, tenant_tier_resolver: Option<&TenantTierResolver>) -> Self {
        let trace_id = action.trace_id.unwrap_or(action.action_id);
        let tenant_tier = match (&action.tenant_id, tenant_tier_resolver) {
            (Some(tenant_id), Some(resolver)) => resolver(tenant_id),
            _ => TenantTier::default(),
        };
        let span = tracing::info_span!(
            "relay.dispatch",
            action_id = %action.action_id,
            action_type = %action.action_type,
            trace_id = %trace_id,
            tenant_id = action.tenant_id.as_deref().unwrap_or(""),
        );
        Self {
            action_id: action.action_id,
            action_type: action.action_type.clone(),
            tenant_id: action.tenant_id.clone(),
            user_id: action.user_id.clone(),
            session_id: action.session_id.clone(),
            tenant_tier,
            trace_id,
            span,
        }
    }
}
