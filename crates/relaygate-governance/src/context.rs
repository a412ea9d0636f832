/// A spend/limit bucket the governance engine checks budget against — one
/// of `{api_key, user, team, organization}` (spec.md §4.H step 2).
#[derive(Debug, Clone)]
pub struct BudgetPrincipal {
    pub kind: &'static str,
    pub id: String,
    pub max_budget: Option<f64>,
    pub spent_budget: f64,
}

impl BudgetPrincipal {
    pub fn new(kind: &'static str, id: impl Into<String>, max_budget: Option<f64>, spent_budget: f64) -> Self {
        Self {
            kind,
            id: id.into(),
            max_budget,
            spent_budget,
        }
    }

    pub fn is_over_budget(&self) -> bool {
        matches!(self.max_budget, Some(max) if max > 0.0 && self.spent_budget >= max)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApiKeyContext {
    pub id: String,
    pub allowed_models: Vec<String>,
    pub rpm: Option<u32>,
    pub burst: Option<u32>,
    /// Per-key tokens-per-minute ceiling; `None` defers to the engine's
    /// configured default (spec.md §4.H: resolve `{RPM, TPM, burst}` per
    /// principal).
    pub tpm: Option<u32>,
}

impl ApiKeyContext {
    /// Empty `allowed_models` means unrestricted (spec.md §4.H step 1).
    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.is_empty()
            || self
                .allowed_models
                .iter()
                .any(|allowed| allowed == "*" || allowed == model)
    }
}

/// Everything downstream of authentication needs about the caller, attached
/// to each request as an immutable context value (spec.md §4.G).
#[derive(Debug, Clone, Default)]
pub struct AuthContext {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub team_id: Option<String>,
    pub team_ids: Vec<String>,
    pub org_id: Option<String>,
    pub end_user_id: Option<String>,
    pub sso_user_id: Option<String>,
    pub api_key: Option<ApiKeyContext>,
    pub budgets: Vec<BudgetPrincipal>,
}

impl AuthContext {
    /// Tenant scope used for router tie-breaking: prefer the API key id,
    /// falling back to the user id (spec.md §4.D "Tenant scope").
    pub fn tenant_scope(&self) -> Option<String> {
        self.api_key
            .as_ref()
            .map(|k| k.id.clone())
            .or_else(|| self.user_id.clone())
    }
}
