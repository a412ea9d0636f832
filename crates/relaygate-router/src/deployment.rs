/// A single routable (provider, model) target (spec.md §4.D).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub id: String,
    pub provider_name: String,
    pub model_name: String,
    pub tags: Vec<String>,
    /// Lower priority value wins ties before latency is considered.
    pub priority: u32,
    pub timeout_s: u64,
}

impl Deployment {
    pub fn new(
        id: impl Into<String>,
        provider_name: impl Into<String>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            provider_name: provider_name.into(),
            model_name: model_name.into(),
            tags: Vec::new(),
            priority: 100,
            timeout_s: 30,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_priority(mut self, priority: u32) -> Self {
        self.priority = priority;
        self
    }

    fn matches_tags(&self, requested: &[String]) -> bool {
        requested.is_empty() || requested.iter().any(|t| self.tags.iter().any(|dt| dt == t))
    }

    /// The requested model may be namespaced as `provider/model`; if the
    /// prefix names this deployment's provider, match against the
    /// remainder instead of the whole string.
    fn requested_model<'a>(&self, requested: &'a str) -> &'a str {
        match requested.split_once('/') {
            Some((prefix, rest)) if prefix.eq_ignore_ascii_case(&self.provider_name) => rest,
            _ => requested,
        }
    }

    pub(crate) fn is_eligible_for(&self, ctx: &RequestContext) -> bool {
        self.model_name == self.requested_model(&ctx.model) && self.matches_tags(&ctx.tags)
    }
}

/// The request-shaped context `Pick` narrows the candidate set against.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub model: String,
    pub tags: Vec<String>,
    pub tenant_scope: Option<String>,
    pub is_streaming: bool,
    /// Rough token estimate for the request body, carried through for
    /// routers that weight on request size; not yet consulted by `Pick`.
    pub estimated_input_tokens: u32,
}

impl RequestContext {
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }
}
