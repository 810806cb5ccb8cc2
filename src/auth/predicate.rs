use crate::identity::RequestContext;

/// Route gate: matches when the request's authenticated state equals the wanted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authenticated(pub bool);

impl Authenticated {
    pub fn matches(&self, ctx: &RequestContext) -> bool { self.0 == ctx.is_authenticated() }
}
