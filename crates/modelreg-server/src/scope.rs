use modelreg_common::auth::AuthContext;

use crate::record::ModelRecord;

/// Who a public call acts for: a tenant and, for project-scoped callers,
/// one of its projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope<'a> {
    pub tenant: &'a str,
    pub project: Option<&'a str>,
}

impl<'a> Scope<'a> {
    pub fn new(tenant: &'a str, project: Option<&'a str>) -> Self {
        Self { tenant, project }
    }

    /// Base models and unowned derived models are shared by the whole
    /// tenant; a derived model owned by a project is only seen from it.
    pub fn admits(&self, rec: &ModelRecord) -> bool {
        match (self.project, rec.project_id.as_deref()) {
            (Some(mine), Some(owner)) => rec.is_base_model || mine == owner,
            _ => true,
        }
    }
}

impl<'a> From<&'a str> for Scope<'a> {
    fn from(tenant: &'a str) -> Self {
        Self::new(tenant, None)
    }
}

impl<'a> From<&'a AuthContext> for Scope<'a> {
    fn from(ctx: &'a AuthContext) -> Self {
        Self::new(&ctx.tenant_id, ctx.project_id.as_deref())
    }
}
