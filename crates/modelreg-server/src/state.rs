use modelreg_common::auth::AuthConfig;

use crate::manager::ModelManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: ModelManager,
    pub auth: AuthConfig,
}

impl AsRef<AuthConfig> for AppState {
    fn as_ref(&self) -> &AuthConfig {
        &self.auth
    }
}
