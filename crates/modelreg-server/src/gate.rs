use modelreg_common::{ActivationStatus, Empty, RegistryError};

use crate::manager::ModelManager;
use crate::record::ModelRecord;
use crate::scope::Scope;

fn require_loaded(rec: &ModelRecord, action: &str) -> Result<(), RegistryError> {
    if rec.is_succeeded() {
        Ok(())
    } else {
        Err(RegistryError::failed_precondition(format!(
            "cannot {action} model {:?} in status {}",
            rec.id, rec.loading_status
        )))
    }
}

impl ModelManager {
    pub async fn activate_model<'a>(
        &self,
        scope: impl Into<Scope<'a>>,
        id: &str,
    ) -> Result<Empty, RegistryError> {
        self.set_activation(scope.into(), id, ActivationStatus::Active)
            .await
    }

    pub async fn deactivate_model<'a>(
        &self,
        scope: impl Into<Scope<'a>>,
        id: &str,
    ) -> Result<Empty, RegistryError> {
        self.set_activation(scope.into(), id, ActivationStatus::Inactive)
            .await
    }

    async fn set_activation(
        &self,
        scope: Scope<'_>,
        id: &str,
        status: ActivationStatus,
    ) -> Result<Empty, RegistryError> {
        let tenant = scope.tenant;
        let action = match status {
            ActivationStatus::Active => "activate",
            _ => "deactivate",
        };
        let mut changed = false;
        self.update_model(tenant, id, |rec| {
            if !scope.admits(rec) {
                return Err(RegistryError::not_found(format!("model {id:?} not found")));
            }
            require_loaded(rec, action)?;
            changed = rec.activation_status != status;
            rec.activation_status = status;
            Ok(changed)
        })
        .await?;
        if changed {
            tracing::info!(tenant, model_id = id, activation = ?status, "activation changed");
        }
        Ok(Empty::default())
    }

    /// Makes a loaded model visible on the public surface.
    pub async fn publish_model(&self, tenant: &str, id: &str) -> Result<Empty, RegistryError> {
        if id.is_empty() {
            return Err(RegistryError::invalid_argument("id is required"));
        }
        let mut changed = false;
        self.update_model(tenant, id, |rec| {
            require_loaded(rec, "publish")?;
            changed = !rec.published;
            rec.published = true;
            Ok(changed)
        })
        .await?;
        if changed {
            tracing::info!(tenant, model_id = id, "model published");
        }
        Ok(Empty::default())
    }
}
