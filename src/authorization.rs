//! Access-control gate.
//!
//! Casbin decides, from one `p, <role>, <permission>` policy line per grant
//! stored in the database. A user without a role is refused before casbin is
//! asked anything.

use casbin::{CoreApi, DefaultModel, MemoryAdapter, MgmtApi};
use log::{error, info};
use serde_json::json;
use thiserror::Error;

use crate::db::{DBError, Database};
use crate::models::{CurrentUser, Permission};

const MODEL: &str = include_str!("../access_control/model.conf");

/// A casbin enforcer loaded with the role grants.
pub struct Enforcer(casbin::Enforcer);

type GateResult = Result<(), AccessDenied>;

/// Refusal without details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Permission denied")]
pub struct AccessDenied;

#[derive(Debug, Error)]
pub enum AuthorizationError {
    #[error("Casbin error: {0}")]
    Casbin(#[from] casbin::Error),

    #[error(transparent)]
    Store(#[from] DBError),
}

/// The enforcer bound to the user of the current request.
pub struct Context<'ctx> {
    enforcer: &'ctx Enforcer,
    subject: &'ctx CurrentUser,
}

impl Enforcer {
    /// Builds the enforcer from the grants currently stored.
    pub fn load(db: &Database) -> Result<Self, AuthorizationError> {
        Self::from_grants(db.role_grants()?)
    }

    pub fn from_grants<I>(grants: I) -> Result<Self, AuthorizationError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let policies: Vec<Vec<String>> = grants
            .into_iter()
            .map(|(role, permission)| vec![role, permission])
            .collect();

        futures::executor::block_on(async {
            let model = DefaultModel::from_str(MODEL).await?;
            let mut enforcer = casbin::Enforcer::new(model, MemoryAdapter::default()).await?;
            if !policies.is_empty() {
                enforcer.add_policies(policies).await?;
            }
            Ok::<_, AuthorizationError>(Enforcer(enforcer))
        })
    }

    pub fn with_subject<'ctx>(&'ctx self, subject: &'ctx CurrentUser) -> Context<'ctx> {
        Context {
            enforcer: self,
            subject,
        }
    }

    /// True iff the user has a role, and that role holds the permission.
    pub fn has_permission(&self, user: &CurrentUser, permission: &str) -> bool {
        let Some(role) = user.role.as_deref() else {
            info!("Denied {permission} to {user}: no role");
            return false;
        };

        info!(
            "Enforcing {}",
            json!({ "sub": user.username, "role": role, "obj": permission })
        );

        match self.0.enforce((role, permission)) {
            Err(e) => {
                error!("Casbin error: {e:?}");
                false
            }
            Ok(granted) => {
                info!("Granted: {granted}");
                granted
            }
        }
    }
}

impl Context<'_> {
    /// Fails unless the user holds `permission`.
    pub fn require(&self, permission: Permission) -> GateResult {
        if self.has_permission(permission.name()) {
            Ok(())
        } else {
            Err(AccessDenied)
        }
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.enforcer.has_permission(self.subject, permission)
    }

    /// The sections of the catalog the user may open.
    pub fn granted(&self) -> Vec<Permission> {
        use strum::IntoEnumIterator;

        Permission::iter()
            .filter(|permission| self.has_permission(permission.name()))
            .collect()
    }
}
