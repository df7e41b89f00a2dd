//! First-run seeding: permission catalog, base roles and the admin account.
//!
//! Each step only fills an empty table, so running the seed again is harmless.

use std::fmt;

use log::info;
use strum::IntoEnumIterator;
use thiserror::Error;

use crate::consts::{ADMIN_FULL_NAME, ADMIN_ROLE, ADMIN_USERNAME, RECEPTION_ROLE};
use crate::db::{DBError, Database, NewRole};
use crate::models::Permission;
use crate::utils::input_validation::{InvalidInput, Username};
use crate::utils::password_utils::{hash, HashError};

const RECEPTION_PERMISSIONS: [Permission; 3] = [
    Permission::Patients,
    Permission::Appointments,
    Permission::InsuranceProviders,
];

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Store(#[from] DBError),

    #[error("Cannot hash the admin password: {0}")]
    Hash(#[from] HashError),

    #[error("Invalid admin username: {0}")]
    Username(#[from] InvalidInput),

    #[error("The {0} role is missing, cannot create the admin account")]
    MissingRole(&'static str),
}

/// Which seeding steps actually inserted rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions: bool,
    pub roles: bool,
    pub admin_user: bool,
}

impl SeedReport {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let created: Vec<&str> = [
            (self.permissions, "permissions"),
            (self.roles, "roles"),
            (self.admin_user, "admin user"),
        ]
        .into_iter()
        .filter_map(|(done, name)| done.then_some(name))
        .collect();

        if created.is_empty() {
            f.write_str("nothing to seed")
        } else {
            write!(f, "seeded {}", created.join(", "))
        }
    }
}

/// Seeds whatever is missing.
pub fn seed(db: &mut Database, admin_password: &str) -> Result<SeedReport, BootstrapError> {
    let report = SeedReport {
        permissions: seed_permissions(db)?,
        roles: seed_roles(db)?,
        admin_user: seed_admin(db, admin_password)?,
    };
    info!("Bootstrap: {report}");
    Ok(report)
}

fn seed_permissions(db: &mut Database) -> Result<bool, BootstrapError> {
    if db.count_permissions()? > 0 {
        return Ok(false);
    }

    let catalog: Vec<(&str, String)> = Permission::iter()
        .map(|permission| (permission.name(), permission.description()))
        .collect();
    let rows: Vec<(&str, &str)> = catalog
        .iter()
        .map(|(name, description)| (*name, description.as_str()))
        .collect();

    db.insert_permissions(&rows)?;
    Ok(true)
}

fn seed_roles(db: &mut Database) -> Result<bool, BootstrapError> {
    if db.count_roles()? > 0 {
        return Ok(false);
    }

    let everything: Vec<&str> = Permission::iter().map(Permission::name).collect();
    let reception: Vec<&str> = RECEPTION_PERMISSIONS.iter().map(|p| p.name()).collect();

    db.create_roles(&[
        NewRole {
            name: ADMIN_ROLE,
            description: "Administrator",
            permissions: &everything,
        },
        NewRole {
            name: RECEPTION_ROLE,
            description: "Reception",
            permissions: &reception,
        },
    ])?;
    Ok(true)
}

fn seed_admin(db: &mut Database, admin_password: &str) -> Result<bool, BootstrapError> {
    if db.count_users()? > 0 {
        return Ok(false);
    }

    let role = db
        .lookup_role(ADMIN_ROLE)?
        .ok_or(BootstrapError::MissingRole(ADMIN_ROLE))?;
    let username = Username::try_from(ADMIN_USERNAME)?;
    let password = hash(admin_password)?;

    db.insert_user(&username, &password, Some(ADMIN_FULL_NAME), Some(role.id))?;
    Ok(true)
}
