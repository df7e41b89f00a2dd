//! Data model

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString, IntoStaticStr};

use crate::utils::input_validation::{Price, Username};
use crate::utils::password_utils::PWHash;

/// Declares the row identifier of one table.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash, PartialOrd, Ord, Display,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            pub fn new(id: i64) -> Self {
                Self(id)
            }

            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl rusqlite::ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
                Ok(rusqlite::types::ToSqlOutput::from(self.0))
            }
        }

        impl rusqlite::types::FromSql for $name {
            fn column_result(
                value: rusqlite::types::ValueRef<'_>,
            ) -> rusqlite::types::FromSqlResult<Self> {
                <i64 as rusqlite::types::FromSql>::column_result(value).map(Self)
            }
        }
    };
}

entity_id!(PermissionID);
entity_id!(RoleID);
entity_id!(
    /// Row id of a user. This is what the session remembers.
    UserID
);
entity_id!(DoctorID);
entity_id!(InsuranceProviderID);
entity_id!(PatientID);
entity_id!(AppointmentID);

/// The fixed permission catalog. Each permission gates one section of the application.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
pub enum Permission {
    #[strum(serialize = "medicos")]
    #[serde(rename = "medicos")]
    Doctors,
    #[strum(serialize = "obras_sociales")]
    #[serde(rename = "obras_sociales")]
    InsuranceProviders,
    #[strum(serialize = "pacientes")]
    #[serde(rename = "pacientes")]
    Patients,
    #[strum(serialize = "turnos")]
    #[serde(rename = "turnos")]
    Appointments,
    #[strum(serialize = "estadisticas")]
    #[serde(rename = "estadisticas")]
    Statistics,
    #[strum(serialize = "usuarios")]
    #[serde(rename = "usuarios")]
    Users,
}

impl Permission {
    /// Name stored in the permission table.
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn description(self) -> String {
        format!("Access to {}", self.name())
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionRecord {
    pub id: PermissionID,
    pub name: String,
    pub description: Option<String>,
}

/// A named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRecord {
    pub id: RoleID,
    pub name: String,
    pub description: Option<String>,
    pub permissions: BTreeSet<String>,
}

/// The role a user is bound to, as joined from the role table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRef {
    pub id: RoleID,
    pub name: String,
}

/// A user as stored in the user directory.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: UserID,
    pub username: Username,
    #[serde(skip_serializing)]
    pub password: PWHash,
    pub full_name: Option<String>,
    pub role: Option<RoleRef>,
}

/// The authenticated user of one request.
///
/// Built from a [`UserRecord`] by [`CurrentUser::from_record`], and carries no
/// credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Display)]
#[display("{username}")]
pub struct CurrentUser {
    pub id: UserID,
    pub username: Username,
    pub full_name: Option<String>,
    pub role: Option<String>,
}

impl CurrentUser {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username.clone(),
            full_name: record.full_name.clone(),
            role: record.role.as_ref().map(|role| role.name.clone()),
        }
    }

    /// Name used to greet the user.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(self.username.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Doctor {
    pub id: DoctorID,
    pub first_name: String,
    pub last_name: String,
    pub specialty: String,
}

impl Doctor {
    /// `Last, First`, as the doctor appears in listings and reports.
    pub fn display_name(&self) -> String {
        format!("{}, {}", self.last_name, self.first_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsuranceProvider {
    pub id: InsuranceProviderID,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patient {
    pub id: PatientID,
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub insurance_provider: Option<InsuranceProviderID>,
}

/// An entry of the appointment ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Appointment {
    pub id: AppointmentID,
    pub datetime: NaiveDateTime,
    pub patient: PatientID,
    pub doctor: DoctorID,
    pub specialty: String,
    pub price: Price,
    pub uses_insurance: bool,
    pub insurance_provider: Option<InsuranceProviderID>,
    pub paid: bool,
}
