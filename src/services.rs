//! The clinic operations, and the single entry point for access control.
//!
//! Every operation takes the user of the request, asks the gate first, then
//! validates, then writes.

use chrono::NaiveDate;
use log::{info, warn};
use thiserror::Error;

use crate::authorization::{AccessDenied, AuthorizationError, Enforcer};
use crate::db::{DBError, Database, UserChanges};
use crate::forms::{
    AppointmentForm, DoctorForm, InsuranceProviderForm, NewUser, PatientForm, UserForm,
};
use crate::models::{
    Appointment, CurrentUser, Doctor, DoctorID, InsuranceProvider, InsuranceProviderID, Patient,
    PatientID, Permission, RoleID, RoleRecord, UserID, UserRecord,
};
use crate::report::{day_bounds, DailyReport};
use crate::utils::input_validation::{Username, ValidationErrors};
use crate::utils::password_utils::{hash, verify, HashError, PWHash};

pub struct Service {
    db: Database,
    enforcer: Enforcer,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("No {entity} with id {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("The {entity} with id {id} is still referenced")]
    InUse { entity: &'static str, id: i64 },

    #[error(transparent)]
    DBError(#[from] DBError),

    #[error(transparent)]
    Authorization(#[from] AuthorizationError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] DBError),

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// Turns a unique-constraint failure on `field` into a field error.
fn unique_to_validation(err: DBError, field: &'static str, message: &str) -> ServiceError {
    if err.is_unique_violation() {
        ValidationErrors::single(field, message).into()
    } else {
        err.into()
    }
}

/// Turns a foreign-key failure on delete into `InUse`.
fn restricted(err: DBError, entity: &'static str, id: i64) -> ServiceError {
    if err.is_foreign_key_violation() {
        ServiceError::InUse { entity, id }
    } else {
        err.into()
    }
}

const DUPLICATE_NATIONAL_ID: &str = "A patient with this national ID already exists";
const DUPLICATE_USERNAME: &str = "This username is already taken";

impl Service {
    /// Wraps the store and loads the gate from its grants.
    pub fn new(db: Database) -> Result<Self, AuthorizationError> {
        let enforcer = Enforcer::load(&db)?;
        Ok(Self { db, enforcer })
    }

    /// Rebuilds the gate after the grants changed in the store.
    pub fn reload_policies(&mut self) -> Result<(), AuthorizationError> {
        self.enforcer = Enforcer::load(&self.db)?;
        info!("Access-control policies reloaded");
        Ok(())
    }

    pub fn has_permission(&self, user: &CurrentUser, permission: &str) -> bool {
        self.enforcer.has_permission(user, permission)
    }

    /// The sections the user may open.
    pub fn granted(&self, user: &CurrentUser) -> Vec<Permission> {
        self.enforcer.with_subject(user).granted()
    }

    /// The gate alone, for callers that must refuse before reading their input.
    pub fn enforce(&self, user: &CurrentUser, permission: Permission) -> Result<(), ServiceError> {
        self.enforcer.with_subject(user).require(permission)?;
        Ok(())
    }

    /// Checks the credentials. Unknown users and wrong passwords fail the same way.
    pub fn login(&self, username: &str, password: &str) -> Result<CurrentUser, LoginError> {
        let candidate = self.login_candidate(username)?;
        Self::authenticate(candidate, username, password)
    }

    /// The stored user a login attempt names, if any.
    pub fn login_candidate(&self, username: &str) -> Result<Option<UserRecord>, LoginError> {
        match Username::try_from(username) {
            Ok(username) => Ok(self.db.lookup_username(username.as_ref())?),
            Err(_) => Ok(None),
        }
    }

    /// Verifies the password of a [`Service::login_candidate`].
    /// Needs no store access, so it can run outside the service lock.
    pub fn authenticate(
        candidate: Option<UserRecord>,
        username: &str,
        password: &str,
    ) -> Result<CurrentUser, LoginError> {
        if !verify(password, candidate.as_ref().map(|u| &u.password)) {
            warn!("Failed login attempt for {username:?}");
            return Err(LoginError::InvalidCredentials);
        }

        let user = candidate.ok_or(LoginError::InvalidCredentials)?;
        info!("User {} logged in", user.username);
        Ok(CurrentUser::from_record(&user))
    }

    /// Reloads the user a session points to. `None` once the user is gone.
    pub fn current_user(&self, id: UserID) -> Result<Option<CurrentUser>, DBError> {
        Ok(self.db.get_user(id)?.as_ref().map(CurrentUser::from_record))
    }

    pub fn list_doctors(&self, user: &CurrentUser) -> Result<Vec<Doctor>, ServiceError> {
        self.enforce(user, Permission::Doctors)?;
        Ok(self.db.list_doctors()?)
    }

    pub fn create_doctor(
        &mut self,
        user: &CurrentUser,
        form: &DoctorForm,
    ) -> Result<Doctor, ServiceError> {
        self.enforce(user, Permission::Doctors)?;
        let doctor = self.db.insert_doctor(&form.validate()?)?;
        info!("Doctor {} created by {user}", doctor.id);
        Ok(doctor)
    }

    pub fn delete_doctor(&mut self, user: &CurrentUser, id: DoctorID) -> Result<(), ServiceError> {
        self.enforce(user, Permission::Doctors)?;
        let not_found = ServiceError::NotFound {
            entity: "doctor",
            id: id.get(),
        };

        if self.db.get_doctor(id)?.is_none() {
            return Err(not_found);
        }
        if self.db.doctor_in_use(id)? {
            return Err(ServiceError::InUse {
                entity: "doctor",
                id: id.get(),
            });
        }
        if !self
            .db
            .delete_doctor(id)
            .map_err(|e| restricted(e, "doctor", id.get()))?
        {
            return Err(not_found);
        }

        info!("Doctor {id} deleted by {user}");
        Ok(())
    }

    pub fn list_insurance_providers(
        &self,
        user: &CurrentUser,
    ) -> Result<Vec<InsuranceProvider>, ServiceError> {
        self.enforce(user, Permission::InsuranceProviders)?;
        Ok(self.db.list_insurance_providers()?)
    }

    pub fn create_insurance_provider(
        &mut self,
        user: &CurrentUser,
        form: &InsuranceProviderForm,
    ) -> Result<InsuranceProvider, ServiceError> {
        self.enforce(user, Permission::InsuranceProviders)?;
        let provider = self.db.insert_insurance_provider(&form.validate()?)?;
        info!("Insurance provider {} created by {user}", provider.id);
        Ok(provider)
    }

    pub fn delete_insurance_provider(
        &mut self,
        user: &CurrentUser,
        id: InsuranceProviderID,
    ) -> Result<(), ServiceError> {
        self.enforce(user, Permission::InsuranceProviders)?;
        let entity = "insurance provider";

        if self.db.get_insurance_provider(id)?.is_none() {
            return Err(ServiceError::NotFound { entity, id: id.get() });
        }
        if self.db.insurance_provider_in_use(id)? {
            return Err(ServiceError::InUse { entity, id: id.get() });
        }
        if !self
            .db
            .delete_insurance_provider(id)
            .map_err(|e| restricted(e, entity, id.get()))?
        {
            return Err(ServiceError::NotFound { entity, id: id.get() });
        }

        info!("Insurance provider {id} deleted by {user}");
        Ok(())
    }

    pub fn list_patients(&self, user: &CurrentUser) -> Result<Vec<Patient>, ServiceError> {
        self.enforce(user, Permission::Patients)?;
        Ok(self.db.list_patients()?)
    }

    pub fn create_patient(
        &mut self,
        user: &CurrentUser,
        form: &PatientForm,
    ) -> Result<Patient, ServiceError> {
        self.enforce(user, Permission::Patients)?;
        let patient = form.validate()?;

        let mut errors = ValidationErrors::new();
        if self.db.national_id_exists(patient.national_id.as_ref())? {
            errors.add("national_id", DUPLICATE_NATIONAL_ID);
        }
        if let Some(provider) = patient.insurance_provider {
            if self.db.get_insurance_provider(provider)?.is_none() {
                errors.add("insurance_provider", "Unknown insurance provider");
            }
        }
        errors.into_result()?;

        let patient = self
            .db
            .insert_patient(&patient)
            .map_err(|e| unique_to_validation(e, "national_id", DUPLICATE_NATIONAL_ID))?;
        info!("Patient {} created by {user}", patient.id);
        Ok(patient)
    }

    pub fn delete_patient(&mut self, user: &CurrentUser, id: PatientID) -> Result<(), ServiceError> {
        self.enforce(user, Permission::Patients)?;
        let entity = "patient";

        if self.db.get_patient(id)?.is_none() {
            return Err(ServiceError::NotFound { entity, id: id.get() });
        }
        if self.db.patient_in_use(id)? {
            return Err(ServiceError::InUse { entity, id: id.get() });
        }
        if !self
            .db
            .delete_patient(id)
            .map_err(|e| restricted(e, entity, id.get()))?
        {
            return Err(ServiceError::NotFound { entity, id: id.get() });
        }

        info!("Patient {id} deleted by {user}");
        Ok(())
    }

    /// Most recent first.
    pub fn list_appointments(&self, user: &CurrentUser) -> Result<Vec<Appointment>, ServiceError> {
        self.enforce(user, Permission::Appointments)?;
        Ok(self.db.list_appointments()?)
    }

    /// Books an appointment. A blank specialty means the doctor's own.
    pub fn create_appointment(
        &mut self,
        user: &CurrentUser,
        form: &AppointmentForm,
    ) -> Result<Appointment, ServiceError> {
        self.enforce(user, Permission::Appointments)?;
        let appointment = form.validate()?;

        let mut errors = ValidationErrors::new();
        if self.db.get_patient(appointment.patient)?.is_none() {
            errors.add("patient", "Unknown patient");
        }
        let doctor = self.db.get_doctor(appointment.doctor)?;
        if doctor.is_none() {
            errors.add("doctor", "Unknown doctor");
        }
        if let Some(provider) = appointment.insurance_provider {
            if self.db.get_insurance_provider(provider)?.is_none() {
                errors.add("insurance_provider", "Unknown insurance provider");
            }
        }
        errors.into_result()?;

        let specialty = match (&appointment.specialty, &doctor) {
            (Some(specialty), _) => specialty.as_str().to_owned(),
            (None, Some(doctor)) => doctor.specialty.clone(),
            (None, None) => String::new(),
        };

        let appointment = self.db.insert_appointment(&appointment, &specialty)?;
        info!("Appointment {} booked by {user}", appointment.id);
        Ok(appointment)
    }

    pub fn list_roles(&self, user: &CurrentUser) -> Result<Vec<RoleRecord>, ServiceError> {
        self.enforce(user, Permission::Users)?;
        Ok(self.db.list_roles()?)
    }

    pub fn list_users(&self, user: &CurrentUser) -> Result<Vec<UserRecord>, ServiceError> {
        self.enforce(user, Permission::Users)?;
        Ok(self.db.list_users()?)
    }

    pub fn get_user(&self, user: &CurrentUser, id: UserID) -> Result<UserRecord, ServiceError> {
        self.enforce(user, Permission::Users)?;
        self.db.get_user(id)?.ok_or(ServiceError::NotFound {
            entity: "user",
            id: id.get(),
        })
    }

    /// Checks the references a user form makes to the store.
    /// `current` is the user being edited, if any.
    fn check_user_references(
        &self,
        username: &Username,
        role: Option<RoleID>,
        current: Option<UserID>,
    ) -> Result<(), ServiceError> {
        let mut errors = ValidationErrors::new();
        if let Some(existing) = self.db.lookup_username(username.as_ref())? {
            if Some(existing.id) != current {
                errors.add("username", DUPLICATE_USERNAME);
            }
        }
        if let Some(role) = role {
            if self.db.get_role(role)?.is_none() {
                errors.add("role", "Unknown role");
            }
        }
        Ok(errors.into_result()?)
    }

    pub fn create_user(
        &mut self,
        user: &CurrentUser,
        form: &UserForm,
    ) -> Result<UserRecord, ServiceError> {
        let new_user = self.check_new_user(user, form)?;
        let password = hash(new_user.password.as_deref().unwrap_or_default())?;
        self.insert_new_user(user, &new_user, &password)
    }

    /// Gate and validation of a user creation, before the password is hashed.
    pub fn check_new_user(
        &self,
        user: &CurrentUser,
        form: &UserForm,
    ) -> Result<NewUser, ServiceError> {
        self.enforce(user, Permission::Users)?;
        let new_user = form.validate_for_create()?;
        self.check_user_references(&new_user.username, new_user.role, None)?;
        Ok(new_user)
    }

    /// Stores a user accepted by [`Service::check_new_user`].
    pub fn insert_new_user(
        &mut self,
        user: &CurrentUser,
        new_user: &NewUser,
        password: &PWHash,
    ) -> Result<UserRecord, ServiceError> {
        self.enforce(user, Permission::Users)?;
        let id = self
            .db
            .insert_user(
                &new_user.username,
                password,
                Some(new_user.full_name.as_str()),
                new_user.role,
            )
            .map_err(|e| unique_to_validation(e, "username", DUPLICATE_USERNAME))?;

        info!("User {} created by {user}", new_user.username);
        self.db.get_user(id)?.ok_or(ServiceError::NotFound {
            entity: "user",
            id: id.get(),
        })
    }

    /// Updates a user. A blank password keeps the current one.
    pub fn update_user(
        &mut self,
        user: &CurrentUser,
        id: UserID,
        form: &UserForm,
    ) -> Result<UserRecord, ServiceError> {
        let changes = self.check_user_update(user, id, form)?;
        let password = changes.password.as_deref().map(hash).transpose()?;
        self.apply_user_update(user, id, &changes, password.as_ref())
    }

    /// Gate and validation of a user update, before the password is hashed.
    pub fn check_user_update(
        &self,
        user: &CurrentUser,
        id: UserID,
        form: &UserForm,
    ) -> Result<NewUser, ServiceError> {
        self.enforce(user, Permission::Users)?;
        if self.db.get_user(id)?.is_none() {
            return Err(ServiceError::NotFound {
                entity: "user",
                id: id.get(),
            });
        }
        let changes = form.validate_for_update()?;
        self.check_user_references(&changes.username, changes.role, Some(id))?;
        Ok(changes)
    }

    /// Stores changes accepted by [`Service::check_user_update`].
    /// Without `password` the current hash is kept.
    pub fn apply_user_update(
        &mut self,
        user: &CurrentUser,
        id: UserID,
        changes: &NewUser,
        password: Option<&PWHash>,
    ) -> Result<UserRecord, ServiceError> {
        self.enforce(user, Permission::Users)?;
        let not_found = || ServiceError::NotFound {
            entity: "user",
            id: id.get(),
        };

        let updated = self
            .db
            .update_user(
                id,
                &UserChanges {
                    username: &changes.username,
                    password,
                    full_name: changes.full_name.as_str(),
                    role: changes.role,
                },
            )
            .map_err(|e| unique_to_validation(e, "username", DUPLICATE_USERNAME))?;
        if !updated {
            return Err(not_found());
        }

        info!("User {id} updated by {user}");
        self.db.get_user(id)?.ok_or_else(not_found)
    }

    pub fn delete_user(&mut self, user: &CurrentUser, id: UserID) -> Result<(), ServiceError> {
        self.enforce(user, Permission::Users)?;
        if !self.db.delete_user(id)? {
            return Err(ServiceError::NotFound {
                entity: "user",
                id: id.get(),
            });
        }
        info!("User {id} deleted by {user}");
        Ok(())
    }

    /// The appointments of `date` and what was cashed in that day.
    pub fn daily_report(
        &self,
        user: &CurrentUser,
        date: NaiveDate,
    ) -> Result<DailyReport, ServiceError> {
        self.enforce(user, Permission::Statistics)?;
        let (start, end) = day_bounds(date);
        let rows = self.db.report_rows(start, end)?;
        Ok(DailyReport::new(date, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::seed;

    const ADMIN_PASSWORD: &str = "adminpass";

    fn create_service() -> Service {
        let mut db = Database::open_in_memory().unwrap();
        seed(&mut db, ADMIN_PASSWORD).unwrap();
        Service::new(db).unwrap()
    }

    fn admin(service: &Service) -> CurrentUser {
        service.current_user(UserID::new(1)).unwrap().unwrap()
    }

    fn create_test_user(role: Option<&str>) -> CurrentUser {
        CurrentUser {
            id: UserID::new(42),
            username: Username::try_from("tester").unwrap(),
            full_name: None,
            role: role.map(str::to_owned),
        }
    }

    fn doctor_form() -> DoctorForm {
        DoctorForm {
            first_name: "Gregory".to_string(),
            last_name: "House".to_string(),
            specialty: "Diagnostics".to_string(),
        }
    }

    fn patient_form(national_id: &str) -> PatientForm {
        PatientForm {
            first_name: "Ana".to_string(),
            last_name: "Pérez".to_string(),
            national_id: national_id.to_string(),
            ..Default::default()
        }
    }

    fn appointment_form(
        patient: PatientID,
        doctor: DoctorID,
        datetime: &str,
        price: &str,
        paid: bool,
    ) -> AppointmentForm {
        AppointmentForm {
            datetime: datetime.to_string(),
            patient: patient.to_string(),
            doctor: doctor.to_string(),
            price: price.to_string(),
            paid: paid.then(|| "on".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_login() {
        let service = create_service();

        let user = service.login("admin", ADMIN_PASSWORD).unwrap();
        assert_eq!(user.role.as_deref(), Some("admin"));
        assert_eq!(user.display_name(), "Administrator");

        assert!(matches!(
            service.login("admin", "wrong"),
            Err(LoginError::InvalidCredentials)
        ));
        assert!(matches!(
            service.login("nobody", ADMIN_PASSWORD),
            Err(LoginError::InvalidCredentials)
        ));
        assert!(matches!(
            service.login("x", ADMIN_PASSWORD),
            Err(LoginError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_reloaded_policies_grant_new_roles() {
        let mut service = create_service();
        let auditor = create_test_user(Some("auditor"));
        assert!(!service.has_permission(&auditor, "estadisticas"));

        service
            .db
            .create_role("auditor", "Auditor", &["estadisticas"])
            .unwrap();
        assert!(!service.has_permission(&auditor, "estadisticas"));

        service.reload_policies().unwrap();
        assert!(service.has_permission(&auditor, "estadisticas"));
        assert!(!service.has_permission(&auditor, "usuarios"));
        assert_eq!(service.granted(&auditor), vec![Permission::Statistics]);
    }

    #[test]
    fn test_user_checked_then_stored_in_two_steps() {
        let mut service = create_service();
        let admin = admin(&service);
        let form = UserForm {
            username: "reception".to_string(),
            password: "frontdesk".to_string(),
            full_name: "Front Desk".to_string(),
            role: "none".to_string(),
        };

        let new_user = service.check_new_user(&admin, &form).unwrap();
        let password = hash(new_user.password.as_deref().unwrap()).unwrap();
        let created = service.insert_new_user(&admin, &new_user, &password).unwrap();

        let update = UserForm {
            password: String::new(),
            ..form
        };
        let changes = service.check_user_update(&admin, created.id, &update).unwrap();
        assert_eq!(changes.password, None);
        service
            .apply_user_update(&admin, created.id, &changes, None)
            .unwrap();

        let candidate = service.login_candidate("reception").unwrap();
        let user = Service::authenticate(candidate, "reception", "frontdesk").unwrap();
        assert_eq!(user.id, created.id);

        let outsider = create_test_user(Some("recepcion"));
        assert!(matches!(
            service.check_new_user(&outsider, &UserForm::default()),
            Err(ServiceError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_roleless_user_is_denied_everywhere() {
        let mut service = create_service();
        let user = create_test_user(None);

        assert!(service.granted(&user).is_empty());
        assert!(matches!(
            service.list_doctors(&user),
            Err(ServiceError::AccessDenied(_))
        ));
        assert!(matches!(
            service.create_doctor(&user, &doctor_form()),
            Err(ServiceError::AccessDenied(_))
        ));
        assert!(matches!(
            service.list_users(&user),
            Err(ServiceError::AccessDenied(_))
        ));
    }

    #[test]
    fn test_reception_cannot_manage_doctors() {
        let mut service = create_service();
        let reception = create_test_user(Some("recepcion"));

        assert!(service.list_patients(&reception).is_ok());
        assert!(service.list_appointments(&reception).is_ok());
        assert!(service.list_insurance_providers(&reception).is_ok());
        assert!(matches!(
            service.create_doctor(&reception, &doctor_form()),
            Err(ServiceError::AccessDenied(_))
        ));
        assert!(matches!(
            service.daily_report(&reception, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
            Err(ServiceError::AccessDenied(_))
        ));
        assert!(service.list_doctors(&admin(&service)).unwrap().is_empty());
    }

    #[test]
    fn test_denied_operation_writes_nothing() {
        let mut service = create_service();
        let reception = create_test_user(Some("recepcion"));
        let _ = service.create_doctor(&reception, &doctor_form());

        let admin = admin(&service);
        assert!(service.list_doctors(&admin).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_national_id_leaves_registry_unchanged() {
        let mut service = create_service();
        let admin = admin(&service);
        service
            .create_patient(&admin, &patient_form("30.111.222"))
            .unwrap();

        match service.create_patient(&admin, &patient_form("30111222")) {
            Err(ServiceError::Validation(errors)) => {
                assert_eq!(errors.get("national_id"), Some(DUPLICATE_NATIONAL_ID));
            }
            other => panic!("Duplicate national ID should be refused, got {other:?}"),
        }
        assert_eq!(service.list_patients(&admin).unwrap().len(), 1);
    }

    #[test]
    fn test_patient_with_unknown_provider() {
        let mut service = create_service();
        let admin = admin(&service);
        let form = PatientForm {
            insurance_provider: "7".to_string(),
            ..patient_form("30111222")
        };

        let err = service.create_patient(&admin, &form).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref e) if e.contains("insurance_provider")));
        assert!(service.list_patients(&admin).unwrap().is_empty());
    }

    #[test]
    fn test_appointment_defaults_to_doctor_specialty() {
        let mut service = create_service();
        let admin = admin(&service);
        let doctor = service.create_doctor(&admin, &doctor_form()).unwrap();
        let patient = service
            .create_patient(&admin, &patient_form("30111222"))
            .unwrap();

        let booked = service
            .create_appointment(
                &admin,
                &appointment_form(patient.id, doctor.id, "2024-05-01T09:00", "100", true),
            )
            .unwrap();
        assert_eq!(booked.specialty, "Diagnostics");

        let form = AppointmentForm {
            specialty: "Nephrology".to_string(),
            ..appointment_form(patient.id, doctor.id, "2024-05-01T10:00", "100", true)
        };
        let booked = service.create_appointment(&admin, &form).unwrap();
        assert_eq!(booked.specialty, "Nephrology");
    }

    #[test]
    fn test_appointment_with_unknown_references() {
        let mut service = create_service();
        let admin = admin(&service);

        let err = service
            .create_appointment(
                &admin,
                &appointment_form(PatientID::new(3), DoctorID::new(4), "2024-05-01T09:00", "1", false),
            )
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => {
                assert!(errors.contains("patient"));
                assert!(errors.contains("doctor"));
            }
            other => panic!("Unknown references should be refused, got {other:?}"),
        }
        assert!(service.list_appointments(&admin).unwrap().is_empty());
    }

    #[test]
    fn test_appointments_listed_most_recent_first() {
        let mut service = create_service();
        let admin = admin(&service);
        let doctor = service.create_doctor(&admin, &doctor_form()).unwrap();
        let patient = service
            .create_patient(&admin, &patient_form("30111222"))
            .unwrap();

        for datetime in ["2024-05-01T10:00", "2024-06-01T08:00", "2024-04-01T18:00", "2024-05-01T09:00"] {
            service
                .create_appointment(
                    &admin,
                    &appointment_form(patient.id, doctor.id, datetime, "10", false),
                )
                .unwrap();
        }

        let listed = service.list_appointments(&admin).unwrap();
        assert!(
            listed.windows(2).all(|w| w[0].datetime >= w[1].datetime),
            "Appointments should be ordered by datetime descending: {listed:?}"
        );
    }

    #[test]
    fn test_daily_report() {
        let mut service = create_service();
        let admin = admin(&service);
        let doctor = service.create_doctor(&admin, &doctor_form()).unwrap();
        let patient = service
            .create_patient(&admin, &patient_form("30111222"))
            .unwrap();

        for (datetime, price, paid) in [
            ("2024-05-01T09:00", "100", true),
            ("2024-05-01T23:59", "50", false),
            ("2024-05-02T00:01", "200", true),
        ] {
            service
                .create_appointment(
                    &admin,
                    &appointment_form(patient.id, doctor.id, datetime, price, paid),
                )
                .unwrap();
        }

        let report = service
            .daily_report(&admin, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .unwrap();
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[0].price.to_string(), "100.00");
        assert_eq!(report.rows[1].price.to_string(), "50.00");
        assert_eq!(report.total_paid.to_string(), "100.00");
    }

    #[test]
    fn test_restricted_deletes() {
        let mut service = create_service();
        let admin = admin(&service);
        let provider = service
            .create_insurance_provider(
                &admin,
                &InsuranceProviderForm {
                    name: "OSDE".to_string(),
                },
            )
            .unwrap();
        let doctor = service.create_doctor(&admin, &doctor_form()).unwrap();
        let patient = service
            .create_patient(
                &admin,
                &PatientForm {
                    insurance_provider: provider.id.to_string(),
                    ..patient_form("30111222")
                },
            )
            .unwrap();
        service
            .create_appointment(
                &admin,
                &appointment_form(patient.id, doctor.id, "2024-05-01T09:00", "10", false),
            )
            .unwrap();

        assert!(matches!(
            service.delete_doctor(&admin, doctor.id),
            Err(ServiceError::InUse { entity: "doctor", .. })
        ));
        assert!(matches!(
            service.delete_patient(&admin, patient.id),
            Err(ServiceError::InUse { entity: "patient", .. })
        ));
        assert!(matches!(
            service.delete_insurance_provider(&admin, provider.id),
            Err(ServiceError::InUse { .. })
        ));
        assert!(matches!(
            service.delete_doctor(&admin, DoctorID::new(99)),
            Err(ServiceError::NotFound { entity: "doctor", id: 99 })
        ));

        let idle = service.create_doctor(&admin, &doctor_form()).unwrap();
        service.delete_doctor(&admin, idle.id).unwrap();
        assert_eq!(service.list_doctors(&admin).unwrap(), vec![doctor]);
    }

    #[test]
    fn test_user_lifecycle() {
        let mut service = create_service();
        let admin = admin(&service);
        let reception_role = service
            .list_roles(&admin)
            .unwrap()
            .into_iter()
            .find(|role| role.name == "recepcion")
            .unwrap();

        let form = UserForm {
            username: "reception".to_string(),
            password: "frontdesk".to_string(),
            full_name: "Front Desk".to_string(),
            role: reception_role.id.to_string(),
        };
        let created = service.create_user(&admin, &form).unwrap();
        assert_eq!(created.role.as_ref().map(|r| r.name.as_str()), Some("recepcion"));

        let err = service.create_user(&admin, &form).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ref e) if e.contains("username")));

        let update = UserForm {
            password: String::new(),
            full_name: "Reception Desk".to_string(),
            role: "none".to_string(),
            ..form
        };
        let updated = service.update_user(&admin, created.id, &update).unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Reception Desk"));
        assert_eq!(updated.role, None);

        let logged_in = service.login("reception", "frontdesk").unwrap();
        assert!(service.granted(&logged_in).is_empty());
    }

    #[test]
    fn test_delete_user_removes_exactly_that_row() {
        let mut service = create_service();
        let admin = admin(&service);
        let form = UserForm {
            username: "reception".to_string(),
            password: "frontdesk".to_string(),
            full_name: "Front Desk".to_string(),
            role: "none".to_string(),
        };
        let created = service.create_user(&admin, &form).unwrap();
        assert_eq!(service.list_users(&admin).unwrap().len(), 2);

        service.delete_user(&admin, created.id).unwrap();
        let remaining: Vec<UserID> = service
            .list_users(&admin)
            .unwrap()
            .iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(remaining, vec![admin.id]);

        assert!(matches!(
            service.delete_user(&admin, created.id),
            Err(ServiceError::NotFound { entity: "user", .. })
        ));
        assert_eq!(service.list_users(&admin).unwrap().len(), 1);
    }
}
