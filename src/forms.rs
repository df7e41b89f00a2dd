//! Submitted forms and their validated counterparts.
//!
//! A form holds the raw strings exactly as submitted. `validate` checks every
//! field at once and either returns the typed value to store, or all the
//! field errors together. Checks that need the store (uniqueness, existence of
//! referenced rows) are done by the service.

use chrono::NaiveDateTime;
use serde::Deserialize;

use crate::models::{DoctorID, InsuranceProviderID, PatientID, RoleID};
use crate::utils::input_validation::{
    parse_checkbox, parse_datetime_local, parse_required_selection, parse_selection,
    password_validation, NationalId, Price, RequiredText, Username, ValidationErrors,
};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DoctorForm {
    pub first_name: String,
    pub last_name: String,
    pub specialty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDoctor {
    pub first_name: RequiredText,
    pub last_name: RequiredText,
    pub specialty: RequiredText,
}

impl DoctorForm {
    pub fn validate(&self) -> Result<NewDoctor, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let first_name = errors.check("first_name", RequiredText::new(&self.first_name));
        let last_name = errors.check("last_name", RequiredText::new(&self.last_name));
        let specialty = errors.check("specialty", RequiredText::new(&self.specialty));

        match (first_name, last_name, specialty) {
            (Some(first_name), Some(last_name), Some(specialty)) => Ok(NewDoctor {
                first_name,
                last_name,
                specialty,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InsuranceProviderForm {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInsuranceProvider {
    pub name: RequiredText,
}

impl InsuranceProviderForm {
    pub fn validate(&self) -> Result<NewInsuranceProvider, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        match errors.check("name", RequiredText::new(&self.name)) {
            Some(name) => Ok(NewInsuranceProvider { name }),
            None => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PatientForm {
    pub first_name: String,
    pub last_name: String,
    pub national_id: String,
    pub phone: String,
    pub address: String,
    /// Provider id, or `none`.
    pub insurance_provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPatient {
    pub first_name: RequiredText,
    pub last_name: RequiredText,
    pub national_id: NationalId,
    pub phone: Option<RequiredText>,
    pub address: Option<RequiredText>,
    pub insurance_provider: Option<InsuranceProviderID>,
}

impl PatientForm {
    pub fn validate(&self) -> Result<NewPatient, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let first_name = errors.check("first_name", RequiredText::new(&self.first_name));
        let last_name = errors.check("last_name", RequiredText::new(&self.last_name));
        let national_id = errors.check("national_id", NationalId::try_from(self.national_id.as_str()));
        let phone = errors.check("phone", RequiredText::optional(&self.phone));
        let address = errors.check("address", RequiredText::optional(&self.address));
        let insurance_provider =
            errors.check("insurance_provider", parse_selection(&self.insurance_provider));

        match (first_name, last_name, national_id, phone, address, insurance_provider) {
            (
                Some(first_name),
                Some(last_name),
                Some(national_id),
                Some(phone),
                Some(address),
                Some(insurance_provider),
            ) => Ok(NewPatient {
                first_name,
                last_name,
                national_id,
                phone,
                address,
                insurance_provider: insurance_provider.map(InsuranceProviderID::new),
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppointmentForm {
    /// `datetime-local` value, e.g. `2024-05-01T09:30`.
    pub datetime: String,
    pub patient: String,
    pub doctor: String,
    /// Blank means the doctor's specialty.
    pub specialty: String,
    pub price: String,
    pub uses_insurance: Option<String>,
    pub insurance_provider: String,
    pub paid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub datetime: NaiveDateTime,
    pub patient: PatientID,
    pub doctor: DoctorID,
    pub specialty: Option<RequiredText>,
    pub price: Price,
    pub uses_insurance: bool,
    pub insurance_provider: Option<InsuranceProviderID>,
    pub paid: bool,
}

impl AppointmentForm {
    pub fn validate(&self) -> Result<NewAppointment, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let datetime = errors.check("datetime", parse_datetime_local(&self.datetime));
        let patient = errors.check("patient", parse_required_selection(&self.patient));
        let doctor = errors.check("doctor", parse_required_selection(&self.doctor));
        let specialty = errors.check("specialty", RequiredText::optional(&self.specialty));
        let price = errors.check("price", self.price.parse::<Price>());
        let insurance_provider =
            errors.check("insurance_provider", parse_selection(&self.insurance_provider));

        match (datetime, patient, doctor, specialty, price, insurance_provider) {
            (
                Some(datetime),
                Some(patient),
                Some(doctor),
                Some(specialty),
                Some(price),
                Some(insurance_provider),
            ) => Ok(NewAppointment {
                datetime,
                patient: PatientID::new(patient),
                doctor: DoctorID::new(doctor),
                specialty,
                price,
                uses_insurance: parse_checkbox(self.uses_insurance.as_deref()),
                insurance_provider: insurance_provider.map(InsuranceProviderID::new),
                paid: parse_checkbox(self.paid.as_deref()),
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserForm {
    pub username: String,
    /// Required on creation. Left blank on update, the password is kept.
    pub password: String,
    pub full_name: String,
    /// Role id, or `none`.
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: Username,
    pub password: Option<String>,
    pub full_name: RequiredText,
    pub role: Option<RoleID>,
}

impl UserForm {
    pub fn validate_for_create(&self) -> Result<NewUser, ValidationErrors> {
        self.validate(true)
    }

    pub fn validate_for_update(&self) -> Result<NewUser, ValidationErrors> {
        self.validate(false)
    }

    fn validate(&self, password_required: bool) -> Result<NewUser, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let username = errors.check("username", Username::try_from(self.username.as_str()));
        let full_name = errors.check("full_name", RequiredText::new(&self.full_name));
        let role = errors.check("role", parse_selection(&self.role));

        let password = if password_required || !self.password.is_empty() {
            errors
                .check("password", password_validation(&self.password))
                .map(|()| Some(self.password.clone()))
        } else {
            Some(None)
        };

        match (username, full_name, role, password) {
            (Some(username), Some(full_name), Some(role), Some(password)) => Ok(NewUser {
                username,
                password,
                full_name,
                role: role.map(RoleID::new),
            }),
            _ => Err(errors),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appointment_form() -> AppointmentForm {
        AppointmentForm {
            datetime: "2024-05-01T09:00".to_string(),
            patient: "1".to_string(),
            doctor: "2".to_string(),
            specialty: String::new(),
            price: "100".to_string(),
            uses_insurance: Some("on".to_string()),
            insurance_provider: "none".to_string(),
            paid: None,
        }
    }

    #[test]
    fn test_doctor_form_reports_every_missing_field() {
        let errors = DoctorForm::default().validate().unwrap_err();
        assert!(errors.contains("first_name"));
        assert!(errors.contains("last_name"));
        assert!(errors.contains("specialty"));
    }

    #[test]
    fn test_patient_form_none_provider() {
        let form = PatientForm {
            first_name: "Ana".to_string(),
            last_name: "Pérez".to_string(),
            national_id: "30.111.222".to_string(),
            insurance_provider: "none".to_string(),
            ..Default::default()
        };
        let patient = form.validate().unwrap();
        assert_eq!(patient.insurance_provider, None);
        assert_eq!(patient.phone, None);
        assert_eq!(patient.national_id.as_ref(), "30111222");
    }

    #[test]
    fn test_appointment_form() {
        let appointment = appointment_form().validate().unwrap();
        assert_eq!(appointment.patient, PatientID::new(1));
        assert_eq!(appointment.doctor, DoctorID::new(2));
        assert_eq!(appointment.price.cents(), 10_000);
        assert_eq!(appointment.specialty, None);
        assert!(appointment.uses_insurance);
        assert!(!appointment.paid);
    }

    #[test]
    fn test_appointment_form_rejects_bad_price_and_date() {
        let form = AppointmentForm {
            datetime: "tomorrow".to_string(),
            price: "-5".to_string(),
            ..appointment_form()
        };
        let errors = form.validate().unwrap_err();
        assert!(errors.contains("datetime"));
        assert!(errors.contains("price"));
        assert!(!errors.contains("patient"));
    }

    #[test]
    fn test_user_form_password_rules() {
        let form = UserForm {
            username: "reception".to_string(),
            password: String::new(),
            full_name: "Front Desk".to_string(),
            role: "2".to_string(),
        };

        let errors = form.validate_for_create().unwrap_err();
        assert!(errors.contains("password"));

        let update = form.validate_for_update().unwrap();
        assert_eq!(update.password, None);
        assert_eq!(update.role, Some(RoleID::new(2)));
    }
}
