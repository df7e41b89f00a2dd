//! Doctors, insurance providers and patients.

use rusqlite::{params, OptionalExtension, Row};

use super::{DBError, Database};
use crate::forms::{NewDoctor, NewInsuranceProvider, NewPatient};
use crate::models::{Doctor, DoctorID, InsuranceProvider, InsuranceProviderID, Patient, PatientID};

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        specialty: row.get(3)?,
    })
}

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<InsuranceProvider> {
    Ok(InsuranceProvider {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

fn patient_from_row(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        national_id: row.get(3)?,
        phone: row.get(4)?,
        address: row.get(5)?,
        insurance_provider: row.get(6)?,
    })
}

const PATIENT_COLUMNS: &str =
    "id, first_name, last_name, national_id, phone, address, insurance_provider_id";

impl Database {
    pub fn insert_doctor(&self, doctor: &NewDoctor) -> Result<Doctor, DBError> {
        self.conn.execute(
            "INSERT INTO doctors (first_name, last_name, specialty) VALUES (?1, ?2, ?3)",
            params![
                doctor.first_name.as_str(),
                doctor.last_name.as_str(),
                doctor.specialty.as_str()
            ],
        )?;

        Ok(Doctor {
            id: DoctorID::new(self.conn.last_insert_rowid()),
            first_name: doctor.first_name.to_string(),
            last_name: doctor.last_name.to_string(),
            specialty: doctor.specialty.to_string(),
        })
    }

    pub fn list_doctors(&self) -> Result<Vec<Doctor>, DBError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, first_name, last_name, specialty FROM doctors ORDER BY id")?;
        let doctors = stmt
            .query_map([], doctor_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(doctors)
    }

    pub fn get_doctor(&self, id: DoctorID) -> Result<Option<Doctor>, DBError> {
        let doctor = self
            .conn
            .query_row(
                "SELECT id, first_name, last_name, specialty FROM doctors WHERE id = ?1",
                params![id],
                doctor_from_row,
            )
            .optional()?;
        Ok(doctor)
    }

    pub fn doctor_in_use(&self, id: DoctorID) -> Result<bool, DBError> {
        self.exists("SELECT 1 FROM appointments WHERE doctor_id = ?1", id)
    }

    /// Returns `false` when no doctor has this id.
    pub fn delete_doctor(&self, id: DoctorID) -> Result<bool, DBError> {
        let deleted = self
            .conn
            .execute("DELETE FROM doctors WHERE id = ?1", params![id])?;
        Ok(deleted == 1)
    }

    pub fn insert_insurance_provider(
        &self,
        provider: &NewInsuranceProvider,
    ) -> Result<InsuranceProvider, DBError> {
        self.conn.execute(
            "INSERT INTO insurance_providers (name) VALUES (?1)",
            params![provider.name.as_str()],
        )?;

        Ok(InsuranceProvider {
            id: InsuranceProviderID::new(self.conn.last_insert_rowid()),
            name: provider.name.to_string(),
        })
    }

    pub fn list_insurance_providers(&self) -> Result<Vec<InsuranceProvider>, DBError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name FROM insurance_providers ORDER BY id")?;
        let providers = stmt
            .query_map([], provider_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(providers)
    }

    pub fn get_insurance_provider(
        &self,
        id: InsuranceProviderID,
    ) -> Result<Option<InsuranceProvider>, DBError> {
        let provider = self
            .conn
            .query_row(
                "SELECT id, name FROM insurance_providers WHERE id = ?1",
                params![id],
                provider_from_row,
            )
            .optional()?;
        Ok(provider)
    }

    /// A provider is in use while a patient or an appointment points at it.
    pub fn insurance_provider_in_use(&self, id: InsuranceProviderID) -> Result<bool, DBError> {
        Ok(self.exists("SELECT 1 FROM patients WHERE insurance_provider_id = ?1", id)?
            || self.exists(
                "SELECT 1 FROM appointments WHERE insurance_provider_id = ?1",
                id,
            )?)
    }

    pub fn delete_insurance_provider(&self, id: InsuranceProviderID) -> Result<bool, DBError> {
        let deleted = self
            .conn
            .execute("DELETE FROM insurance_providers WHERE id = ?1", params![id])?;
        Ok(deleted == 1)
    }

    pub fn insert_patient(&self, patient: &NewPatient) -> Result<Patient, DBError> {
        let phone = patient.phone.as_ref().map(|p| p.as_str());
        let address = patient.address.as_ref().map(|a| a.as_str());
        let national_id: &str = patient.national_id.as_ref();

        self.conn.execute(
            "INSERT INTO patients
                (first_name, last_name, national_id, phone, address, insurance_provider_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                patient.first_name.as_str(),
                patient.last_name.as_str(),
                national_id,
                phone,
                address,
                patient.insurance_provider,
            ],
        )?;

        Ok(Patient {
            id: PatientID::new(self.conn.last_insert_rowid()),
            first_name: patient.first_name.to_string(),
            last_name: patient.last_name.to_string(),
            national_id: national_id.to_owned(),
            phone: phone.map(str::to_owned),
            address: address.map(str::to_owned),
            insurance_provider: patient.insurance_provider,
        })
    }

    pub fn list_patients(&self) -> Result<Vec<Patient>, DBError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PATIENT_COLUMNS} FROM patients ORDER BY id"))?;
        let patients = stmt
            .query_map([], patient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(patients)
    }

    pub fn get_patient(&self, id: PatientID) -> Result<Option<Patient>, DBError> {
        let patient = self
            .conn
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
                params![id],
                patient_from_row,
            )
            .optional()?;
        Ok(patient)
    }

    pub fn national_id_exists(&self, national_id: &str) -> Result<bool, DBError> {
        self.exists("SELECT 1 FROM patients WHERE national_id = ?1", national_id)
    }

    pub fn patient_in_use(&self, id: PatientID) -> Result<bool, DBError> {
        self.exists("SELECT 1 FROM appointments WHERE patient_id = ?1", id)
    }

    pub fn delete_patient(&self, id: PatientID) -> Result<bool, DBError> {
        let deleted = self
            .conn
            .execute("DELETE FROM patients WHERE id = ?1", params![id])?;
        Ok(deleted == 1)
    }

    fn exists(&self, query: &str, key: impl rusqlite::ToSql) -> Result<bool, DBError> {
        let found = self
            .conn
            .query_row(query, params![key], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::test_db;
    use crate::forms::{DoctorForm, InsuranceProviderForm, PatientForm};

    #[test]
    fn test_doctors_listed_in_insertion_order() {
        let db = test_db();
        for (first, last) in [("Gregory", "House"), ("Lisa", "Cuddy"), ("James", "Wilson")] {
            let form = DoctorForm {
                first_name: first.to_string(),
                last_name: last.to_string(),
                specialty: "Medicine".to_string(),
            };
            db.insert_doctor(&form.validate().unwrap()).unwrap();
        }

        let names: Vec<String> = db
            .list_doctors()
            .unwrap()
            .iter()
            .map(|d| d.display_name())
            .collect();
        assert_eq!(names, vec!["House, Gregory", "Cuddy, Lisa", "Wilson, James"]);
    }

    #[test]
    fn test_duplicate_national_id_is_a_unique_violation() {
        let db = test_db();
        let form = PatientForm {
            first_name: "Ana".to_string(),
            last_name: "Pérez".to_string(),
            national_id: "30111222".to_string(),
            ..Default::default()
        };
        db.insert_patient(&form.validate().unwrap()).unwrap();
        assert!(db.national_id_exists("30111222").unwrap());

        let err = db.insert_patient(&form.validate().unwrap()).unwrap_err();
        assert!(err.is_unique_violation());
        assert_eq!(db.list_patients().unwrap().len(), 1);
    }

    #[test]
    fn test_provider_in_use_by_patient() {
        let db = test_db();
        let provider = db
            .insert_insurance_provider(
                &InsuranceProviderForm {
                    name: "OSDE".to_string(),
                }
                .validate()
                .unwrap(),
            )
            .unwrap();
        assert!(!db.insurance_provider_in_use(provider.id).unwrap());

        let form = PatientForm {
            first_name: "Juan".to_string(),
            last_name: "Gómez".to_string(),
            national_id: "20999888".to_string(),
            insurance_provider: provider.id.to_string(),
            ..Default::default()
        };
        let patient = db.insert_patient(&form.validate().unwrap()).unwrap();
        assert_eq!(
            db.get_patient(patient.id).unwrap().unwrap().insurance_provider,
            Some(provider.id)
        );

        assert!(db.insurance_provider_in_use(provider.id).unwrap());
        let err = db.delete_insurance_provider(provider.id).unwrap_err();
        assert!(err.is_foreign_key_violation(), "unexpected error: {err}");
        assert!(db.get_insurance_provider(provider.id).unwrap().is_some());
    }
}
