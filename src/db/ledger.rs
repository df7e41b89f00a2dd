//! The appointment ledger.

use chrono::NaiveDateTime;
use rusqlite::{params, OptionalExtension, Row};

use super::{DBError, Database};
use crate::forms::NewAppointment;
use crate::models::{Appointment, AppointmentID};
use crate::report::ReportRow;

const APPOINTMENT_COLUMNS: &str = "id, datetime, patient_id, doctor_id, specialty, price_cents,
     uses_insurance, insurance_provider_id, paid";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        datetime: row.get(1)?,
        patient: row.get(2)?,
        doctor: row.get(3)?,
        specialty: row.get(4)?,
        price: row.get(5)?,
        uses_insurance: row.get(6)?,
        insurance_provider: row.get(7)?,
        paid: row.get(8)?,
    })
}

impl Database {
    /// Records an appointment. `specialty` is the one actually booked, already
    /// resolved against the doctor.
    pub fn insert_appointment(
        &self,
        appointment: &NewAppointment,
        specialty: &str,
    ) -> Result<Appointment, DBError> {
        self.conn.execute(
            "INSERT INTO appointments
                (datetime, patient_id, doctor_id, specialty, price_cents,
                 uses_insurance, insurance_provider_id, paid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                appointment.datetime,
                appointment.patient,
                appointment.doctor,
                specialty,
                appointment.price,
                appointment.uses_insurance,
                appointment.insurance_provider,
                appointment.paid,
            ],
        )?;

        Ok(Appointment {
            id: AppointmentID::new(self.conn.last_insert_rowid()),
            datetime: appointment.datetime,
            patient: appointment.patient,
            doctor: appointment.doctor,
            specialty: specialty.to_owned(),
            price: appointment.price,
            uses_insurance: appointment.uses_insurance,
            insurance_provider: appointment.insurance_provider,
            paid: appointment.paid,
        })
    }

    /// Most recent first.
    pub fn list_appointments(&self) -> Result<Vec<Appointment>, DBError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointments ORDER BY datetime DESC, id DESC"
        ))?;
        let appointments = stmt
            .query_map([], appointment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(appointments)
    }

    pub fn get_appointment(&self, id: AppointmentID) -> Result<Option<Appointment>, DBError> {
        let appointment = self
            .conn
            .query_row(
                &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
                params![id],
                appointment_from_row,
            )
            .optional()?;
        Ok(appointment)
    }

    /// Appointments with `start <= datetime < end`, in chronological order,
    /// joined with the names of everyone involved.
    pub fn report_rows(
        &self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<ReportRow>, DBError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.datetime,
                    p.last_name || ', ' || p.first_name,
                    d.last_name || ', ' || d.first_name,
                    a.specialty, a.price_cents, ip.name, a.paid
             FROM appointments a
             JOIN patients p ON p.id = a.patient_id
             JOIN doctors d ON d.id = a.doctor_id
             LEFT JOIN insurance_providers ip ON ip.id = a.insurance_provider_id
             WHERE a.datetime >= ?1 AND a.datetime < ?2
             ORDER BY a.datetime ASC, a.id ASC",
        )?;
        let rows = stmt
            .query_map(params![start, end], |row| {
                Ok(ReportRow {
                    datetime: row.get(0)?,
                    patient: row.get(1)?,
                    doctor: row.get(2)?,
                    specialty: row.get(3)?,
                    price: row.get(4)?,
                    insurance_provider: row.get(5)?,
                    paid: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
