//! Daily billing report and its CSV export.

use std::io;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use thiserror::Error;

use crate::utils::input_validation::Price;

const CSV_HEADER: [&str; 7] = [
    "Date",
    "Patient",
    "Doctor",
    "Specialty",
    "Price",
    "Insurance Provider",
    "Paid",
];

const CSV_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cannot write the export: {0}")]
    Io(#[from] io::Error),
}

/// One appointment of the day, with names resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRow {
    pub datetime: NaiveDateTime,
    /// `Last, First`
    pub patient: String,
    /// `Last, First`
    pub doctor: String,
    pub specialty: String,
    pub price: Price,
    pub insurance_provider: Option<String>,
    pub paid: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyReport {
    pub date: NaiveDate,
    pub rows: Vec<ReportRow>,
    /// Sum of the price of the paid appointments.
    pub total_paid: Price,
}

/// `[start of day, start of next day)`
pub fn day_bounds(date: NaiveDate) -> (NaiveDateTime, NaiveDateTime) {
    let start = date.and_time(NaiveTime::MIN);
    let end = date
        .succ_opt()
        .map(|next| next.and_time(NaiveTime::MIN))
        .unwrap_or(NaiveDateTime::MAX);
    (start, end)
}

impl DailyReport {
    pub fn new(date: NaiveDate, rows: Vec<ReportRow>) -> Self {
        let total_paid = rows.iter().filter(|row| row.paid).map(|row| row.price).sum();
        Self {
            date,
            rows,
            total_paid,
        }
    }

    /// `Appointments_<DD-MM-YYYY>.csv`
    pub fn filename(&self) -> String {
        format!("Appointments_{}.csv", self.date.format("%d-%m-%Y"))
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, ReportError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(CSV_HEADER)?;

        for row in &self.rows {
            writer.write_record([
                row.datetime.format(CSV_DATE_FORMAT).to_string(),
                row.patient.clone(),
                row.doctor.clone(),
                row.specialty.clone(),
                row.price.to_string(),
                row.insurance_provider
                    .clone()
                    .unwrap_or_else(|| "None".to_string()),
                if row.paid { "Yes" } else { "No" }.to_string(),
            ])?;
        }

        writer.flush()?;
        writer
            .into_inner()
            .map_err(|e| ReportError::Io(io::Error::new(e.error().kind(), e.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(datetime: &str, price: &str, paid: bool, provider: Option<&str>) -> ReportRow {
        ReportRow {
            datetime: NaiveDateTime::parse_from_str(datetime, "%Y-%m-%dT%H:%M").unwrap(),
            patient: "Pérez, Ana".to_string(),
            doctor: "House, Gregory".to_string(),
            specialty: "Diagnostics".to_string(),
            price: price.parse().unwrap(),
            insurance_provider: provider.map(str::to_owned),
            paid,
        }
    }

    fn may_first() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[test]
    fn test_total_counts_paid_rows_only() {
        let report = DailyReport::new(
            may_first(),
            vec![
                row("2024-05-01T09:00", "100", true, None),
                row("2024-05-01T23:59", "50", false, Some("OSDE")),
            ],
        );
        assert_eq!(report.total_paid.to_string(), "100.00");
    }

    #[test]
    fn test_day_bounds() {
        let (start, end) = day_bounds(may_first());
        assert_eq!(start.to_string(), "2024-05-01 00:00:00");
        assert_eq!(end.to_string(), "2024-05-02 00:00:00");
    }

    #[test]
    fn test_csv_export() {
        let report = DailyReport::new(
            may_first(),
            vec![
                row("2024-05-01T09:00", "100", true, None),
                row("2024-05-01T23:59", "50", false, Some("OSDE")),
            ],
        );
        assert_eq!(report.filename(), "Appointments_01-05-2024.csv");

        let csv = String::from_utf8(report.to_csv().unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Date,Patient,Doctor,Specialty,Price,Insurance Provider,Paid",
                "01/05/2024 09:00,\"Pérez, Ana\",\"House, Gregory\",Diagnostics,100.00,None,Yes",
                "01/05/2024 23:59,\"Pérez, Ana\",\"House, Gregory\",Diagnostics,50.00,OSDE,No",
            ]
        );
    }

    #[test]
    fn test_empty_day() {
        let report = DailyReport::new(may_first(), Vec::new());
        assert_eq!(report.total_paid, Price::ZERO);
        let csv = String::from_utf8(report.to_csv().unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }
}
