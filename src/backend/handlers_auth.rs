//! Routes that need a logged-in user. Each one is gated by the service.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use chrono::{Local, NaiveDate};
use http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_sessions::Session;

use crate::backend::flash;
use crate::backend::middlewares::SessionUser;
use crate::backend::responses::{done, failure};
use crate::backend::SharedState;
use crate::forms::{AppointmentForm, DoctorForm, InsuranceProviderForm, PatientForm, UserForm};
use crate::models::{CurrentUser, DoctorID, InsuranceProviderID, PatientID, Permission, UserID};
use crate::report::DailyReport;
use crate::services::ServiceError;
use crate::utils::input_validation::{parse_date, ValidationErrors};
use crate::utils::password_utils::{hash, off_thread};

/// Answers a read with `{ key: value, messages: [...] }`.
async fn show<T: Serialize>(
    session: &Session,
    key: &str,
    result: Result<T, ServiceError>,
) -> Response {
    match result {
        Ok(value) => page(session, json!({ key: value })).await,
        Err(e) => failure(session, e).await,
    }
}

async fn page(session: &Session, mut body: Value) -> Response {
    body["messages"] = json!(flash::take(session).await);
    Json(body).into_response()
}

/// Answers a write: back to the listing on success.
async fn after_write<T>(
    session: &Session,
    result: Result<T, ServiceError>,
    message: &str,
    listing: &str,
) -> Response {
    match result {
        Ok(_) => done(session, message, listing).await,
        Err(e) => failure(session, e).await,
    }
}

pub async fn dashboard(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
) -> Response {
    let sections = state.service().granted(&user);
    page(
        &session,
        json!({
            "user": {
                "id": user.id,
                "username": user.username,
                "display_name": user.display_name(),
                "role": user.role,
            },
            "sections": sections,
        }),
    )
    .await
}

pub async fn list_doctors(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
) -> Response {
    let doctors = state.service().list_doctors(&user);
    show(&session, "doctors", doctors).await
}

pub async fn create_doctor(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Form(form): Form<DoctorForm>,
) -> Response {
    let created = state.service().create_doctor(&user, &form);
    after_write(&session, created, "Doctor added", "/doctors").await
}

pub async fn delete_doctor(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Path(id): Path<DoctorID>,
) -> Response {
    let deleted = state.service().delete_doctor(&user, id);
    after_write(&session, deleted, "Doctor deleted", "/doctors").await
}

pub async fn list_insurance_providers(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
) -> Response {
    let providers = state.service().list_insurance_providers(&user);
    show(&session, "insurance_providers", providers).await
}

pub async fn create_insurance_provider(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Form(form): Form<InsuranceProviderForm>,
) -> Response {
    let created = state.service().create_insurance_provider(&user, &form);
    after_write(
        &session,
        created,
        "Insurance provider added",
        "/insurance-providers",
    )
    .await
}

pub async fn delete_insurance_provider(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Path(id): Path<InsuranceProviderID>,
) -> Response {
    let deleted = state.service().delete_insurance_provider(&user, id);
    after_write(
        &session,
        deleted,
        "Insurance provider deleted",
        "/insurance-providers",
    )
    .await
}

pub async fn list_patients(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
) -> Response {
    let patients = state.service().list_patients(&user);
    show(&session, "patients", patients).await
}

pub async fn create_patient(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Form(form): Form<PatientForm>,
) -> Response {
    let created = state.service().create_patient(&user, &form);
    after_write(&session, created, "Patient added", "/patients").await
}

pub async fn delete_patient(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Path(id): Path<PatientID>,
) -> Response {
    let deleted = state.service().delete_patient(&user, id);
    after_write(&session, deleted, "Patient deleted", "/patients").await
}

pub async fn list_appointments(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
) -> Response {
    let appointments = state.service().list_appointments(&user);
    show(&session, "appointments", appointments).await
}

pub async fn create_appointment(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Form(form): Form<AppointmentForm>,
) -> Response {
    let created = state.service().create_appointment(&user, &form);
    after_write(&session, created, "Appointment booked", "/appointments").await
}

pub async fn list_users(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
) -> Response {
    let listing = {
        let service = state.service();
        service
            .list_users(&user)
            .and_then(|users| Ok(json!({ "users": users, "roles": service.list_roles(&user)? })))
    };
    match listing {
        Ok(body) => page(&session, body).await,
        Err(e) => failure(&session, e).await,
    }
}

pub async fn create_user(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Form(form): Form<UserForm>,
) -> Response {
    let checked = state.service().check_new_user(&user, &form);
    let new_user = match checked {
        Ok(new_user) => new_user,
        Err(e) => return failure(&session, e).await,
    };

    let password = new_user.password.clone().unwrap_or_default();
    let password = match off_thread(move || hash(&password)).await {
        Ok(Ok(password)) => password,
        Ok(Err(e)) | Err(e) => return failure(&session, e.into()).await,
    };

    let created = state.service().insert_new_user(&user, &new_user, &password);
    after_write(&session, created, "User created", "/users").await
}

pub async fn edit_user_page(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Path(id): Path<UserID>,
) -> Response {
    let edited = {
        let service = state.service();
        service
            .get_user(&user, id)
            .and_then(|edited| Ok(json!({ "user": edited, "roles": service.list_roles(&user)? })))
    };
    match edited {
        Ok(body) => page(&session, body).await,
        Err(e) => failure(&session, e).await,
    }
}

pub async fn update_user(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Path(id): Path<UserID>,
    Form(form): Form<UserForm>,
) -> Response {
    let checked = state.service().check_user_update(&user, id, &form);
    let changes = match checked {
        Ok(changes) => changes,
        Err(e) => return failure(&session, e).await,
    };

    // A blank password keeps the current hash
    let password = match changes.password.clone() {
        None => None,
        Some(password) => match off_thread(move || hash(&password)).await {
            Ok(Ok(password)) => Some(password),
            Ok(Err(e)) | Err(e) => return failure(&session, e.into()).await,
        },
    };

    let updated = state
        .service()
        .apply_user_update(&user, id, &changes, password.as_ref());
    after_write(&session, updated, "User updated", "/users").await
}

pub async fn delete_user(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Path(id): Path<UserID>,
) -> Response {
    let deleted = state.service().delete_user(&user, id);
    after_write(&session, deleted, "User deleted", "/users").await
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    /// `YYYY-MM-DD`, today when absent.
    pub date: Option<String>,
}

impl ReportQuery {
    fn date(&self) -> Result<NaiveDate, ServiceError> {
        match self.date.as_deref().map(str::trim) {
            None | Some("") => Ok(Local::now().date_naive()),
            Some(date) => parse_date(date)
                .map_err(|e| ValidationErrors::single("date", e.reason()).into()),
        }
    }
}

/// The gate runs before the date is read, so a refused user never sees
/// validation errors.
fn gated_report(
    state: &SharedState,
    user: &CurrentUser,
    query: &ReportQuery,
) -> Result<DailyReport, ServiceError> {
    let service = state.service();
    service.enforce(user, Permission::Statistics)?;
    service.daily_report(user, query.date()?)
}

pub async fn statistics(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Query(query): Query<ReportQuery>,
) -> Response {
    let report = gated_report(&state, &user, &query);
    show(&session, "report", report).await
}

pub async fn export_statistics(
    State(state): State<SharedState>,
    SessionUser(user): SessionUser,
    session: Session,
    Query(query): Query<ReportQuery>,
) -> Response {
    let report = gated_report(&state, &user, &query);
    let report = match report {
        Ok(report) => report,
        Err(e) => return failure(&session, e).await,
    };

    match report.to_csv() {
        Ok(csv) => (
            [
                (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", report.filename()),
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}
