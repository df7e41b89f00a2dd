//! Routes reachable without a session: entry point, login and logout.

use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use log::{info, warn};
use serde_json::json;
use tower_sessions::Session;

use crate::backend::flash;
use crate::backend::middlewares::USER_ID_KEY;
use crate::backend::responses::{internal_session_error, DASHBOARD, LOGIN};
use crate::backend::SharedState;
use crate::forms::LoginForm;
use crate::models::UserID;
use crate::services::{LoginError, Service};
use crate::utils::password_utils::off_thread;

async fn logged_in(session: &Session) -> bool {
    matches!(session.get::<UserID>(USER_ID_KEY).await, Ok(Some(_)))
}

/// `/` sends the user where they belong.
pub async fn index(session: Session) -> Redirect {
    if logged_in(&session).await {
        Redirect::to(DASHBOARD)
    } else {
        Redirect::to(LOGIN)
    }
}

pub async fn login_page(session: Session) -> Response {
    if logged_in(&session).await {
        return Redirect::to(DASHBOARD).into_response();
    }

    let messages = flash::take(&session).await;
    Json(json!({
        "fields": ["username", "password"],
        "messages": messages,
    }))
    .into_response()
}

pub async fn login(
    State(state): State<SharedState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Response {
    let candidate = state.service().login_candidate(&form.username);
    let result = match candidate {
        Ok(candidate) => {
            let LoginForm { username, password } = form;
            off_thread(move || Service::authenticate(candidate, &username, &password))
                .await
                .map_err(LoginError::from)
                .and_then(|authenticated| authenticated)
        }
        Err(e) => Err(e),
    };
    let user = match result {
        Ok(user) => user,
        Err(e) => return e.into_response(),
    };

    // New session id on privilege change
    if let Err(e) = session.cycle_id().await {
        return internal_session_error(e);
    }
    if let Err(e) = session.insert(USER_ID_KEY, user.id).await {
        return internal_session_error(e);
    }

    flash::push(&session, format!("Welcome, {}", user.display_name())).await;
    Redirect::to(DASHBOARD).into_response()
}

pub async fn logout(session: Session) -> Redirect {
    if let Ok(Some(user_id)) = session.get::<UserID>(USER_ID_KEY).await {
        info!("User {user_id} logged out");
    }
    if let Err(e) = session.flush().await {
        warn!("Cannot flush session: {e}");
    }
    Redirect::to(LOGIN)
}
