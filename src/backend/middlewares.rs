//! Session check for the routes that need a logged-in user.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::response::Redirect;
use log::{error, warn};
use tower_sessions::Session;

use crate::backend::SharedState;
use crate::models::{CurrentUser, UserID};

/// Session key holding the id of the logged-in user.
pub const USER_ID_KEY: &str = "user_id";

/// The user of the request, reloaded from the store.
/// Without a valid session the request is redirected to the login page.
pub struct SessionUser(pub CurrentUser);

#[async_trait::async_trait]
impl FromRequestParts<SharedState> for SessionUser {
    type Rejection = Redirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let to_login = Redirect::to("/login");

        let Some(session) = parts.extensions.get::<Session>() else {
            error!("Session layer missing");
            return Err(to_login);
        };

        let user_id = match session.get::<UserID>(USER_ID_KEY).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => return Err(to_login),
            Err(e) => {
                warn!("Unreadable session: {e}");
                return Err(to_login);
            }
        };

        let user = state.service().current_user(user_id);
        match user {
            Ok(Some(user)) => Ok(SessionUser(user)),
            Ok(None) => {
                warn!("Session points to deleted user {user_id}");
                Err(to_login)
            }
            Err(e) => {
                error!("Cannot load user {user_id}: {e}");
                Err(to_login)
            }
        }
    }
}
