//! One-shot messages kept in the session until the next page shows them.

use log::warn;
use tower_sessions::Session;

const FLASH_KEY: &str = "flash";

/// Queues a message for the next page.
pub async fn push(session: &Session, message: impl Into<String>) {
    let mut messages = match session.get::<Vec<String>>(FLASH_KEY).await {
        Ok(messages) => messages.unwrap_or_default(),
        Err(e) => {
            warn!("Cannot read flash messages: {e}");
            Vec::new()
        }
    };
    messages.push(message.into());

    if let Err(e) = session.insert(FLASH_KEY, messages).await {
        warn!("Cannot store flash message: {e}");
    }
}

/// Returns the pending messages and forgets them.
pub async fn take(session: &Session) -> Vec<String> {
    match session.remove::<Vec<String>>(FLASH_KEY).await {
        Ok(messages) => messages.unwrap_or_default(),
        Err(e) => {
            warn!("Cannot read flash messages: {e}");
            Vec::new()
        }
    }
}
