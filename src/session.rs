use tracing::warn;

use crate::storage::SessionStorage;
use crate::typedid::{TypedId, TypedIdMarker};

pub const SESSION_ID_KEY: &str = "insight_session_id";
pub const SESSION_ACTIVE_KEY: &str = "insight_rotation_active";

pub type SessionId = TypedId<Session>;

#[derive(Clone, Debug)]
pub struct Session;

impl TypedIdMarker for Session {
    fn tag() -> &'static str {
        "SSN"
    }
}

/// Returns the id of the session that owns `storage`, creating and
/// persisting one on first access.
///
/// A stored value that does not parse is replaced, which orphans any
/// records written under it. Takes the scope lock, so it must not be
/// called while holding it.
#[tracing::instrument(skip(storage))]
pub async fn current_session_id(storage: &dyn SessionStorage) -> SessionId {
    let _guard = storage.scope_lock().lock().await;

    match storage.get_item(SESSION_ID_KEY).await {
        Ok(Some(value)) => match value.parse() {
            Ok(session_id) => return session_id,
            Err(err) => warn!("discarding unreadable session id {:?}: {}", value, err),
        },
        Ok(None) => {}
        Err(err) => warn!("failed to read session id: {}", err),
    }

    let session_id = SessionId::new();
    if let Err(err) = storage
        .set_item(SESSION_ID_KEY, &session_id.to_string())
        .await
    {
        warn!("failed to persist session id: {}", err);
    }

    session_id
}

#[tracing::instrument(skip(storage))]
pub async fn is_session_active(storage: &dyn SessionStorage) -> bool {
    match storage.get_item(SESSION_ACTIVE_KEY).await {
        Ok(value) => value.as_deref() == Some("true"),
        Err(err) => {
            warn!("failed to read session active flag: {}", err);
            false
        }
    }
}

#[tracing::instrument(skip(storage))]
pub async fn mark_session_active(storage: &dyn SessionStorage) {
    if let Err(err) = storage.set_item(SESSION_ACTIVE_KEY, "true").await {
        warn!("failed to set session active flag: {}", err);
    }
}
