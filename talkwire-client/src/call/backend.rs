use crate::error::BackendError;
use async_trait::async_trait;
use talkwire_core::{InCallFlags, SessionId};

/// The room backend that admits the local participant to the call.
#[async_trait]
pub trait CallBackend: Send + Sync {
    /// Asks to join the call with the given flags. Returns the session id to
    /// use for this attempt if the backend assigns a new one.
    async fn join_call(&self, flags: InCallFlags) -> Result<Option<SessionId>, BackendError>;

    async fn leave_call(&self) -> Result<(), BackendError>;
}
