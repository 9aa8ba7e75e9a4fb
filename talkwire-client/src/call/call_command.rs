use crate::peer::LocalMedia;

/// Requests from the UI to the call session.
#[derive(Debug, Clone, PartialEq)]
pub enum CallCommand {
    Hangup,
    /// Retry after the ringing timeout.
    Retry,
    SetLocalMedia(LocalMedia),
    RaiseHand(bool),
}
