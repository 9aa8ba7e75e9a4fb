use std::cmp::Ordering;
use talkwire_core::SessionId;

/// Total order on session ids used for the mesh offer tie-break.
///
/// Two ids that both parse as unsigned integers compare numerically, with a
/// byte-wise comparison separating spellings of the same number ("01", "1").
/// Anything else compares byte-wise.
pub fn compare_session_ids(a: &SessionId, b: &SessionId) -> Ordering {
    match (a.as_str().parse::<u128>(), b.as_str().parse::<u128>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.as_str().cmp(b.as_str())),
        _ => a.as_str().as_bytes().cmp(b.as_str().as_bytes()),
    }
}

/// Whether `local` sends the offer to `remote` in a mesh call.
///
/// The higher id offers, the lower one waits. Exactly one of
/// `is_offerer(a, b)` and `is_offerer(b, a)` holds for distinct ids; for
/// equal ids neither side offers.
pub fn is_offerer(local: &SessionId, remote: &SessionId) -> bool {
    compare_session_ids(local, remote) == Ordering::Greater
}
