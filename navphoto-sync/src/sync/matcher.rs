//! Decides whether a local photo and a remote record are the same photo.
//!
//! The remote id only exists after first contact, so two authoritative keys
//! are tried first (the local `remote_ref` and the remote `back_ref`). Data
//! that predates id tracking falls back to owner + file name + a creation
//! time within [`HEURISTIC_WINDOW`]. Image bytes are never compared.

use time::Duration;

use crate::model::{LocalPhoto, RemoteRecord};

pub const HEURISTIC_WINDOW: Duration = Duration::seconds(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    RemoteRef,
    BackRef,
    Heuristic,
}

pub fn match_kind(local: &LocalPhoto, remote: &RemoteRecord) -> Option<MatchKind> {
    if local.remote_ref.as_deref() == Some(remote.remote_id.as_str()) {
        return Some(MatchKind::RemoteRef);
    }
    if remote.back_ref == Some(local.id) {
        return Some(MatchKind::BackRef);
    }
    if local.owner_key == remote.owner_key
        && local.file_name == remote.file_name
        && (local.created_at - remote.created_at).abs() < HEURISTIC_WINDOW
    {
        return Some(MatchKind::Heuristic);
    }
    None
}

pub fn matches(local: &LocalPhoto, remote: &RemoteRecord) -> bool {
    match_kind(local, remote).is_some()
}

pub fn has_remote_match(local: &LocalPhoto, remotes: &[RemoteRecord]) -> bool {
    remotes.iter().any(|remote| matches(local, remote))
}

pub fn has_local_match(remote: &RemoteRecord, locals: &[LocalPhoto]) -> bool {
    locals.iter().any(|local| matches(local, remote))
}

/// The remote counterpart of `local`, preferring an authoritative match over
/// a heuristic one.
pub fn find_remote_match<'a>(
    local: &LocalPhoto,
    remotes: &'a [RemoteRecord],
) -> Option<(&'a RemoteRecord, MatchKind)> {
    let mut heuristic = None;
    for remote in remotes {
        match match_kind(local, remote) {
            Some(MatchKind::Heuristic) => {
                heuristic.get_or_insert((remote, MatchKind::Heuristic));
            }
            Some(kind) => return Some((remote, kind)),
            None => {}
        }
    }
    heuristic
}
