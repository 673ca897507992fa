//! Local duplicate detection: rows of one owner that hold the same photo.

use crate::model::{LocalId, LocalPhoto};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollapsePlan {
    /// Surviving rows, with any adopted remote refs already applied.
    pub kept: Vec<LocalPhoto>,
    pub removed: Vec<LocalPhoto>,
    /// Kept rows that take over the remote ref of a removed duplicate.
    pub adopted_refs: Vec<(LocalId, String)>,
}

/// Same owner and either the same file name or the same content fingerprint.
pub fn is_local_duplicate(a: &LocalPhoto, b: &LocalPhoto) -> bool {
    if a.owner_key != b.owner_key {
        return false;
    }
    if a.file_name == b.file_name {
        return true;
    }
    matches!(
        (&a.fingerprint, &b.fingerprint),
        (Some(left), Some(right)) if left == right
    )
}

/// Rows linked to two different remote records are both kept: dropping one
/// would orphan its remote record and the next pass would download it again.
fn refs_compatible(kept: &LocalPhoto, candidate: &LocalPhoto) -> bool {
    match (&kept.remote_ref, &candidate.remote_ref) {
        (Some(left), Some(right)) => left == right,
        _ => true,
    }
}

/// Keeps the earliest-created row of each duplicate group (ties by lower id).
pub fn plan_collapse(photos: &[LocalPhoto]) -> CollapsePlan {
    let mut ordered: Vec<&LocalPhoto> = photos.iter().collect();
    ordered.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

    let mut plan = CollapsePlan::default();
    for candidate in ordered {
        let target = plan
            .kept
            .iter_mut()
            .find(|kept| is_local_duplicate(kept, candidate) && refs_compatible(kept, candidate));
        match target {
            Some(kept) => {
                if kept.remote_ref.is_none()
                    && let Some(remote_ref) = &candidate.remote_ref
                {
                    kept.remote_ref = Some(remote_ref.clone());
                    plan.adopted_refs.push((kept.id, remote_ref.clone()));
                }
                plan.removed.push(candidate.clone());
            }
            None => plan.kept.push(candidate.clone()),
        }
    }
    plan
}
