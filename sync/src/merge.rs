//! Last-writer-wins merge of a local and a remote collection of one kind.
//!
//! For a key present on both sides:
//! 1. A tombstone beats a live copy only when the deletion is newer than the
//!    live copy's last modification. Otherwise the live copy is restored.
//! 2. Between two tombstones the later deletion wins.
//! 3. Higher `_version` wins, then the later `_lastModified`.
//! 4. On a full tie the copy with the greater content fingerprint wins, and
//!    identical content keeps the remote copy.
//!
//! Every rule looks only at the two entities, never at which side they came
//! from, so swapping the arguments never changes the winning payload.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Debug;

use chrono::DateTime;
use pr_core::Entity;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Local-only entities the remote side has not seen yet.
    pub adopted_local: usize,
    pub remote_only: usize,
    pub unchanged: usize,
    pub local_wins: usize,
    pub remote_wins: usize,
    /// Tombstones in the merged output.
    pub tombstoned: usize,
    /// Same-key entities folded together within one side.
    pub duplicates: usize
}

impl MergeReport {
    pub fn conflicts(&self) -> usize {
        self.local_wins + self.remote_wins
    }

    /// Whether adopting the merge changes what the local side held.
    pub fn changes_local(&self) -> bool {
        self.remote_only > 0 || self.remote_wins > 0 || self.duplicates > 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome<K = String> {
    pub entities: BTreeMap<K, Entity>,
    pub report: MergeReport
}

impl<K> MergeOutcome<K> {
    pub fn into_entities(self) -> Vec<Entity> {
        self.entities.into_values().collect()
    }

    pub fn live(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values().filter(|e| e.is_live())
    }
}

/// Decides which copy of one key survives.
pub fn resolve(local: &Entity, remote: &Entity) -> Winner {
    let local_ahead = match (local.deleted_at, remote.deleted_at) {
        (None, Some(deleted)) => {
            if deleted > local.effective_last_modified() {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (Some(deleted), None) => {
            if deleted > remote.effective_last_modified() {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (Some(l), Some(r)) => l.cmp(&r).then_with(|| freshness(local, remote)),
        (None, None) => freshness(local, remote)
    };

    match local_ahead {
        Ordering::Greater => Winner::Local,
        Ordering::Less | Ordering::Equal => Winner::Remote
    }
}

fn freshness(local: &Entity, remote: &Entity) -> Ordering {
    local
        .version
        .cmp(&remote.version)
        .then_with(|| {
            local
                .effective_last_modified()
                .cmp(&remote.effective_last_modified())
        })
        .then_with(|| content_order(local, remote))
}

fn content_order(local: &Entity, remote: &Entity) -> Ordering {
    if local == remote {
        return Ordering::Equal;
    }
    utils::content_fingerprint(&local.to_json())
        .cmp(&utils::content_fingerprint(&remote.to_json()))
}

/// Merges by natural key.
pub fn merge(local: &[Entity], remote: &[Entity]) -> MergeOutcome {
    merge_by(local, remote, |e| e.natural_key().to_string())
}

pub fn merge_by<K, F>(local: &[Entity], remote: &[Entity], key: F) -> MergeOutcome<K>
where
    K: Ord + Clone + Debug,
    F: Fn(&Entity) -> K
{
    let mut report = MergeReport::default();
    let mut working = fold_side(remote, &key, &mut report);
    let locals = fold_side(local, &key, &mut report);
    let mut matched = 0;

    for (k, local_entity) in locals {
        match working.get_mut(&k) {
            None => {
                let mut adopted = local_entity;
                adopted.backfill_sync_fields(DateTime::UNIX_EPOCH);
                debug!(key = ?k, "Adopting local-only entity");
                report.adopted_local += 1;
                working.insert(k, adopted);
            }
            Some(remote_entity) => {
                matched += 1;
                if &local_entity == remote_entity {
                    report.unchanged += 1;
                    continue;
                }
                match resolve(&local_entity, remote_entity) {
                    Winner::Local => {
                        debug!(
                            key = ?k,
                            local_version = local_entity.version,
                            remote_version = remote_entity.version,
                            "Local copy wins"
                        );
                        report.local_wins += 1;
                        *remote_entity = local_entity;
                    }
                    Winner::Remote => {
                        debug!(
                            key = ?k,
                            local_version = local_entity.version,
                            remote_version = remote_entity.version,
                            "Remote copy wins"
                        );
                        report.remote_wins += 1;
                    }
                }
            }
        }
    }

    report.remote_only = working.len() - report.adopted_local - matched;
    report.tombstoned = working.values().filter(|e| !e.is_live()).count();
    MergeOutcome {
        entities: working,
        report
    }
}

/// Collapses same-key entities of one side through the same rule, keeping the
/// first occurrence on a tie.
fn fold_side<K, F>(entities: &[Entity], key: &F, report: &mut MergeReport) -> BTreeMap<K, Entity>
where
    K: Ord + Clone + Debug,
    F: Fn(&Entity) -> K
{
    let mut folded: BTreeMap<K, Entity> = BTreeMap::new();
    for entity in entities {
        let k = key(entity);
        match folded.get_mut(&k) {
            None => {
                folded.insert(k, entity.clone());
            }
            Some(existing) => {
                report.duplicates += 1;
                debug!(key = ?k, "Folding duplicate entity");
                if resolve(entity, existing) == Winner::Local {
                    *existing = entity.clone();
                }
            }
        }
    }
    folded
}
