//! Merge stage: the only writer of shared files.
//!
//! Runs after every fix task has finished. Change descriptors from all fix
//! results (plus anything requeued by the previous iteration) are tagged with
//! their origin cluster and grouped by location. Per location the descriptor
//! adding strictly more content wins; equal-size different content is left
//! unresolved. Winners are inserted after their anchor line. Free-form
//! descriptors go to the merge oracle and are requeued if it fails.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    ChangeDescriptor, ChangeKind, FixResult, MergeOracleRequest, MergeOracleResponse, OracleKind, TaggedChange,
};
use crate::domain::ports::Oracle;
use crate::services::oracle_calls::call_typed;
use crate::services::shared_files::{normalize_path, OwnershipMap};

/// File name of the requeued descriptors inside a loop directory.
pub const PENDING_CHANGES_FILE: &str = "pending-shared-changes.json";

/// Where an applied descriptor ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "placement", rename_all = "snake_case")]
pub enum Placement {
    AfterAnchor,
    EndOfFile { reason: String },
    /// The content was already in the file; nothing written.
    AlreadyPresent,
}

/// One descriptor competing for a location, with every cluster that sent it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub origin_clusters: BTreeSet<String>,
    pub change: ChangeDescriptor,
}

impl Candidate {
    fn new(tagged: TaggedChange) -> Self {
        Self {
            origin_clusters: BTreeSet::from([tagged.origin_cluster]),
            change: tagged.change,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        self.change.size()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedChange {
    pub kind: ChangeKind,
    pub location: String,
    pub origin_clusters: BTreeSet<String>,
    #[serde(flatten)]
    pub placement: Placement,
}

/// Same-location descriptors of equal size and different content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeConflict {
    pub file: String,
    pub location: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedChange {
    pub origin_cluster: String,
    pub target_file: String,
    pub reason: String,
}

/// Merge outcome for one shared file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileMergeReport {
    pub contributing_clusters: BTreeSet<String>,
    pub applied: Vec<AppliedChange>,
    /// Descriptors that lost to a larger one at the same location.
    pub superseded: Vec<Candidate>,
    pub conflicts: Vec<MergeConflict>,
}

/// What the merge oracle did with the free-form descriptors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleMergeSummary {
    pub submitted: usize,
    pub merged: usize,
    pub conflicts: Vec<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergeReport {
    pub files: BTreeMap<String, FileMergeReport>,
    pub rejected: Vec<RejectedChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleMergeSummary>,
    /// Free-form descriptors put back for the next iteration.
    pub requeued: usize,
}

impl MergeReport {
    pub fn unresolved_conflicts(&self) -> Vec<MergeConflict> {
        self.files.values().flat_map(|f| f.conflicts.iter().cloned()).collect()
    }

    pub fn applied_count(&self) -> usize {
        self.files.values().map(|f| f.applied.len()).sum()
    }
}

/// Result of resolving one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Winner { winner: Candidate, superseded: Vec<Candidate> },
    Conflict(Vec<Candidate>),
}

/// Pick the descriptor for one location.
///
/// Identical content collapses into one candidate crediting every origin.
/// The strictly largest remaining candidate wins; a tie at the top is a
/// conflict and nothing is applied.
pub fn resolve_location(tagged: Vec<TaggedChange>) -> Option<Resolution> {
    let mut candidates: Vec<Candidate> = Vec::new();
    for change in tagged {
        match candidates
            .iter_mut()
            .find(|c| c.change.content.trim() == change.change.content.trim())
        {
            Some(existing) => {
                existing.origin_clusters.insert(change.origin_cluster);
            }
            None => candidates.push(Candidate::new(change)),
        }
    }

    let best = candidates.iter().map(Candidate::size).max()?;
    let (top, rest): (Vec<_>, Vec<_>) = candidates.into_iter().partition(|c| c.size() == best);

    if top.len() > 1 {
        let mut all = top;
        all.extend(rest);
        return Some(Resolution::Conflict(all));
    }
    top.into_iter().next().map(|winner| Resolution::Winner {
        winner,
        superseded: rest,
    })
}

/// Insert `change` into `contents`.
///
/// The content goes on the line after the first line containing the anchor,
/// or at the end of the file when there is no anchor or it is not found.
/// Content already present is not inserted again.
pub fn insert_change(contents: &str, change: &ChangeDescriptor) -> (String, Placement) {
    let block = change.content.trim_matches(|c| c == '\n' || c == '\r');
    if block.trim().is_empty() || contents.contains(block.trim()) {
        return (contents.to_string(), Placement::AlreadyPresent);
    }

    let anchor = change.anchor.as_deref().map(str::trim).filter(|a| !a.is_empty());
    let anchor_end = anchor.and_then(|anchor| {
        let mut offset = 0;
        for line in contents.split_inclusive('\n') {
            offset += line.len();
            if line.contains(anchor) {
                return Some(offset);
            }
        }
        None
    });

    let (insert_at, placement) = match (anchor, anchor_end) {
        (_, Some(end)) => (end, Placement::AfterAnchor),
        (Some(_), None) => (
            contents.len(),
            Placement::EndOfFile {
                reason: "anchor not found".to_string(),
            },
        ),
        (None, _) => (
            contents.len(),
            Placement::EndOfFile {
                reason: "no anchor".to_string(),
            },
        ),
    };

    let mut out = String::with_capacity(contents.len() + block.len() + 2);
    out.push_str(&contents[..insert_at]);
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(block);
    out.push('\n');
    out.push_str(&contents[insert_at..]);
    (out, placement)
}

/// Descriptors waiting for the next merge.
#[derive(Debug, Clone)]
pub struct PendingChanges {
    path: PathBuf,
}

impl PendingChanges {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Queue file inside a loop directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(PENDING_CHANGES_FILE))
    }

    pub fn load(&self) -> DomainResult<Vec<TaggedChange>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(Vec::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the queue with `changes`; an empty list removes the file.
    pub fn store(&self, changes: &[TaggedChange]) -> DomainResult<()> {
        if changes.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(changes)?)?;
        Ok(())
    }
}

type LocationKey = (String, String, String);

pub struct MergeStage {
    ownership: Arc<OwnershipMap>,
    oracle: Option<Arc<dyn Oracle>>,
    pending: PendingChanges,
}

impl MergeStage {
    pub fn new(ownership: Arc<OwnershipMap>, oracle: Option<Arc<dyn Oracle>>, pending: PendingChanges) -> Self {
        Self {
            ownership,
            oracle,
            pending,
        }
    }

    /// Merge every descriptor of `results` plus the pending queue.
    #[instrument(skip_all, fields(results = results.len()))]
    pub async fn run(&self, results: &[FixResult]) -> DomainResult<MergeReport> {
        let mut report = MergeReport::default();
        let mut locations: BTreeMap<LocationKey, Vec<TaggedChange>> = BTreeMap::new();
        let mut free_form: Vec<TaggedChange> = Vec::new();

        let fresh = results.iter().flat_map(|result| {
            result.shared_file_changes_needed.iter().map(|change| TaggedChange {
                origin_cluster: result.cluster.clone(),
                change: change.clone(),
            })
        });
        let queued = self.pending.load()?;
        if !queued.is_empty() {
            tracing::info!(count = queued.len(), "Folding in requeued shared-file changes");
        }

        for mut tagged in fresh.chain(queued) {
            tagged.change.target_file = normalize_path(&tagged.change.target_file);
            let file = tagged.change.target_file.clone();

            if !self.ownership.is_shared(&file) {
                report.rejected.push(RejectedChange {
                    origin_cluster: tagged.origin_cluster,
                    target_file: file,
                    reason: "not a shared file".to_string(),
                });
                continue;
            }

            report
                .files
                .entry(file.clone())
                .or_default()
                .contributing_clusters
                .insert(tagged.origin_cluster.clone());

            if tagged.change.kind.is_structured() {
                let anchor = tagged.change.anchor.as_deref().unwrap_or_default().trim().to_string();
                let key = (file, anchor, tagged.change.location_key());
                locations.entry(key).or_default().push(tagged);
            } else {
                free_form.push(tagged);
            }
        }

        self.apply_structured(locations, &mut report)?;
        self.merge_free_form(free_form, &mut report).await?;

        tracing::info!(
            files = report.files.len(),
            applied = report.applied_count(),
            conflicts = report.unresolved_conflicts().len(),
            rejected = report.rejected.len(),
            requeued = report.requeued,
            "Merge complete"
        );
        Ok(report)
    }

    fn apply_structured(
        &self,
        locations: BTreeMap<LocationKey, Vec<TaggedChange>>,
        report: &mut MergeReport,
    ) -> DomainResult<()> {
        let mut by_file: BTreeMap<String, Vec<(String, Vec<TaggedChange>)>> = BTreeMap::new();
        for ((file, _, location), changes) in locations {
            by_file.entry(file).or_default().push((location, changes));
        }

        for (file, entries) in by_file {
            let path = self.ownership.resolve(&file);
            let original = match std::fs::read_to_string(&path) {
                Ok(contents) => contents,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
                Err(e) => return Err(e.into()),
            };
            let mut contents = original.clone();
            let file_report = report.files.entry(file.clone()).or_default();

            for (location, changes) in entries {
                match resolve_location(changes) {
                    Some(Resolution::Winner { winner, superseded }) => {
                        let (updated, placement) = insert_change(&contents, &winner.change);
                        contents = updated;
                        file_report.applied.push(AppliedChange {
                            kind: winner.change.kind,
                            location,
                            origin_clusters: winner.origin_clusters,
                            placement,
                        });
                        file_report.superseded.extend(superseded);
                    }
                    Some(Resolution::Conflict(candidates)) => {
                        tracing::warn!(file = %file, location = %location, "Unresolved merge conflict");
                        file_report.conflicts.push(MergeConflict {
                            file: file.clone(),
                            location,
                            candidates,
                        });
                    }
                    None => {}
                }
            }

            if contents != original {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&path, contents)?;
            }
        }
        Ok(())
    }

    async fn merge_free_form(&self, changes: Vec<TaggedChange>, report: &mut MergeReport) -> DomainResult<()> {
        if changes.is_empty() {
            return self.pending.store(&[]);
        }

        let Some(oracle) = &self.oracle else {
            tracing::warn!(count = changes.len(), "No merge oracle configured; requeueing free-form changes");
            report.requeued = changes.len();
            return self.pending.store(&changes);
        };

        let request = MergeOracleRequest {
            changes: changes.clone(),
            shared_files: self.ownership.shared_files(),
        };
        match call_typed::<_, MergeOracleResponse>(oracle.as_ref(), OracleKind::Merge, &request, 1).await {
            Ok(response) => {
                report.oracle = Some(OracleMergeSummary {
                    submitted: changes.len(),
                    merged: response.merged.len(),
                    conflicts: response.conflicts,
                    notes: response.notes,
                });
                self.pending.store(&[])
            }
            Err(e) => {
                tracing::warn!(error = %e, count = changes.len(), "Merge oracle failed; requeueing free-form changes");
                report.requeued = changes.len();
                self.pending.store(&changes)
            }
        }
    }
}
