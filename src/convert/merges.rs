use std::collections::BTreeMap;

use super::commit::CommitArena;
use super::streams::BranchStreams;
use crate::{FHashMap, FHashSet};
use crate::cvs::file::FileSet;

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct MergeFailure {
    pub(crate) count: usize,
}

impl std::fmt::Display for MergeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} merges could not be resolved", self.count)
    }
}

/// Sets `merge_from` on every commit that merges changes from another
/// branch.
///
/// The file revision → commit index of `files` must be up to date.
pub(crate) struct MergeResolver<'a> {
    files: &'a FileSet,
    arena: &'a mut CommitArena,
    streams: &'a mut BranchStreams,
    tagged: FHashSet<usize>,
}

impl<'a> MergeResolver<'a> {
    /// Commits in `tags` are never reordered.
    pub(crate) fn new(
        files: &'a FileSet,
        arena: &'a mut CommitArena,
        streams: &'a mut BranchStreams,
        tags: &BTreeMap<String, usize>,
    ) -> Self {
        Self {
            files,
            arena,
            streams,
            tagged: tags.values().copied().collect(),
        }
    }

    /// Processes commits in `commits` order. Every failure is logged, and
    /// the total is reported at the end.
    pub(crate) fn resolve(&mut self, commits: &[usize]) -> Result<(), MergeFailure> {
        // (source branch, destination branch) -> last merged source commit
        let mut last_merges = FHashMap::<(String, String), usize>::default();
        let mut failures = 0;

        for &dest in commits.iter() {
            let mut sources = Vec::new();
            for file_rev in self.arena[dest].merged_files() {
                let Some(ref mergepoint) = file_rev.mergepoint else {
                    continue;
                };
                match self.files[file_rev.file].commit_for(mergepoint) {
                    Some(source) => sources.push(source),
                    None => tracing::warn!(
                        "{} r{mergepoint} merged in commit {} is not part of any commit",
                        self.files[file_rev.file].name,
                        self.arena[dest].id,
                    ),
                }
            }
            if sources.is_empty() {
                continue;
            }

            let _span = tracing::debug_span!("merge", commit = self.arena[dest].id.as_str()).entered();

            let source_branch = self.arena[sources[0]].branch.clone();
            if sources
                .iter()
                .any(|&s| self.arena[s].branch != source_branch)
            {
                tracing::error!(
                    "commit {} merges from several branches: {}",
                    self.arena[dest].id,
                    sources
                        .iter()
                        .map(|&s| format!("{} ({})", self.arena[s].id, self.arena[s].branch))
                        .collect::<Vec<_>>()
                        .join(", "),
                );
                failures += 1;
                continue;
            }

            let dest_branch = self.arena[dest].branch.clone();
            if source_branch == dest_branch {
                tracing::debug!("ignoring merge within branch {dest_branch}");
                continue;
            }

            // when files disagree, the most advanced source wins
            let Some(&source) = sources.iter().max_by_key(|&&s| self.arena[s].index) else {
                continue;
            };

            let key = (source_branch, dest_branch);
            if let Some(&previous) = last_merges.get(&key) {
                if self.arena[source].index < self.arena[previous].index {
                    if self.uncross(dest, source, previous).is_err() {
                        failures += 1;
                        continue;
                    }
                }
            }

            tracing::debug!(
                "commit {} merges {} from {}",
                self.arena[dest].id,
                self.arena[source].id,
                key.0,
            );
            self.arena[dest].merge_from = Some(source);
            last_merges.insert(key, source);
        }

        if failures != 0 {
            tracing::error!("{failures} merges could not be resolved");
            Err(MergeFailure { count: failures })
        } else {
            Ok(())
        }
    }

    /// `dest` merges `source`, which is older than `previous`, already
    /// merged earlier into the same branch. Moves `source` right after
    /// `previous`.
    fn uncross(&mut self, dest: usize, source: usize, previous: usize) -> Result<(), ()> {
        let arena = &*self.arena;
        tracing::info!(
            "crossed merge: {} merges {}, but {} was merged before",
            arena[dest].id,
            arena[source].id,
            arena[previous].id,
        );

        let mut cursor = arena[dest].predecessor;
        let mut earlier_merge = None;
        while let Some(c) = cursor {
            if arena[c].branch != arena[dest].branch {
                break;
            }
            if arena[c].merge_from == Some(previous) {
                earlier_merge = Some(c);
                break;
            }
            cursor = arena[c].predecessor;
        }
        let Some(earlier_merge) = earlier_merge else {
            tracing::error!(
                "cannot find the commit that merged {} into {}",
                arena[previous].id,
                arena[dest].branch,
            );
            return Err(());
        };

        let stream = self
            .streams
            .commits(&arena[source].branch)
            .unwrap_or_default();
        let from = stream.iter().position(|&c| c == source);
        let to = stream.iter().position(|&c| c == previous);
        let (Some(from), Some(to)) = (from, to) else {
            tracing::error!(
                "{} and {} are not on the same branch",
                arena[source].id,
                arena[previous].id,
            );
            return Err(());
        };

        for &moved in stream[from..=to].iter() {
            if arena[moved].is_branchpoint() || self.streams.is_branchpoint(moved) {
                tracing::error!(
                    "cannot move {} after {}: {} is a branchpoint",
                    arena[source].id,
                    arena[previous].id,
                    arena[moved].id,
                );
                return Err(());
            }
            if self.tagged.contains(&moved) {
                tracing::error!(
                    "cannot move {} after {}: {} is tagged",
                    arena[source].id,
                    arena[previous].id,
                    arena[moved].id,
                );
                return Err(());
            }
        }

        for &between in stream[(from + 1)..=to].iter() {
            if let Some(shared) = arena[between]
                .files
                .iter()
                .find(|f| arena[source].touches_file(f.file))
            {
                tracing::error!(
                    "cannot move {} after {}: both change {}",
                    arena[source].id,
                    arena[between].id,
                    self.files[shared.file].name,
                );
                return Err(());
            }
        }

        tracing::info!(
            "moving {} after {} (merged by {})",
            arena[source].id,
            arena[previous].id,
            arena[earlier_merge].id,
        );
        self.streams
            .move_commit_after(self.arena, source, previous)
            .map_err(|e| {
                tracing::error!("{e}");
            })
    }
}
