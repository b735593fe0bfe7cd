use std::collections::BTreeMap;

use super::commit::CommitArena;
use super::commit_move::CommitMoveRecord;
use super::repo_state::{BranchState, ConsistencyError, RepositoryState};
use crate::cvs::file::{FileInfo, FileSet};
use crate::cvs::revision::Revision;
use crate::{FHashMap, FHashSet};

/// What the resolver maps to commits.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum ResolveMode {
    /// Tags, to the commit that carries them.
    Tags,
    /// Branches, to the commit they sprout from.
    Branches,
}

impl ResolveMode {
    fn names_at<'a>(self, file: &'a FileInfo, revision: &Revision) -> &'a [String] {
        match self {
            Self::Tags => file.tags_at(revision),
            Self::Branches => file.branches_at(revision),
        }
    }

    fn revision_for(self, file: &FileInfo, name: &str) -> Option<Revision> {
        match self {
            Self::Tags => file.tag_revision(name).cloned(),
            Self::Branches => {
                if file.branch_added_on() == name {
                    None
                } else {
                    file.branchpoint(name)
                }
            }
        }
    }

    pub(crate) fn noun(self) -> &'static str {
        match self {
            Self::Tags => "tag",
            Self::Branches => "branch",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum UnresolvedReason {
    NoFiles,
    NoCandidate,
    Mismatch {
        file: String,
        expected: Option<Revision>,
        actual: Option<Revision>,
    },
    AnchorConflict {
        file: String,
        revision: Revision,
        commit: String,
    },
    TooManyUntaggedFiles {
        count: usize,
    },
    RepairFailed(String),
}

impl std::fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn opt_rev(rev: Option<&Revision>) -> String {
            rev.map_or_else(|| "none".into(), |rev| format!("r{rev}"))
        }

        match *self {
            Self::NoFiles => write!(f, "no converted file carries it"),
            Self::NoCandidate => write!(f, "no commit carries any of its revisions"),
            Self::Mismatch {
                ref file,
                ref expected,
                ref actual,
            } => write!(
                f,
                "{file} is at {} where {} was expected",
                opt_rev(actual.as_ref()),
                opt_rev(expected.as_ref()),
            ),
            Self::AnchorConflict {
                ref file,
                ref revision,
                ref commit,
            } => write!(
                f,
                "{file} r{revision} is only reached in commit {commit}, which also changes other tagged files",
            ),
            Self::TooManyUntaggedFiles { count } => {
                write!(f, "{count} untagged files would have to be moved")
            }
            Self::RepairFailed(ref e) => write!(f, "reordering commits failed: {e}"),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct UnresolvedTag {
    pub(crate) name: String,
    pub(crate) reason: UnresolvedReason,
}

/// Expected per-file state of a tag or branchpoint.
struct TagTarget {
    name: String,
    branch: String,
    files: BTreeMap<usize, Revision>,
    /// Files carrying the name on another branch than `branch`.
    ignored: FHashSet<usize>,
}

struct Mismatch {
    file: usize,
    expected: Option<Revision>,
    actual: Option<Revision>,
}

enum ScanOutcome {
    Resolved(usize),
    Problematic {
        /// Last commit holding a revision literally carrying the name.
        anchor: Option<usize>,
        mismatch: Option<Mismatch>,
    },
}

/// Finds, for each tag (or branch), the commit after which every file
/// on the branch is at the tagged revision. Skewed tags are repaired by
/// moving the file revisions that get in the way after the last
/// candidate commit.
pub(crate) struct Resolver<'a> {
    mode: ResolveMode,
    files: &'a FileSet,
    arena: &'a mut CommitArena,
    commits: Vec<usize>,
    partial_tag_threshold: usize,
    resolved: BTreeMap<String, usize>,
    unresolved: Vec<UnresolvedTag>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        mode: ResolveMode,
        files: &'a FileSet,
        arena: &'a mut CommitArena,
        commits: Vec<usize>,
        partial_tag_threshold: usize,
    ) -> Self {
        Self {
            mode,
            files,
            arena,
            commits,
            partial_tag_threshold,
            resolved: BTreeMap::new(),
            unresolved: Vec::new(),
        }
    }

    pub(crate) fn resolved_tags(&self) -> &BTreeMap<String, usize> {
        &self.resolved
    }

    pub(crate) fn unresolved_tags(&self) -> &[UnresolvedTag] {
        &self.unresolved
    }

    #[cfg(test)]
    pub(crate) fn commits(&self) -> &[usize] {
        &self.commits
    }

    pub(crate) fn into_parts(self) -> (Vec<usize>, BTreeMap<String, usize>, Vec<UnresolvedTag>) {
        (self.commits, self.resolved, self.unresolved)
    }

    /// Returns whether every name was resolved.
    pub(crate) fn resolve(&mut self, names: &[String]) -> Result<bool, ConsistencyError> {
        let noun = self.mode.noun();
        self.resolved.clear();
        self.unresolved.clear();

        let committed_files: FHashSet<usize> = self
            .commits
            .iter()
            .flat_map(|&c| self.arena[c].files.iter().map(|f| f.file))
            .collect();

        let mut targets = Vec::new();
        for name in names.iter() {
            match self.make_target(name, &committed_files) {
                Some(target) => targets.push(target),
                None => {
                    if let Some(commit) = self.resolve_without_files(name) {
                        tracing::debug!(
                            "{noun} {name} has no files of its own, placing it at commit {}",
                            self.arena[commit].id,
                        );
                        self.resolved.insert(name.clone(), commit);
                    } else {
                        self.fail(name, UnresolvedReason::NoFiles);
                    }
                }
            }
        }

        let outcomes = {
            let _span = tracing::info_span!("scan", kind = noun).entered();
            self.scan(&targets.iter().collect::<Vec<_>>())?
        };

        let mut problematic = Vec::new();
        for (target, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                ScanOutcome::Resolved(commit) => {
                    tracing::debug!(
                        "{noun} {} resolved to commit {}",
                        target.name,
                        self.arena[commit].id,
                    );
                    self.resolved.insert(target.name.clone(), commit);
                }
                ScanOutcome::Problematic { anchor, mismatch } => {
                    if let Some(ref mismatch) = mismatch {
                        tracing::info!(
                            "{noun} {} is problematic: {}",
                            target.name,
                            self.mismatch_reason(mismatch),
                        );
                    } else {
                        tracing::info!("{noun} {} is problematic", target.name);
                    }
                    problematic.push((target, anchor));
                }
            }
        }

        if problematic.is_empty() {
            return Ok(self.unresolved.is_empty());
        }

        let mut repair_failures = FHashMap::<&str, UnresolvedReason>::default();
        let mut stale = FHashSet::<String>::default();
        for &(target, anchor) in problematic.iter() {
            let _span = tracing::info_span!("repair", name = target.name.as_str()).entered();
            tracing::info!("{}", "-".repeat(60));

            let Some(anchor) = anchor else {
                repair_failures.insert(&target.name, UnresolvedReason::NoCandidate);
                continue;
            };
            match self.repair(target, anchor) {
                Ok(crossed) => {
                    for name in crossed {
                        if !targets.iter().any(|other| other.name == name) {
                            tracing::warn!(
                                "repairing {noun} {} moved commits across {noun} {name}",
                                target.name,
                            );
                            continue;
                        }
                        tracing::warn!(
                            "repairing {noun} {} moved commits across {noun} {name}, checking it again",
                            target.name,
                        );
                        self.resolved.remove(&name);
                        stale.insert(name);
                    }
                }
                Err(reason) => {
                    tracing::info!("cannot repair {noun} {}: {reason}", target.name);
                    repair_failures.insert(&target.name, reason);
                }
            }
        }

        let retry: Vec<_> = problematic
            .iter()
            .map(|&(target, _)| target)
            .chain(targets.iter().filter(|target| stale.contains(&target.name)))
            .collect();
        let outcomes = {
            let _span = tracing::info_span!("rescan", kind = noun).entered();
            self.scan(&retry)?
        };
        for (target, outcome) in retry.into_iter().zip(outcomes) {
            match outcome {
                ScanOutcome::Resolved(commit) => {
                    tracing::info!(
                        "{noun} {} resolved to commit {} after repair",
                        target.name,
                        self.arena[commit].id,
                    );
                    self.resolved.insert(target.name.clone(), commit);
                }
                ScanOutcome::Problematic { mismatch, .. } => {
                    let reason = repair_failures
                        .remove(target.name.as_str())
                        .or_else(|| mismatch.map(|m| self.mismatch_reason(&m)))
                        .unwrap_or(UnresolvedReason::NoCandidate);
                    self.fail(&target.name, reason);
                }
            }
        }

        Ok(self.unresolved.is_empty())
    }

    fn fail(&mut self, name: &str, reason: UnresolvedReason) {
        tracing::warn!("unresolved {} {name}: {reason}", self.mode.noun());
        self.unresolved.push(UnresolvedTag {
            name: name.into(),
            reason,
        });
    }

    fn mismatch_reason(&self, mismatch: &Mismatch) -> UnresolvedReason {
        UnresolvedReason::Mismatch {
            file: self.files[mismatch.file].name.clone(),
            expected: mismatch.expected.clone(),
            actual: mismatch.actual.clone(),
        }
    }

    fn make_target(&self, name: &str, committed_files: &FHashSet<usize>) -> Option<TagTarget> {
        let mut per_branch = BTreeMap::<&str, Vec<(usize, Revision)>>::new();
        for (i, info) in self.files.iter() {
            if !committed_files.contains(&i) {
                continue;
            }
            let Some(revision) = self.mode.revision_for(info, name) else {
                continue;
            };
            let Some(branch) = info.branch_of(&revision) else {
                tracing::warn!(
                    "{} {name} of {} points to r{revision}, on an unnamed branch",
                    self.mode.noun(),
                    info.name,
                );
                continue;
            };
            per_branch.entry(branch).or_default().push((i, revision));
        }

        // A revision on another branch agrees with `branch` when it is the
        // point `branch` sprouts from in that file. Among the branches that
        // agree with the most files, the deepest one wins.
        let agrees = |file: usize, revision: &Revision, branch: &str| {
            self.files[file].branch_of(revision) == Some(branch)
                || self.files[file].branchpoint(branch).as_ref() == Some(revision)
        };
        let (branch, _) = per_branch
            .iter()
            .map(|(&branch, entries)| {
                let agreeing = per_branch
                    .values()
                    .flatten()
                    .filter(|(file, revision)| agrees(*file, revision, branch))
                    .count();
                let depth = entries
                    .iter()
                    .map(|(_, revision)| revision.parts().len())
                    .max()
                    .unwrap_or(0);
                (branch, (agreeing, depth))
            })
            .max_by_key(|&(_, key)| key)?;

        let mut ignored = FHashSet::default();
        let mut files = BTreeMap::new();
        for (other_branch, entries) in per_branch.iter() {
            for &(file, ref revision) in entries.iter() {
                if agrees(file, revision, branch) {
                    files.insert(file, revision.clone());
                } else {
                    tracing::warn!(
                        "{} {name} is on branch {branch}, but {} has it at r{revision} on {other_branch}",
                        self.mode.noun(),
                        self.files[file].name,
                    );
                    ignored.insert(file);
                }
            }
        }

        Some(TagTarget {
            name: name.into(),
            branch: branch.into(),
            files,
            ignored,
        })
    }

    /// A branch whose files were all added on the branch itself sprouts
    /// from the last commit of its parent before its first commit.
    fn resolve_without_files(&self, name: &str) -> Option<usize> {
        if self.mode != ResolveMode::Branches {
            return None;
        }

        let pos = self
            .commits
            .iter()
            .position(|&c| self.arena[c].branch == name)?;
        let parent = self.arena[self.commits[pos]]
            .files
            .iter()
            .find_map(|f| self.files[f.file].parent_branch_of(&f.revision))?;
        self.commits[..pos]
            .iter()
            .rev()
            .copied()
            .find(|&c| self.arena[c].branch == parent)
    }

    fn scan(&self, targets: &[&TagTarget]) -> Result<Vec<ScanOutcome>, ConsistencyError> {
        let by_name: FHashMap<&str, usize> = targets
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.as_str(), i))
            .collect();
        let mut pending_by_branch = FHashMap::<&str, Vec<usize>>::default();
        for (i, target) in targets.iter().enumerate() {
            pending_by_branch
                .entry(target.branch.as_str())
                .or_default()
                .push(i);
        }

        let mut resolved = vec![None; targets.len()];
        let mut anchors = vec![None; targets.len()];
        let mut last_mismatch: Vec<Option<Mismatch>> = targets.iter().map(|_| None).collect();

        let mut state = RepositoryState::new();
        for &c in self.commits.iter() {
            let commit = &self.arena[c];
            state.apply(commit, self.files)?;

            let Some(pending) = pending_by_branch.get_mut(commit.branch.as_str()) else {
                continue;
            };
            if pending.is_empty() {
                continue;
            }

            let mut candidates = Vec::new();
            for file_rev in commit.files.iter() {
                let info = &self.files[file_rev.file];
                for name in self.mode.names_at(info, &file_rev.revision) {
                    let Some(&t) = by_name.get(name.as_str()) else {
                        continue;
                    };
                    if resolved[t].is_some() || targets[t].branch != commit.branch {
                        continue;
                    }
                    anchors[t] = Some(c);
                    if !candidates.contains(&t) {
                        candidates.push(t);
                    }
                }

                if file_rev.is_dead {
                    for &t in pending.iter() {
                        if !targets[t].files.contains_key(&file_rev.file)
                            && !candidates.contains(&t)
                        {
                            candidates.push(t);
                        }
                    }
                }
            }

            if candidates.is_empty() {
                continue;
            }

            let Some(branch_state) = state.branch(&commit.branch) else {
                continue;
            };
            for t in candidates {
                let hint = last_mismatch[t].as_ref().map(|m| m.file);
                match self.check(targets[t], branch_state, hint) {
                    Ok(()) => {
                        tracing::trace!(
                            "{} {} matches at commit {}",
                            self.mode.noun(),
                            targets[t].name,
                            commit.id,
                        );
                        resolved[t] = Some(c);
                        pending.retain(|&p| p != t);
                    }
                    Err(mismatch) => last_mismatch[t] = Some(mismatch),
                }
            }
        }

        Ok(resolved
            .into_iter()
            .zip(anchors)
            .zip(last_mismatch)
            .map(|((resolved, anchor), mismatch)| match resolved {
                Some(c) => ScanOutcome::Resolved(c),
                None => ScanOutcome::Problematic { anchor, mismatch },
            })
            .collect())
    }

    fn check(
        &self,
        target: &TagTarget,
        state: &BranchState,
        hint: Option<usize>,
    ) -> Result<(), Mismatch> {
        if let Some(file) = hint {
            if let Some(revision) = target.files.get(&file) {
                self.check_file(file, revision, state)?;
            }
        }

        for (&file, revision) in target.files.iter() {
            self.check_file(file, revision, state)?;
        }

        for (file, revision) in state.iter() {
            if !target.files.contains_key(&file) && !target.ignored.contains(&file) {
                return Err(Mismatch {
                    file,
                    expected: None,
                    actual: Some(revision.clone()),
                });
            }
        }

        Ok(())
    }

    fn check_file(
        &self,
        file: usize,
        revision: &Revision,
        state: &BranchState,
    ) -> Result<(), Mismatch> {
        let expected = (!self.files[file].is_dead(revision)).then_some(revision);
        let actual = state.get(file);
        if expected == actual {
            Ok(())
        } else {
            Err(Mismatch {
                file,
                expected: expected.cloned(),
                actual: actual.cloned(),
            })
        }
    }

    /// Moves every file revision that prevents `target` from matching at
    /// `anchor` to just after it. Returns the resolved names whose commit
    /// the moves crossed.
    fn repair(&mut self, target: &TagTarget, anchor: usize) -> Result<Vec<String>, UnresolvedReason> {
        let anchor_pos = self
            .commits
            .iter()
            .position(|&c| c == anchor)
            .ok_or(UnresolvedReason::NoCandidate)?;

        // files that reached their tagged revision, and the commits that
        // changed them afterwards
        // files tagged at the revision the branch sprouts from count as
        // tagged from the start
        let mut tagged: FHashSet<usize> = target
            .files
            .iter()
            .filter(|&(&file, revision)| {
                self.files[file].branch_of(revision) != Some(target.branch.as_str())
            })
            .map(|(&file, _)| file)
            .collect();
        let mut later = FHashMap::<usize, Vec<usize>>::default();
        // live files the tag does not know about, and the commits that
        // changed them since they were added
        let mut untagged = FHashMap::<usize, Vec<usize>>::default();

        for &c in self.commits[..=anchor_pos].iter() {
            let commit = &self.arena[c];
            if commit.branch != target.branch {
                continue;
            }
            for file_rev in commit.files.iter() {
                let file = file_rev.file;
                if target.ignored.contains(&file) {
                    continue;
                }
                if let Some(revision) = target.files.get(&file) {
                    if file_rev.revision == *revision {
                        tagged.insert(file);
                        later.remove(&file);
                    } else if tagged.contains(&file) {
                        later.entry(file).or_default().push(c);
                    }
                } else if self.mode == ResolveMode::Branches
                    && self.files[file].branch_added_on() == target.name
                {
                    continue;
                } else if file_rev.is_dead {
                    untagged.remove(&file);
                } else {
                    untagged.entry(file).or_default().push(c);
                }
            }
        }

        if untagged.len() > self.partial_tag_threshold {
            return Err(UnresolvedReason::TooManyUntaggedFiles {
                count: untagged.len(),
            });
        }

        let mut record = CommitMoveRecord::new(anchor);
        for (&file, commits) in later.iter().chain(untagged.iter()) {
            for &c in commits.iter() {
                if c == anchor {
                    return Err(self.anchor_conflict(target, anchor, file));
                }
                record.add(c, file);
            }
        }

        if record.is_empty() {
            return Err(UnresolvedReason::NoCandidate);
        }

        tracing::info!(
            "moving parts of {} commits after {}",
            record.len(),
            self.arena[anchor].id,
        );
        let crossed = self.crossed_names(target, anchor_pos, &record);
        let undo = record.apply(self.arena, self.files, &mut self.commits);

        let mut state = RepositoryState::new();
        let replay = state.apply_all(self.commits.iter().map(|&c| &self.arena[c]), self.files);
        if let Err(e) = replay {
            tracing::info!("reverting moves: {e}");
            undo.undo(self.arena, &mut self.commits);
            return Err(UnresolvedReason::RepairFailed(e.to_string()));
        }

        Ok(crossed)
    }

    /// Names already resolved to a commit of `target`'s branch that sits
    /// between the first commit of `record` and the anchor. Moving commits
    /// across them changes their tree.
    fn crossed_names(&self, target: &TagTarget, anchor_pos: usize, record: &CommitMoveRecord) -> Vec<String> {
        let before_anchor = &self.commits[..=anchor_pos];
        let Some(first_moved) = record
            .commits()
            .filter_map(|c| before_anchor.iter().position(|&other| other == c))
            .min()
        else {
            return Vec::new();
        };

        self.resolved
            .iter()
            .filter(|&(_, &c)| self.arena[c].branch == target.branch)
            .filter(|&(_, &c)| {
                before_anchor
                    .iter()
                    .position(|&other| other == c)
                    .is_some_and(|pos| pos >= first_moved)
            })
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn anchor_conflict(&self, target: &TagTarget, anchor: usize, moving_file: usize) -> UnresolvedReason {
        let commit = &self.arena[anchor];
        let file_rev = commit
            .files
            .iter()
            .find(|f| target.files.get(&f.file) == Some(&f.revision))
            .or_else(|| commit.files.iter().find(|f| f.file == moving_file));
        match file_rev {
            Some(file_rev) => UnresolvedReason::AnchorConflict {
                file: self.files[file_rev.file].name.clone(),
                revision: file_rev.revision.clone(),
                commit: commit.id.clone(),
            },
            None => UnresolvedReason::NoCandidate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ResolveMode, Resolver, UnresolvedReason};
    use crate::convert::commit::test_utils::Builder;
    use crate::cvs::revision::rev;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|&s| s.into()).collect()
    }

    #[test]
    fn test_tags_without_skew() {
        let mut b = Builder::new();
        b.symbol("file1", "tag1", "1.1");
        b.symbol("file2", "tag1", "1.1");
        b.symbol("file1", "tag2", "1.2");
        b.symbol("file2", "tag2", "1.1");
        let c0 = b.commit("c0", &["file1@1.1", "file2@1.1"]);
        let c1 = b.commit("c1", &["file1@1.2"]);
        b.commit("c2", &["file2@1.2"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits.clone(), 30);
        assert!(resolver.resolve(&names(&["tag1", "tag2"])).unwrap());
        assert_eq!(resolver.resolved_tags()["tag1"], c0);
        assert_eq!(resolver.resolved_tags()["tag2"], c1);
        assert_eq!(resolver.commits(), commits);
    }

    #[test]
    fn test_resolving_twice_is_idempotent() {
        let mut b = Builder::new();
        b.symbol("file1", "tag1", "1.2");
        b.symbol("file2", "tag1", "1.1");
        b.commit("c0", &["file1@1.1", "file2@1.1"]);
        b.commit("c1", &["file2@1.2"]);
        b.commit("c2", &["file1@1.2"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits, 30);
        assert!(resolver.resolve(&names(&["tag1"])).unwrap());
        let first_commits = resolver.commits().to_vec();
        let first_tags = resolver.resolved_tags().clone();

        assert!(resolver.resolve(&names(&["tag1"])).unwrap());
        assert_eq!(resolver.commits(), first_commits);
        assert_eq!(resolver.resolved_tags(), &first_tags);
        drop(resolver);
        assert_eq!(b.ids(&first_commits), ["c0", "c2", "c1"]);
    }

    #[test]
    fn test_repair_moves_later_revision() {
        let mut b = Builder::new();
        b.symbol("file1", "tag1", "1.2");
        b.symbol("file2", "tag1", "1.1");
        b.commit("c0", &["file1@1.1", "file2@1.1"]);
        b.commit("c1", &["file2@1.2", "file3@1.1"]);
        let c2 = b.commit("c2", &["file1@1.2"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits, 30);
        assert!(resolver.resolve(&names(&["tag1"])).unwrap());
        assert_eq!(resolver.resolved_tags()["tag1"], c2);
        let (commits, _, _) = resolver.into_parts();
        assert_eq!(b.ids(&commits), ["c0", "c2", "c1"]);
    }

    #[test]
    fn test_repair_splits_commit() {
        let mut b = Builder::new();
        b.symbol("file1", "tag1", "1.2");
        b.symbol("file2", "tag1", "1.2");
        b.commit("c0", &["file1@1.1", "file2@1.1"]);
        b.commit("c1", &["file2@1.2", "file3@1.1"]);
        let c2 = b.commit("c2", &["file1@1.2"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits, 30);
        assert!(resolver.resolve(&names(&["tag1"])).unwrap());
        assert_eq!(resolver.resolved_tags()["tag1"], c2);
        let (commits, _, _) = resolver.into_parts();
        assert_eq!(b.ids(&commits), ["c0", "c1-1", "c2", "c1-2"]);
        let file3 = b.files.find("file3").unwrap();
        assert_eq!(b.arena[commits[3]].files[0].file, file3);
    }

    #[test]
    fn test_anchor_conflict_names_tagged_file() {
        let mut b = Builder::new();
        b.symbol("file1", "tag1", "1.3");
        b.symbol("file2", "tag1", "1.2");
        b.commit("id1", &["file1@1.1", "file2@1.1"]);
        b.commit("id2", &["file1@1.2", "file2@1.2"]);
        b.commit("id3", &["file1@1.3", "file2@1.3"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits.clone(), 30);
        assert!(!resolver.resolve(&names(&["tag1"])).unwrap());
        let unresolved = resolver.unresolved_tags();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].name, "tag1");
        assert_eq!(
            unresolved[0].reason,
            UnresolvedReason::AnchorConflict {
                file: "file1".into(),
                revision: rev("1.3"),
                commit: "id3".into(),
            },
        );
        assert!(unresolved[0].reason.to_string().contains("file1 r1.3"));
        assert_eq!(resolver.commits(), commits);
    }

    #[test]
    fn test_partial_tag_threshold() {
        let mut b = Builder::new();
        b.symbol("file1", "tag1", "1.2");
        b.commit("c0", &["file1@1.1"]);
        b.commit("c1", &["file2@1.1", "file3@1.1"]);
        b.commit("c2", &["file1@1.2"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits.clone(), 1);
        assert!(!resolver.resolve(&names(&["tag1"])).unwrap());
        assert_eq!(
            resolver.unresolved_tags()[0].reason,
            UnresolvedReason::TooManyUntaggedFiles { count: 2 },
        );
        assert_eq!(resolver.commits(), commits);
    }

    #[test]
    fn test_dead_revision_candidate() {
        let mut b = Builder::new();
        b.symbol("file1", "tag1", "1.1");
        b.commit("c0", &["file1@1.1", "file2@1.1"]);
        let c1 = b.commit("c1", &["file2@1.2!"]);
        b.commit("c2", &["file1@1.2"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits.clone(), 30);
        assert!(resolver.resolve(&names(&["tag1"])).unwrap());
        assert_eq!(resolver.resolved_tags()["tag1"], c1);
        assert_eq!(resolver.commits(), commits);
    }

    #[test]
    fn test_branch_added_on_branch() {
        let mut b = Builder::new();
        b.symbol("file1", "branch1", "1.1.0.2");
        b.symbol("file2", "branch1", "1.1.0.2");
        let file2 = b.file("file2");
        b.files[file2].set_branch_added_on("branch1");
        b.files[file2].mark_dead(rev("1.1"));

        let c0 = b.commit("c0", &["file1@1.1"]);
        b.commit("c1", &["file1@1.1.2.1"]);
        b.commit("c2", &["file1@1.2"]);
        b.commit("c3", &["file2@1.1.2.1"]);
        let commits = b.commits.clone();

        let mut resolver =
            Resolver::new(ResolveMode::Branches, &b.files, &mut b.arena, commits.clone(), 30);
        assert!(resolver.resolve(&names(&["branch1"])).unwrap());
        assert_eq!(resolver.resolved_tags()["branch1"], c0);
        assert_eq!(resolver.commits(), commits);
    }

    #[test]
    fn test_branch_with_only_new_files() {
        let mut b = Builder::new();
        b.symbol("file2", "branch1", "1.1.0.2");
        let file2 = b.file("file2");
        b.files[file2].set_branch_added_on("branch1");

        b.commit("c0", &["file1@1.1"]);
        let c1 = b.commit("c1", &["file1@1.2"]);
        b.commit("c2", &["file2@1.1.2.1"]);
        b.commit("c3", &["file1@1.3"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Branches, &b.files, &mut b.arena, commits, 30);
        assert!(resolver.resolve(&names(&["branch1"])).unwrap());
        assert_eq!(resolver.resolved_tags()["branch1"], c1);
    }

    #[test]
    fn test_tag_on_branch_with_unchanged_files() {
        let mut b = Builder::new();
        for file in ["file1", "file2", "file3"] {
            b.symbol(file, "branch1", "1.1.0.2");
        }
        b.symbol("file1", "tag1", "1.1");
        b.symbol("file2", "tag1", "1.1");
        b.symbol("file3", "tag1", "1.1.2.1");
        b.commit("c0", &["file1@1.1", "file2@1.1", "file3@1.1"]);
        let c1 = b.commit("c1", &["file3@1.1.2.1"]);
        b.commit("c2", &["file1@1.2"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits.clone(), 30);
        assert!(resolver.resolve(&names(&["tag1"])).unwrap());
        assert_eq!(resolver.resolved_tags()["tag1"], c1);
        assert_eq!(resolver.commits(), commits);
        drop(resolver);
        assert_eq!(b.arena[c1].branch, "branch1");
    }

    #[test]
    fn test_tag_on_branch_repairs_branch_change() {
        let mut b = Builder::new();
        for file in ["file1", "file2"] {
            b.symbol(file, "branch1", "1.1.0.2");
        }
        b.symbol("file1", "tag1", "1.1");
        b.symbol("file2", "tag1", "1.1.2.1");
        b.commit("c0", &["file1@1.1", "file2@1.1"]);
        b.commit("c1", &["file1@1.1.2.1"]);
        let c2 = b.commit("c2", &["file2@1.1.2.1"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits, 30);
        assert!(resolver.resolve(&names(&["tag1"])).unwrap());
        assert_eq!(resolver.resolved_tags()["tag1"], c2);
        let (commits, _, _) = resolver.into_parts();
        assert_eq!(b.ids(&commits), ["c0", "c2", "c1"]);
    }

    #[test]
    fn test_nested_branch_from_unchanged_files() {
        let mut b = Builder::new();
        b.symbol("file1", "branch1", "1.1.0.2");
        b.symbol("file2", "branch1", "1.1.0.2");
        b.symbol("file1", "nested", "1.1.2.1.0.2");
        b.symbol("file2", "nested", "1.1.0.4");
        let c0 = b.commit("c0", &["file1@1.1", "file2@1.1"]);
        let c1 = b.commit("c1", &["file1@1.1.2.1"]);
        b.commit("c2", &["file1@1.1.2.1.2.1"]);
        let commits = b.commits.clone();

        let mut resolver =
            Resolver::new(ResolveMode::Branches, &b.files, &mut b.arena, commits.clone(), 30);
        assert!(resolver.resolve(&names(&["branch1", "nested"])).unwrap());
        assert_eq!(resolver.resolved_tags()["branch1"], c0);
        assert_eq!(resolver.resolved_tags()["nested"], c1);
        assert_eq!(resolver.commits(), commits);
    }

    #[test]
    fn test_repair_rechecks_crossed_tag() {
        let mut b = Builder::new();
        b.symbol("file1", "tag1", "1.1");
        b.symbol("file2", "tag1", "1.2");
        b.symbol("file3", "tag1", "1.1");
        b.symbol("file1", "tag2", "1.2");
        b.symbol("file2", "tag2", "1.1");
        b.commit("c0", &["file1@1.1", "file2@1.1", "file3@1.1"]);
        b.commit("c1", &["file2@1.2"]);
        let c2 = b.commit("c2", &["file1@1.2"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits, 30);
        assert!(!resolver.resolve(&names(&["tag1", "tag2"])).unwrap());
        assert_eq!(resolver.resolved_tags().len(), 1);
        assert_eq!(resolver.resolved_tags()["tag2"], c2);
        let unresolved = resolver.unresolved_tags();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].name, "tag1");
        assert!(matches!(unresolved[0].reason, UnresolvedReason::Mismatch { .. }));
    }

    #[test]
    fn test_unknown_tag() {
        let mut b = Builder::new();
        b.commit("c0", &["file1@1.1"]);
        let commits = b.commits.clone();

        let mut resolver = Resolver::new(ResolveMode::Tags, &b.files, &mut b.arena, commits, 30);
        assert!(!resolver.resolve(&names(&["nope"])).unwrap());
        assert_eq!(resolver.unresolved_tags()[0].reason, UnresolvedReason::NoFiles);
    }
}
