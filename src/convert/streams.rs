use std::collections::BTreeMap;

use super::commit::CommitArena;
use crate::FHashMap;
use crate::cvs::file::MAIN_BRANCH;

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamError {
    MissingBranchpoint { branch: String },
    NotInStream { commit: String, branch: String },
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::MissingBranchpoint { ref branch } => {
                write!(f, "branch {branch} has commits but no branchpoint")
            }
            Self::NotInStream {
                ref commit,
                ref branch,
            } => write!(f, "commit {commit} is not part of branch {branch}"),
        }
    }
}

/// Ordered commits of every branch. Branches appear in order of their
/// first commit, `MAIN` first, followed by branches that have a
/// branchpoint but no commits.
pub(crate) struct BranchStreams {
    names: Vec<String>,
    streams: Vec<Vec<usize>>,
    slots: FHashMap<String, usize>,
    branchpoints: BTreeMap<String, usize>,
}

impl BranchStreams {
    /// Splits `commits` per branch and links every commit to its
    /// neighbours. The first commit of each branch gets the branchpoint as
    /// predecessor.
    pub(crate) fn build(
        arena: &mut CommitArena,
        commits: &[usize],
        branchpoints: BTreeMap<String, usize>,
    ) -> Result<Self, StreamError> {
        let mut streams = Self {
            names: Vec::new(),
            streams: Vec::new(),
            slots: FHashMap::default(),
            branchpoints,
        };

        streams.add_slot(MAIN_BRANCH);
        for &c in commits.iter() {
            let slot = streams.add_slot(&arena[c].branch);
            streams.streams[slot].push(c);
        }
        let empty: Vec<_> = streams
            .branchpoints
            .keys()
            .filter(|name| !streams.slots.contains_key(name.as_str()))
            .cloned()
            .collect();
        for name in empty {
            tracing::debug!("branch {name} has no commits");
            streams.add_slot(&name);
        }

        streams.relink(arena)?;
        Ok(streams)
    }

    fn add_slot(&mut self, branch: &str) -> usize {
        if let Some(&slot) = self.slots.get(branch) {
            return slot;
        }
        let slot = self.names.len();
        self.names.push(branch.into());
        self.streams.push(Vec::new());
        self.slots.insert(branch.into(), slot);
        slot
    }

    /// Number of branches.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub(crate) fn slot(&self, branch: &str) -> Option<usize> {
        self.slots.get(branch).copied()
    }

    #[inline]
    pub(crate) fn name(&self, slot: usize) -> &str {
        &self.names[slot]
    }

    #[inline]
    pub(crate) fn slot_commits(&self, slot: usize) -> &[usize] {
        &self.streams[slot]
    }

    pub(crate) fn commits(&self, branch: &str) -> Option<&[usize]> {
        self.slot(branch).map(|slot| self.slot_commits(slot))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.streams.iter().map(Vec::as_slice))
    }

    /// Last commit of a branch, or its branchpoint if it has none.
    pub(crate) fn head(&self, branch: &str) -> Option<usize> {
        self.commits(branch)
            .and_then(|commits| commits.last().copied())
            .or_else(|| self.branchpoint(branch))
    }

    pub(crate) fn branchpoint(&self, branch: &str) -> Option<usize> {
        self.branchpoints.get(branch).copied()
    }

    /// Whether some branch, with or without commits, sprouts from `commit`.
    pub(crate) fn is_branchpoint(&self, commit: usize) -> bool {
        self.branchpoints.values().any(|&c| c == commit)
    }

    /// Adds a commit at the end of a branch.
    pub(crate) fn append_commit(
        &mut self,
        arena: &mut CommitArena,
        branch: &str,
        commit: usize,
    ) -> Result<(), StreamError> {
        let slot = self.add_slot(branch);
        let stream = &mut self.streams[slot];

        let predecessor = match stream.last() {
            Some(&last) => {
                arena[last].successor = Some(commit);
                Some(last)
            }
            None if branch == MAIN_BRANCH => None,
            None => {
                let branchpoint =
                    self.branchpoints
                        .get(branch)
                        .copied()
                        .ok_or_else(|| StreamError::MissingBranchpoint {
                            branch: branch.into(),
                        })?;
                arena[branchpoint].branches.push(commit);
                Some(branchpoint)
            }
        };

        stream.push(commit);
        let index = stream.len();
        let new_commit = &mut arena[commit];
        new_commit.index = index;
        new_commit.predecessor = predecessor;
        new_commit.successor = None;
        Ok(())
    }

    /// Moves `commit` right after `after`, both on the same branch.
    pub(crate) fn move_commit_after(
        &mut self,
        arena: &mut CommitArena,
        commit: usize,
        after: usize,
    ) -> Result<(), StreamError> {
        let branch = arena[commit].branch.clone();
        let not_in_stream = |c: usize| StreamError::NotInStream {
            commit: arena[c].id.clone(),
            branch: branch.clone(),
        };

        let slot = self.slot(&branch).ok_or_else(|| not_in_stream(commit))?;
        let stream = &mut self.streams[slot];
        let from = stream
            .iter()
            .position(|&c| c == commit)
            .ok_or_else(|| not_in_stream(commit))?;
        stream.remove(from);
        let to = stream
            .iter()
            .position(|&c| c == after)
            .ok_or_else(|| not_in_stream(after))?;
        stream.insert(to + 1, commit);

        self.relink(arena)
    }

    fn relink(&mut self, arena: &mut CommitArena) -> Result<(), StreamError> {
        for &c in self.streams.iter().flatten() {
            let commit = &mut arena[c];
            commit.index = 0;
            commit.predecessor = None;
            commit.successor = None;
            commit.branches.clear();
        }

        for (name, stream) in self.names.iter().zip(self.streams.iter()) {
            for (i, &c) in stream.iter().enumerate() {
                let commit = &mut arena[c];
                commit.index = i + 1;
                commit.successor = stream.get(i + 1).copied();
                if i != 0 {
                    commit.predecessor = Some(stream[i - 1]);
                }
            }

            if name == MAIN_BRANCH {
                continue;
            }
            if let Some(&first) = stream.first() {
                let branchpoint = self.branchpoints.get(name).copied().ok_or_else(|| {
                    tracing::error!("branch {name} has no branchpoint");
                    StreamError::MissingBranchpoint {
                        branch: name.clone(),
                    }
                })?;
                arena[first].predecessor = Some(branchpoint);
                arena[branchpoint].branches.push(first);
            }
        }

        Ok(())
    }
}
