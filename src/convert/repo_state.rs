use super::commit::Commit;
use crate::cvs::file::{FileSet, MAIN_BRANCH};
use crate::cvs::revision::Revision;
use crate::{FHashMap, FHashSet};

/// Raised when a commit applies a revision that does not directly follow
/// the revision the branch currently holds for that file.
#[derive(Clone, Debug)]
pub(crate) struct ConsistencyError {
    pub(crate) branch: String,
    pub(crate) file: String,
    pub(crate) previous: Revision,
    pub(crate) revision: Revision,
    pub(crate) commit: String,
}

impl std::fmt::Display for ConsistencyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "commit {} sets {} to r{} on branch {}, but r{} does not directly precede it",
            self.commit, self.file, self.revision, self.branch, self.previous,
        )
    }
}

/// Live revision of every file on one branch. Absent files do not exist
/// (never added, or deleted).
#[derive(Clone, Default, Debug)]
pub(crate) struct BranchState {
    revisions: FHashMap<usize, Revision>,
}

impl BranchState {
    #[inline]
    pub(crate) fn get(&self, file: usize) -> Option<&Revision> {
        self.revisions.get(&file)
    }

    #[inline]
    pub(crate) fn contains(&self, file: usize) -> bool {
        self.revisions.contains_key(&file)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &Revision)> {
        self.revisions.iter().map(|(&file, rev)| (file, rev))
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.revisions.len()
    }

    fn apply(&mut self, commit: &Commit, files: &FileSet) -> Result<(), ConsistencyError> {
        for file_rev in commit.files.iter() {
            if let Some(previous) = self.revisions.get(&file_rev.file) {
                if !previous.directly_precedes(&file_rev.revision) {
                    return Err(ConsistencyError {
                        branch: commit.branch.clone(),
                        file: files[file_rev.file].name.clone(),
                        previous: previous.clone(),
                        revision: file_rev.revision.clone(),
                        commit: commit.id.clone(),
                    });
                }
            }

            if file_rev.is_dead {
                self.revisions.remove(&file_rev.file);
            } else {
                self.revisions
                    .insert(file_rev.file, file_rev.revision.clone());
            }
        }
        Ok(())
    }
}

/// Simulated repository, advanced one commit at a time.
///
/// A branch state is created when the first commit on that branch is
/// applied, as a copy of the parent branch where every file is reset to
/// the revision the branch sprouts from. Files without the branch symbol
/// are not on the branch.
#[derive(Clone, Default)]
pub(crate) struct RepositoryState {
    branches: FHashMap<String, BranchState>,
    known_files: FHashSet<usize>,
}

impl RepositoryState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn branch(&self, name: &str) -> Option<&BranchState> {
        self.branches.get(name)
    }

    pub(crate) fn apply(&mut self, commit: &Commit, files: &FileSet) -> Result<(), ConsistencyError> {
        if !self.branches.contains_key(&commit.branch) {
            let parent = commit.files.iter().find_map(|file_rev| {
                if file_rev.revision.is_trunk() {
                    None
                } else {
                    files[file_rev.file].parent_branch_of(&file_rev.revision)
                }
            });
            self.create_branch(&commit.branch, parent, files);
        }

        self.known_files
            .extend(commit.files.iter().map(|file_rev| file_rev.file));

        let state = self
            .branches
            .get_mut(&commit.branch)
            .expect("branch state was just created");
        state.apply(commit, files)
    }

    /// Replays commits in order.
    pub(crate) fn apply_all<'a>(
        &mut self,
        commits: impl IntoIterator<Item = &'a Commit>,
        files: &FileSet,
    ) -> Result<(), ConsistencyError> {
        for commit in commits {
            self.apply(commit, files)?;
        }
        Ok(())
    }

    /// Seeds `branch` from per-file branchpoint metadata rather than copying
    /// the parent's current state: each file known so far starts at the
    /// revision its branch symbol sprouts from, even if the parent has
    /// moved past it. Files whose branchpoint is dead start absent.
    fn create_branch(&mut self, branch: &str, parent: Option<&str>, files: &FileSet) {
        let mut state = BranchState::default();
        if branch != MAIN_BRANCH {
            let candidates = parent
                .and_then(|parent| self.branches.get(parent))
                .into_iter()
                .flat_map(|parent_state| parent_state.revisions.keys())
                .chain(self.known_files.iter());
            for &file in candidates {
                let info = &files[file];
                if let Some(root) = info.branchpoint(branch) {
                    if !info.is_dead(&root) {
                        state.revisions.insert(file, root);
                    }
                }
            }
            tracing::trace!(
                "created state for branch {branch} from {} with {} files",
                parent.unwrap_or("nothing"),
                state.len(),
            );
        }
        self.branches.insert(branch.into(), state);
    }
}
