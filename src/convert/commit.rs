use crate::cvs::file::{FileRevision, FileSet};

/// A group of file revisions that form one logical change.
#[derive(Clone, Debug)]
pub(crate) struct Commit {
    pub(crate) id: String,
    pub(crate) branch: String,
    pub(crate) time: chrono::DateTime<chrono::Utc>,
    pub(crate) author: String,
    pub(crate) message: String,
    pub(crate) files: Vec<FileRevision>,
    /// 1-based position in the branch stream, 0 until streams are built.
    pub(crate) index: usize,
    pub(crate) predecessor: Option<usize>,
    pub(crate) successor: Option<usize>,
    pub(crate) merge_from: Option<usize>,
    /// First commits of the branches rooted at this commit.
    pub(crate) branches: Vec<usize>,
}

impl Commit {
    /// `files` must not be empty.
    pub(crate) fn new(id: String, branch: String, files: Vec<FileRevision>) -> Self {
        let first = &files[0];
        let author = first.author.clone();
        let message = first.message.clone();
        let time = files
            .iter()
            .map(|f| f.time)
            .min()
            .unwrap_or(first.time);

        Self {
            id,
            branch,
            time,
            author,
            message,
            files,
            index: 0,
            predecessor: None,
            successor: None,
            merge_from: None,
            branches: Vec::new(),
        }
    }

    /// Replaces the file list, recomputing the commit time.
    pub(crate) fn set_files(&mut self, files: Vec<FileRevision>) {
        if let Some(time) = files.iter().map(|f| f.time).min() {
            self.time = time;
        }
        self.files = files;
    }

    pub(crate) fn merged_files(&self) -> impl Iterator<Item = &FileRevision> {
        self.files.iter().filter(|f| f.mergepoint.is_some())
    }

    #[inline]
    pub(crate) fn is_branchpoint(&self) -> bool {
        !self.branches.is_empty()
    }

    pub(crate) fn touches_file(&self, file: usize) -> bool {
        self.files.iter().any(|f| f.file == file)
    }

    pub(crate) fn describe<'a>(&'a self, files: &'a FileSet) -> CommitDescription<'a> {
        CommitDescription {
            commit: self,
            files,
        }
    }
}

/// Multi-line human readable form of a commit, for logs.
pub(crate) struct CommitDescription<'a> {
    commit: &'a Commit,
    files: &'a FileSet,
}

impl std::fmt::Display for CommitDescription<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let commit = self.commit;
        write!(
            f,
            "commit {} on {} ({}, {})",
            commit.id,
            commit.branch,
            commit.time.format("%Y-%m-%d %H:%M:%S"),
            commit.author,
        )?;
        for file_rev in commit.files.iter() {
            write!(
                f,
                "\n  {} r{}{}",
                self.files[file_rev.file].name,
                file_rev.revision,
                if file_rev.is_dead { " (dead)" } else { "" },
            )?;
            if let Some(ref mergepoint) = file_rev.mergepoint {
                write!(f, " merged from r{mergepoint}")?;
            }
        }
        Ok(())
    }
}

/// Owner of every commit. Links between commits are indices into the
/// arena; splitting a commit adds a new entry and never removes one.
#[derive(Clone, Default)]
pub(crate) struct CommitArena {
    commits: Vec<Commit>,
}

impl CommitArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, commit: Commit) -> usize {
        let i = self.commits.len();
        self.commits.push(commit);
        i
    }

    /// Moves every commit into the arena, returning their indices in
    /// the same order.
    pub(crate) fn extend(&mut self, commits: Vec<Commit>) -> Vec<usize> {
        commits.into_iter().map(|c| self.push(c)).collect()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.commits.len()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.commits.truncate(len);
    }

    #[cfg(test)]
    pub(crate) fn find_by_id(&self, id: &str) -> Option<usize> {
        self.commits.iter().position(|c| c.id == id)
    }
}

impl std::ops::Index<usize> for CommitArena {
    type Output = Commit;

    #[inline]
    fn index(&self, i: usize) -> &Commit {
        &self.commits[i]
    }
}

impl std::ops::IndexMut<usize> for CommitArena {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut Commit {
        &mut self.commits[i]
    }
}

/// Registers, for every file revision, the commit that introduced it.
pub(crate) fn index_file_commits(files: &mut FileSet, arena: &CommitArena, commits: &[usize]) {
    for file in files.iter_mut() {
        file.clear_commits();
    }
    for &c in commits.iter() {
        for file_rev in arena[c].files.iter() {
            files[file_rev.file].set_commit(file_rev.revision.clone(), c);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::index_file_commits;
    use super::test_utils::{Builder, time};
    use crate::cvs::revision::rev;

    #[test]
    fn test_commit_attributes() {
        let mut b = Builder::new();
        b.symbol("file1", "branch1", "1.1.0.2");
        let c0 = b.commit("c0", &["file1@1.1", "file2@1.1"]);
        let c1 = b.commit("c1", &["file1@1.1.2.1<1.1", "file2@1.2!"]);

        assert_eq!(b.arena[c0].branch, "MAIN");
        assert_eq!(b.arena[c0].time, time(60));
        assert_eq!(b.arena[c1].branch, "branch1");
        assert_eq!(b.arena[c1].merged_files().count(), 1);
        assert!(b.arena[c1].files[1].is_dead);
        assert!(b.arena[c1].touches_file(b.files.find("file2").unwrap()));
        assert!(!b.arena[c0].is_branchpoint());
        assert_eq!(b.arena.find_by_id("c1"), Some(c1));
    }

    #[test]
    fn test_index_file_commits() {
        let mut b = Builder::new();
        let c0 = b.commit("c0", &["file1@1.1"]);
        let c1 = b.commit("c1", &["file1@1.2"]);
        let commits = b.commits.clone();
        index_file_commits(&mut b.files, &b.arena, &commits);

        let file1 = b.files.find("file1").unwrap();
        assert_eq!(b.files[file1].commit_for(&rev("1.1")), Some(c0));
        assert_eq!(b.files[file1].commit_for(&rev("1.2")), Some(c1));
        assert_eq!(b.files[file1].commit_for(&rev("1.3")), None);
    }
}
