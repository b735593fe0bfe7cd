use std::collections::BTreeMap;

use super::revision::Revision;
use crate::{FHashMap, FHashSet};

pub(crate) const MAIN_BRANCH: &str = "MAIN";

/// Per-file metadata: symbolic names, the branch the file was added on and
/// the commit that introduced each revision.
pub(crate) struct FileInfo {
    pub(crate) name: String,
    tags: BTreeMap<String, Revision>,
    tags_by_rev: FHashMap<Revision, Vec<String>>,
    /// branch name -> branch number
    branches: BTreeMap<String, Revision>,
    /// branch number -> branch name
    branch_names: FHashMap<Revision, String>,
    /// branch root revision -> names of the branches sprouting from it
    branches_by_root: FHashMap<Revision, Vec<String>>,
    dead_revisions: FHashSet<Revision>,
    branch_added_on: String,
    commits: FHashMap<Revision, usize>,
}

impl FileInfo {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            tags: BTreeMap::new(),
            tags_by_rev: FHashMap::default(),
            branches: BTreeMap::new(),
            branch_names: FHashMap::default(),
            branches_by_root: FHashMap::default(),
            dead_revisions: FHashSet::default(),
            branch_added_on: MAIN_BRANCH.into(),
            commits: FHashMap::default(),
        }
    }

    /// Registers a symbolic name. Branch symbols (`x.y.0.n`) and branch
    /// numbers (`x.y.z`) define branches, anything else is a tag.
    pub(crate) fn add_symbol(&mut self, name: &str, revision: Revision) {
        let branch_number = if revision.is_branch_symbol() {
            revision.branch_symbol_to_number()
        } else if revision.is_branch_number() {
            Some(revision.clone())
        } else {
            None
        };

        if let Some(branch_number) = branch_number {
            if let Some(root) = branch_number.branch_root() {
                self.branches_by_root
                    .entry(root)
                    .or_default()
                    .push(name.into());
            }
            self.branch_names
                .insert(branch_number.clone(), name.into());
            self.branches.insert(name.into(), branch_number);
        } else {
            self.tags_by_rev
                .entry(revision.clone())
                .or_default()
                .push(name.into());
            self.tags.insert(name.into(), revision);
        }
    }

    pub(crate) fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.keys().map(String::as_str)
    }

    pub(crate) fn branches(&self) -> impl Iterator<Item = &str> {
        self.branches.keys().map(String::as_str)
    }

    pub(crate) fn tag_revision(&self, tag: &str) -> Option<&Revision> {
        self.tags.get(tag)
    }

    pub(crate) fn tags_at(&self, revision: &Revision) -> &[String] {
        self.tags_by_rev
            .get(revision)
            .map_or(&[], Vec::as_slice)
    }

    /// The revision `branch` sprouts from in this file.
    pub(crate) fn branchpoint(&self, branch: &str) -> Option<Revision> {
        self.branches.get(branch).and_then(Revision::branch_root)
    }

    /// Names of the branches rooted at `revision`.
    pub(crate) fn branches_at(&self, revision: &Revision) -> &[String] {
        self.branches_by_root
            .get(revision)
            .map_or(&[], Vec::as_slice)
    }

    /// Name of the branch `revision` lives on, `None` for revisions on
    /// branches without a symbolic name.
    pub(crate) fn branch_of(&self, revision: &Revision) -> Option<&str> {
        match revision.branch_stem() {
            None => Some(MAIN_BRANCH),
            Some(stem) => self.branch_names.get(&stem).map(String::as_str),
        }
    }

    /// Name of the branch the branch holding `revision` was forked from.
    pub(crate) fn parent_branch_of(&self, revision: &Revision) -> Option<&str> {
        let root = revision.branch_stem()?.branch_root()?;
        self.branch_of(&root)
    }

    pub(crate) fn mark_dead(&mut self, revision: Revision) {
        self.dead_revisions.insert(revision);
    }

    pub(crate) fn is_dead(&self, revision: &Revision) -> bool {
        self.dead_revisions.contains(revision)
    }

    pub(crate) fn branch_added_on(&self) -> &str {
        &self.branch_added_on
    }

    pub(crate) fn set_branch_added_on(&mut self, branch: &str) {
        self.branch_added_on = branch.into();
    }

    pub(crate) fn set_commit(&mut self, revision: Revision, commit: usize) {
        self.commits.insert(revision, commit);
    }

    /// The commit that introduced `revision`.
    pub(crate) fn commit_for(&self, revision: &Revision) -> Option<usize> {
        self.commits.get(revision).copied()
    }

    pub(crate) fn clear_commits(&mut self) {
        self.commits.clear();
    }
}

/// Arena of every file seen in the history.
#[derive(Default)]
pub(crate) struct FileSet {
    files: Vec<FileInfo>,
    by_name: FHashMap<String, usize>,
}

impl FileSet {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: &str) -> usize {
        if let Some(&i) = self.by_name.get(name) {
            return i;
        }
        let i = self.files.len();
        self.files.push(FileInfo::new(name.into()));
        self.by_name.insert(name.into(), i);
        i
    }

    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.files.len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &FileInfo)> {
        self.files.iter().enumerate()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileInfo> {
        self.files.iter_mut()
    }
}

impl std::ops::Index<usize> for FileSet {
    type Output = FileInfo;

    #[inline]
    fn index(&self, i: usize) -> &FileInfo {
        &self.files[i]
    }
}

impl std::ops::IndexMut<usize> for FileSet {
    #[inline]
    fn index_mut(&mut self, i: usize) -> &mut FileInfo {
        &mut self.files[i]
    }
}

/// One revision of one file, as found in the log.
#[derive(Clone, Debug)]
pub(crate) struct FileRevision {
    pub(crate) file: usize,
    pub(crate) revision: Revision,
    pub(crate) mergepoint: Option<Revision>,
    pub(crate) time: chrono::DateTime<chrono::Utc>,
    pub(crate) author: String,
    pub(crate) commit_id: String,
    pub(crate) is_dead: bool,
    pub(crate) message: String,
}

#[cfg(test)]
mod tests {
    use super::{FileInfo, FileSet, MAIN_BRANCH};
    use crate::cvs::revision::rev;

    #[test]
    fn test_symbols() {
        let mut file = FileInfo::new("file.c".into());
        file.add_symbol("tag1", rev("1.2"));
        file.add_symbol("tag2", rev("1.2"));
        file.add_symbol("branch1", rev("1.2.0.2"));
        file.add_symbol("VENDOR", rev("1.1.1"));

        assert_eq!(file.tag_revision("tag1"), Some(&rev("1.2")));
        assert_eq!(file.tags_at(&rev("1.2")), ["tag1", "tag2"]);
        assert!(file.tags_at(&rev("1.1")).is_empty());
        assert_eq!(file.branchpoint("branch1"), Some(rev("1.2")));
        assert_eq!(file.branchpoint("VENDOR"), Some(rev("1.1")));
        assert_eq!(file.branches_at(&rev("1.2")), ["branch1"]);
        assert_eq!(file.tags().collect::<Vec<_>>(), ["tag1", "tag2"]);
        assert_eq!(file.branches().collect::<Vec<_>>(), ["VENDOR", "branch1"]);
    }

    #[test]
    fn test_branch_of() {
        let mut file = FileInfo::new("file.c".into());
        file.add_symbol("branch1", rev("1.2.0.2"));
        file.add_symbol("branch2", rev("1.2.2.3.0.4"));

        assert_eq!(file.branch_of(&rev("1.5")), Some(MAIN_BRANCH));
        assert_eq!(file.branch_of(&rev("1.2.2.1")), Some("branch1"));
        assert_eq!(file.branch_of(&rev("1.2.2.3.4.1")), Some("branch2"));
        assert_eq!(file.branch_of(&rev("1.2.6.1")), None);

        assert_eq!(file.parent_branch_of(&rev("1.2.2.1")), Some(MAIN_BRANCH));
        assert_eq!(file.parent_branch_of(&rev("1.2.2.3.4.1")), Some("branch1"));
        assert_eq!(file.parent_branch_of(&rev("1.3")), None);
    }

    #[test]
    fn test_file_set() {
        let mut files = FileSet::new();
        let a = files.insert("a");
        let b = files.insert("b");
        assert_ne!(a, b);
        assert_eq!(files.insert("a"), a);
        assert_eq!(files.find("b"), Some(b));
        assert_eq!(files.find("c"), None);
        assert_eq!(files.len(), 2);
        assert_eq!(files[a].branch_added_on(), MAIN_BRANCH);
    }
}
