use std::borrow::Cow;

use super::manual_branch::BranchpointRule;
use crate::FHashMap;
use crate::cvs::file::MAIN_BRANCH;
use crate::path_pattern::PathPattern;

pub(crate) struct InitOptions {
    pub(crate) include_files: PathPattern,
    pub(crate) exclude_files: PathPattern,
    pub(crate) head_only: PathPattern,
    pub(crate) include_tags: PathPattern,
    pub(crate) exclude_tags: PathPattern,
    pub(crate) include_branches: PathPattern,
    pub(crate) exclude_branches: PathPattern,
    pub(crate) branchpoint_rule: Option<BranchpointRule>,
    pub(crate) partial_tag_threshold: usize,
    pub(crate) ignore_unresolved_tags: bool,
    pub(crate) head_only_author: String,
    pub(crate) cvs_processes: usize,
}

pub(crate) struct Options {
    include_files: PathPattern,
    exclude_files: PathPattern,
    head_only: PathPattern,
    include_tags: PathPattern,
    exclude_tags: PathPattern,
    include_branches: PathPattern,
    exclude_branches: PathPattern,
    rename_branches: NameRenamer,
    rename_tags: NameRenamer,
    pub(super) branchpoint_rule: Option<BranchpointRule>,
    pub(super) partial_tag_threshold: usize,
    pub(super) ignore_unresolved_tags: bool,
    pub(super) head_only_author: String,
    pub(super) cvs_processes: usize,
}

/// How the history of a file is imported.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum FileClass {
    Included,
    /// Only the latest revision on each branch is imported.
    HeadOnly,
    Excluded,
}

#[derive(Debug)]
pub(crate) struct RenameAddError;

impl Options {
    pub(crate) fn new(init: InitOptions) -> Self {
        Self {
            include_files: init.include_files,
            exclude_files: init.exclude_files,
            head_only: init.head_only,
            include_tags: init.include_tags,
            exclude_tags: init.exclude_tags,
            include_branches: init.include_branches,
            exclude_branches: init.exclude_branches,
            rename_branches: NameRenamer::new(),
            rename_tags: NameRenamer::new(),
            branchpoint_rule: init.branchpoint_rule,
            partial_tag_threshold: init.partial_tag_threshold,
            ignore_unresolved_tags: init.ignore_unresolved_tags,
            head_only_author: init.head_only_author,
            cvs_processes: init.cvs_processes,
        }
    }

    pub(crate) fn add_branch_rename(&mut self, from: &str, to: &str) -> Result<(), RenameAddError> {
        self.rename_branches.add(from, to)
    }

    pub(crate) fn add_tag_rename(&mut self, from: &str, to: &str) -> Result<(), RenameAddError> {
        self.rename_tags.add(from, to)
    }

    /// Exclusion wins over inclusion. An empty include list includes
    /// every file.
    pub(crate) fn classify_file(&self, path: &str) -> FileClass {
        if self.exclude_files.is_match(path)
            || (!self.include_files.is_empty() && !self.include_files.is_match(path))
        {
            FileClass::Excluded
        } else if self.head_only.is_match(path) {
            FileClass::HeadOnly
        } else {
            FileClass::Included
        }
    }

    pub(crate) fn import_tag(&self, name: &str) -> bool {
        filter_name(&self.include_tags, &self.exclude_tags, name)
    }

    /// `MAIN` is always imported.
    pub(crate) fn import_branch(&self, name: &str) -> bool {
        name == MAIN_BRANCH || filter_name(&self.include_branches, &self.exclude_branches, name)
    }

    /// Git branch name for a CVS branch, before legalization.
    pub(crate) fn git_branch_name<'a>(&'a self, name: &'a str) -> Cow<'a, str> {
        match self.rename_branches.rename(name) {
            Cow::Borrowed(MAIN_BRANCH) => Cow::Borrowed("master"),
            renamed => renamed,
        }
    }

    /// Git tag name for a CVS tag, before legalization.
    pub(crate) fn git_tag_name<'a>(&'a self, name: &'a str) -> Cow<'a, str> {
        self.rename_tags.rename(name)
    }
}

fn filter_name(include: &PathPattern, exclude: &PathPattern, name: &str) -> bool {
    !exclude.is_match(name) && (include.is_empty() || include.is_match(name))
}

/// Renames `from` to `to`, or every name starting with `from*` by
/// replacing the prefix with `to*`.
struct NameRenamer {
    exact: FHashMap<String, String>,
    prefix: Vec<(String, String)>,
}

impl NameRenamer {
    fn new() -> Self {
        Self {
            exact: FHashMap::default(),
            prefix: Vec::new(),
        }
    }

    fn add(&mut self, from: &str, to: &str) -> Result<(), RenameAddError> {
        if let Some(from_prefix) = from.strip_suffix('*') {
            let to_prefix = to.strip_suffix('*').ok_or(RenameAddError)?;
            if from_prefix.contains('*') || to_prefix.contains('*') {
                return Err(RenameAddError);
            }
            self.prefix.push((from_prefix.into(), to_prefix.into()));
        } else {
            if from.contains('*') || to.contains('*') {
                return Err(RenameAddError);
            }
            self.exact.insert(from.into(), to.into());
        }
        Ok(())
    }

    fn rename<'a>(&'a self, name: &'a str) -> Cow<'a, str> {
        if let Some(to) = self.exact.get(name) {
            return Cow::Borrowed(to);
        }
        // longest matching prefix wins
        self.prefix
            .iter()
            .filter(|(from, _)| name.starts_with(from.as_str()))
            .max_by_key(|(from, _)| from.len())
            .map_or(Cow::Borrowed(name), |(from, to)| {
                Cow::Owned(format!("{to}{}", &name[from.len()..]))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::{FileClass, InitOptions, Options};
    use crate::path_pattern::{PathPattern, PatternKind};

    fn paths(patterns: &[&str]) -> PathPattern {
        PathPattern::new(patterns.iter().copied(), PatternKind::Path).unwrap()
    }

    fn names(patterns: &[&str]) -> PathPattern {
        PathPattern::new(patterns.iter().copied(), PatternKind::Name).unwrap()
    }

    fn default_init() -> InitOptions {
        InitOptions {
            include_files: PathPattern::default(),
            exclude_files: PathPattern::default(),
            head_only: PathPattern::default(),
            include_tags: PathPattern::default(),
            exclude_tags: PathPattern::default(),
            include_branches: PathPattern::default(),
            exclude_branches: PathPattern::default(),
            branchpoint_rule: None,
            partial_tag_threshold: 30,
            ignore_unresolved_tags: false,
            head_only_author: "cvs2git".into(),
            cvs_processes: 1,
        }
    }

    #[test]
    fn test_classify_file() {
        let options = Options::new(InitOptions {
            include_files: paths(&["src/**", "README"]),
            exclude_files: paths(&["**/*.o"]),
            head_only: paths(&["src/generated/**"]),
            ..default_init()
        });

        assert_eq!(options.classify_file("README"), FileClass::Included);
        assert_eq!(options.classify_file("src/main.c"), FileClass::Included);
        assert_eq!(options.classify_file("src/main.o"), FileClass::Excluded);
        assert_eq!(options.classify_file("doc/manual"), FileClass::Excluded);
        assert_eq!(
            options.classify_file("src/generated/parser.c"),
            FileClass::HeadOnly,
        );
    }

    #[test]
    fn test_tag_and_branch_filters() {
        let options = Options::new(InitOptions {
            include_tags: names(&["REL_*"]),
            exclude_tags: names(&["REL_*_PRE"]),
            exclude_branches: names(&["tmp-*", "MAIN"]),
            ..default_init()
        });

        assert!(options.import_tag("REL_1"));
        assert!(!options.import_tag("REL_1_PRE"));
        assert!(!options.import_tag("snapshot"));

        assert!(options.import_branch("feature"));
        assert!(!options.import_branch("tmp-x"));
        assert!(options.import_branch("MAIN"));
    }

    #[test]
    fn test_renames() {
        let mut options = Options::new(default_init());
        options.add_branch_rename("MAIN", "trunk").unwrap();
        options.add_branch_rename("b_*", "branch/*").unwrap();
        options.add_branch_rename("b_long_*", "long/*").unwrap();
        options.add_tag_rename("RELEASE_1_0", "v1.0").unwrap();
        assert!(options.add_tag_rename("a*", "b").is_err());
        assert!(options.add_tag_rename("a*b", "c").is_err());

        assert_eq!(options.git_branch_name("MAIN"), "trunk");
        assert_eq!(options.git_branch_name("b_fix"), "branch/fix");
        assert_eq!(options.git_branch_name("b_long_x"), "long/x");
        assert_eq!(options.git_branch_name("other"), "other");
        assert_eq!(options.git_tag_name("RELEASE_1_0"), "v1.0");
        assert_eq!(options.git_tag_name("RELEASE_2_0"), "RELEASE_2_0");

        let options = Options::new(default_init());
        assert_eq!(options.git_branch_name("MAIN"), "master");
    }
}
