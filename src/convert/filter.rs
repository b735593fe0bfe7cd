use std::collections::BTreeSet;

use super::commit::{Commit, CommitArena};
use super::options::{FileClass, Options};
use super::streams::{BranchStreams, StreamError};
use crate::cvs::file::{FileInfo, FileRevision, FileSet, MAIN_BRANCH};
use crate::cvs::revision::Revision;
use crate::{FHashMap, FHashSet};

pub(crate) struct Filtered {
    pub(crate) commits: Vec<Commit>,
    /// Revisions of head-only files, imported later as one commit per
    /// branch.
    pub(crate) head_only: Vec<FileRevision>,
}

/// Drops excluded files and branches. Commits left without files are
/// dropped as well.
pub(crate) fn filter_commits(options: &Options, files: &FileSet, commits: Vec<Commit>) -> Filtered {
    let classes: Vec<_> = files
        .iter()
        .map(|(_, info)| options.classify_file(&info.name))
        .collect();
    let mut excluded_branches = FHashMap::<String, bool>::default();

    let mut kept = Vec::with_capacity(commits.len());
    let mut head_only = Vec::new();
    let mut num_dropped = 0usize;
    for mut commit in commits {
        let excluded = *excluded_branches
            .entry(commit.branch.clone())
            .or_insert_with(|| {
                commit
                    .files
                    .first()
                    .is_some_and(|file_rev| {
                        on_excluded_branch(options, &files[file_rev.file], &file_rev.revision)
                    })
            });
        if excluded {
            tracing::trace!("dropping commit {} on excluded branch {}", commit.id, commit.branch);
            num_dropped += 1;
            continue;
        }

        let num_files = commit.files.len();
        let mut included = Vec::with_capacity(num_files);
        for file_rev in std::mem::take(&mut commit.files) {
            match classes[file_rev.file] {
                FileClass::Included => included.push(file_rev),
                FileClass::HeadOnly => head_only.push(file_rev),
                FileClass::Excluded => {}
            }
        }

        if included.is_empty() {
            tracing::trace!("dropping commit {}: all its files are excluded", commit.id);
            num_dropped += 1;
        } else if included.len() == num_files {
            commit.files = included;
            kept.push(commit);
        } else {
            commit.set_files(included);
            kept.push(commit);
        }
    }

    if num_dropped != 0 {
        tracing::info!("{num_dropped} commits dropped by filters");
    }

    Filtered {
        commits: kept,
        head_only,
    }
}

/// Whether the branch `revision` lives on, or any branch it sprouts
/// from, is excluded.
fn on_excluded_branch(options: &Options, info: &FileInfo, revision: &Revision) -> bool {
    let mut revision = revision.clone();
    while !revision.is_trunk() {
        let Some(branch) = info.branch_of(&revision) else {
            return true;
        };
        if !options.import_branch(branch) {
            return true;
        }
        match revision.branch_stem().and_then(|stem| stem.branch_root()) {
            Some(root) => revision = root,
            None => break,
        }
    }
    false
}

/// Tags of `committed` files that are imported, sorted.
pub(crate) fn tag_names(options: &Options, files: &FileSet, committed: &FHashSet<usize>) -> Vec<String> {
    let names: BTreeSet<&str> = committed
        .iter()
        .flat_map(|&file| files[file].tags())
        .filter(|name| options.import_tag(name))
        .collect();
    names.into_iter().map(String::from).collect()
}

/// Branches of `committed` files that are imported and sprout from
/// imported branches, sorted.
pub(crate) fn branch_names(
    options: &Options,
    files: &FileSet,
    committed: &FHashSet<usize>,
) -> Vec<String> {
    let mut names = BTreeSet::new();
    for &file in committed.iter() {
        let info = &files[file];
        for name in info.branches() {
            if !options.import_branch(name) {
                continue;
            }
            let excluded_parent = info
                .branchpoint(name)
                .is_some_and(|root| on_excluded_branch(options, info, &root));
            if !excluded_parent {
                names.insert(name);
            }
        }
    }
    names.into_iter().map(String::from).collect()
}

/// Appends to every branch a commit that sets each head-only file to its
/// latest revision on that branch. Returns the new commits.
pub(crate) fn create_head_only_commits(
    options: &Options,
    files: &FileSet,
    arena: &mut CommitArena,
    streams: &mut BranchStreams,
    head_only: Vec<FileRevision>,
) -> Result<Vec<usize>, StreamError> {
    if head_only.is_empty() {
        return Ok(Vec::new());
    }

    let _span = tracing::info_span!("head-only").entered();

    let mut by_revision = FHashMap::<(usize, Revision), FileRevision>::default();
    // (branch, file) -> latest revision on the branch
    let mut latest = FHashMap::<(String, usize), Revision>::default();
    for file_rev in head_only {
        let info = &files[file_rev.file];
        let Some(branch) = info.branch_of(&file_rev.revision) else {
            continue;
        };
        let key = (branch.to_string(), file_rev.file);
        let newer = latest
            .get(&key)
            .is_none_or(|current| by_revision[&(file_rev.file, current.clone())].time < file_rev.time);
        if newer {
            latest.insert(key, file_rev.revision.clone());
        }
        by_revision.insert((file_rev.file, file_rev.revision.clone()), file_rev);
    }

    let mut head_only_files: Vec<_> = by_revision.keys().map(|&(file, _)| file).collect();
    head_only_files.sort_unstable();
    head_only_files.dedup();

    let branches: Vec<_> = streams.iter().map(|(name, _)| name.to_string()).collect();
    let mut new_commits = Vec::new();
    for branch in branches {
        let mut file_revs = Vec::new();
        for &file in head_only_files.iter() {
            let revision = latest
                .get(&(branch.clone(), file))
                .cloned()
                .or_else(|| {
                    if branch == MAIN_BRANCH {
                        None
                    } else {
                        files[file].branchpoint(&branch)
                    }
                });
            let Some(revision) = revision else {
                continue;
            };
            match by_revision.get(&(file, revision)) {
                Some(file_rev) if !file_rev.is_dead => file_revs.push(file_rev.clone()),
                _ => {}
            }
        }
        if file_revs.is_empty() {
            continue;
        }

        let id = format!("headonly-{branch}");
        let head_time = streams.head(&branch).map(|head| arena[head].time);
        for file_rev in file_revs.iter_mut() {
            file_rev.commit_id = id.clone();
        }
        let mut commit = Commit::new(id, branch.clone(), file_revs);
        commit.author = options.head_only_author.clone();
        commit.message = format!("Adding head-only files to {branch}");
        commit.time = commit
            .files
            .iter()
            .map(|f| f.time)
            .chain(head_time)
            .max()
            .unwrap_or(commit.time);

        tracing::debug!(
            "adding {} head-only files to {branch}",
            commit.files.len(),
        );
        let c = arena.push(commit);
        streams.append_commit(arena, &branch, c)?;
        new_commits.push(c);
    }

    Ok(new_commits)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{branch_names, create_head_only_commits, filter_commits, tag_names};
    use crate::FHashSet;
    use crate::convert::commit::test_utils::Builder;
    use crate::convert::options::{InitOptions, Options};
    use crate::convert::streams::BranchStreams;
    use crate::path_pattern::{PathPattern, PatternKind};

    fn options(exclude_files: &[&str], head_only: &[&str], exclude_branches: &[&str]) -> Options {
        Options::new(InitOptions {
            include_files: PathPattern::default(),
            exclude_files: PathPattern::new(exclude_files.iter().copied(), PatternKind::Path)
                .unwrap(),
            head_only: PathPattern::new(head_only.iter().copied(), PatternKind::Path).unwrap(),
            include_tags: PathPattern::default(),
            exclude_tags: PathPattern::default(),
            include_branches: PathPattern::default(),
            exclude_branches: PathPattern::new(exclude_branches.iter().copied(), PatternKind::Name)
                .unwrap(),
            branchpoint_rule: None,
            partial_tag_threshold: 30,
            ignore_unresolved_tags: false,
            head_only_author: "importer".into(),
            cvs_processes: 1,
        })
    }

    #[test]
    fn test_filter_files_and_branches() {
        let mut b = Builder::new();
        b.symbol("a.c", "branch1", "1.1.0.2");
        b.symbol("a.c", "nested", "1.1.2.1.0.2");
        b.commit("c0", &["a.c@1.1", "a.o@1.1", "gen.c@1.1"]);
        b.commit("c1", &["a.o@1.2"]);
        b.commit("c2", &["a.c@1.1.2.1"]);
        b.commit("c3", &["a.c@1.1.2.1.2.1"]);
        b.commit("c4", &["a.c@1.2", "gen.c@1.2"]);
        let commits: Vec<_> = b.commits.iter().map(|&c| b.arena[c].clone()).collect();

        let options = options(&["*.o"], &["gen.c"], &["branch1"]);
        let filtered = filter_commits(&options, &b.files, commits);

        let ids: Vec<_> = filtered.commits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["c0", "c4"]);
        assert_eq!(filtered.commits[0].files.len(), 1);
        assert_eq!(filtered.commits[1].files.len(), 1);
        let head_only: Vec<_> = filtered
            .head_only
            .iter()
            .map(|f| f.revision.to_string())
            .collect();
        assert_eq!(head_only, ["1.1", "1.2"]);
    }

    #[test]
    fn test_head_only_commits() {
        let mut b = Builder::new();
        b.symbol("a.c", "branch1", "1.1.0.2");
        b.symbol("gen.c", "branch1", "1.1.0.2");
        b.symbol("a.c", "branch2", "1.2.0.2");
        b.commit("c0", &["a.c@1.1", "gen.c@1.1"]);
        b.commit("c1", &["a.c@1.1.2.1"]);
        b.commit("c2", &["a.c@1.2", "gen.c@1.2"]);
        b.commit("c3", &["gen.c@1.3!"]);
        let commits: Vec<_> = b.commits.iter().map(|&c| b.arena[c].clone()).collect();

        let options = options(&[], &["gen.c"], &[]);
        let filtered = filter_commits(&options, &b.files, commits);
        assert_eq!(filtered.commits.len(), 3);

        let ids = b.arena.extend(filtered.commits);
        let branchpoints = BTreeMap::from([
            ("branch1".to_string(), ids[0]),
            ("branch2".to_string(), ids[2]),
        ]);
        let mut streams = BranchStreams::build(&mut b.arena, &ids, branchpoints).unwrap();
        let new = create_head_only_commits(
            &options,
            &b.files,
            &mut b.arena,
            &mut streams,
            filtered.head_only,
        )
        .unwrap();

        // gen.c is dead on MAIN and not on branch2
        assert_eq!(new.len(), 1);
        let commit = &b.arena[new[0]];
        assert_eq!(commit.id, "headonly-branch1");
        assert_eq!(commit.author, "importer");
        assert_eq!(commit.files.len(), 1);
        assert_eq!(commit.files[0].revision.to_string(), "1.1");
        assert_eq!(commit.predecessor, Some(ids[1]));
        assert!(commit.time >= b.arena[ids[1]].time);
    }

    #[test]
    fn test_symbol_names() {
        let mut b = Builder::new();
        b.symbol("a.c", "branch1", "1.1.0.2");
        b.symbol("a.c", "nested", "1.1.2.1.0.2");
        b.symbol("a.c", "other", "1.1.0.4");
        b.symbol("a.c", "REL_1", "1.1");
        b.symbol("b.c", "REL_2", "1.1");
        b.symbol("unused.c", "REL_3", "1.1");
        b.commit("c0", &["a.c@1.1", "b.c@1.1"]);
        let committed: FHashSet<usize> = ["a.c", "b.c"]
            .iter()
            .map(|name| b.files.find(name).unwrap())
            .collect();

        let options = options(&[], &[], &["branch1"]);
        assert_eq!(branch_names(&options, &b.files, &committed), ["other"]);
        assert_eq!(tag_names(&options, &b.files, &committed), ["REL_1", "REL_2"]);
    }
}
