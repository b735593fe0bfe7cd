use std::collections::BTreeMap;
use std::io::Write;

use super::commit::CommitArena;
use super::options::Options;
use super::streams::BranchStreams;
use super::{CommitMetaMaker, ConvertError, CvsCommitInfo};
use crate::cvs::checkout::ContentFetcher;
use crate::cvs::file::FileSet;
use crate::cvs::revision::Revision;
use crate::git::{self, CommitCommand, FastImportWriter, FileChange, Mark};
use crate::term_out::ProgressPrint;
use crate::{FHashMap, FHashSet};

/// Contents needed to write `order`, in the order [`emit`] consumes them.
pub(super) fn content_requests(
    files: &FileSet,
    arena: &CommitArena,
    order: &[usize],
) -> Vec<(String, Revision)> {
    order
        .iter()
        .flat_map(|&c| arena[c].files.iter())
        .filter(|file_rev| !file_rev.is_dead)
        .map(|file_rev| (files[file_rev.file].name.clone(), file_rev.revision.clone()))
        .collect()
}

pub(super) struct EmitInput<'a> {
    pub(super) files: &'a FileSet,
    pub(super) arena: &'a CommitArena,
    pub(super) streams: &'a BranchStreams,
    pub(super) order: &'a [usize],
    pub(super) tags: &'a BTreeMap<String, usize>,
}

/// Writes every commit of `order` and then the tags and the branches
/// without commits of their own.
pub(super) fn emit<W: Write>(
    progress_print: &ProgressPrint,
    options: &Options,
    meta_maker: &dyn CommitMetaMaker,
    input: &EmitInput<'_>,
    content: &mut ContentFetcher,
    writer: &mut FastImportWriter<W>,
) -> Result<(), ConvertError> {
    let EmitInput {
        files,
        arena,
        streams,
        order,
        tags,
    } = *input;

    let mut marks = FHashMap::<usize, Mark>::default();
    let mut branch_refs = FHashMap::<&str, String>::default();
    let mut used_refs = FHashSet::<String>::default();

    let write_error = |e: std::io::Error| {
        tracing::error!("failed to write fast-import stream: {e}");
        ConvertError
    };

    for (i, &c) in order.iter().enumerate() {
        let commit = &arena[c];
        progress_print.set_progress(format!(
            "writing commits - {} / {} - {}",
            i + 1,
            order.len(),
            commit.id,
        ));

        let mut changes = Vec::with_capacity(commit.files.len());
        for file_rev in commit.files.iter() {
            let path = files[file_rev.file].name.as_str();
            if file_rev.is_dead {
                changes.push(FileChange::Delete { path });
                continue;
            }
            let data = match content.next_content() {
                Some(Ok(data)) => data,
                Some(Err(e)) => {
                    tracing::error!("failed to fetch {path} r{}: {e}", file_rev.revision);
                    return Err(ConvertError);
                }
                None => {
                    tracing::error!("ran out of content at {path} r{}", file_rev.revision);
                    return Err(ConvertError);
                }
            };
            let blob = writer.blob(&data).map_err(write_error)?;
            changes.push(FileChange::Modify { path, blob });
        }

        let meta = meta_maker
            .make_commit_meta(&CvsCommitInfo {
                commit_id: &commit.id,
                branch: &commit.branch,
                author: &commit.author,
                message: &commit.message,
                time: commit.time,
            })
            .map_err(|e| {
                tracing::error!("failed to make metadata of commit {}: {e}", commit.id);
                ConvertError
            })?;

        let from = match commit.predecessor {
            Some(predecessor) => Some(*marks.get(&predecessor).ok_or_else(|| {
                tracing::error!(
                    "commit {} is written before its predecessor {}",
                    commit.id,
                    arena[predecessor].id,
                );
                ConvertError
            })?),
            None => None,
        };
        let merge = commit
            .merge_from
            .and_then(|source| marks.get(&source).copied());

        let git_ref = branch_refs
            .entry(commit.branch.as_str())
            .or_insert_with(|| {
                let git_ref = branch_ref(options, &commit.branch);
                if !used_refs.insert(git_ref.clone()) {
                    tracing::warn!("branch {} maps to {git_ref}, which is already used", commit.branch);
                }
                git_ref
            });

        tracing::debug!("writing commit {} to {git_ref}", commit.id);
        tracing::trace!("{}", commit.describe(files));
        let mark = writer
            .commit(&CommitCommand {
                git_ref: git_ref.as_str(),
                author: &meta.author,
                committer: &meta.committer,
                message: &meta.message,
                from,
                merge,
                changes: &changes,
            })
            .map_err(write_error)?;
        marks.insert(c, mark);
    }

    progress_print.set_progress("writing branches and tags".into());

    for (branch, commits) in streams.iter() {
        if !commits.is_empty() {
            continue;
        }
        let Some(branchpoint) = streams.branchpoint(branch) else {
            continue;
        };
        let Some(&mark) = marks.get(&branchpoint) else {
            tracing::warn!("branchpoint of {branch} was not written");
            continue;
        };
        let git_ref = branch_ref(options, branch);
        if !used_refs.insert(git_ref.clone()) {
            tracing::warn!("branch {branch} maps to {git_ref}, which is already used");
            continue;
        }
        tracing::debug!("creating {git_ref} at {}", arena[branchpoint].id);
        writer.reset(&git_ref, mark).map_err(write_error)?;
    }

    for (tag, &commit) in tags.iter() {
        let Some(&mark) = marks.get(&commit) else {
            tracing::warn!("commit {} of tag {tag} was not written", arena[commit].id);
            continue;
        };
        let git_ref = format!(
            "refs/tags/{}",
            git::legalize_ref_name(&options.git_tag_name(tag)),
        );
        if !used_refs.insert(git_ref.clone()) {
            tracing::warn!("tag {tag} maps to {git_ref}, which is already used");
            continue;
        }
        tracing::debug!("creating {git_ref} at {}", arena[commit].id);
        writer.reset(&git_ref, mark).map_err(write_error)?;
    }

    Ok(())
}

fn branch_ref(options: &Options, branch: &str) -> String {
    format!(
        "refs/heads/{}",
        git::legalize_ref_name(&options.git_branch_name(branch)),
    )
}
