use super::commit::Commit;
use crate::FHashMap;
use crate::cvs::file::{FileRevision, FileSet};

/// Revisions of the same message further apart than this start a new
/// commit when there is no commit id to group by.
const MAX_COMMIT_GAP_SECS: i64 = 10;

/// Groups file revisions into commits, sorted by time.
///
/// The dead revision CVS records on the trunk for a file that was first
/// added on a branch is dropped, and the file is marked as added on that
/// branch. Revisions on branches without a symbolic name are dropped.
pub(crate) fn build_commits(files: &mut FileSet, revisions: Vec<FileRevision>) -> Vec<Commit> {
    // groups keep the input position of their first revision, which
    // orders commits with equal times
    let mut by_id = Vec::<(String, usize, Vec<FileRevision>)>::new();
    let mut id_slots = FHashMap::<String, usize>::default();
    let mut by_message = Vec::<Vec<(usize, FileRevision)>>::new();
    let mut message_slots = FHashMap::<String, usize>::default();

    for (pos, file_rev) in revisions.into_iter().enumerate() {
        if file_rev.is_dead {
            if let Some(branch) = added_on_branch_marker(&file_rev.message) {
                tracing::trace!(
                    "{} was added on branch {branch}",
                    files[file_rev.file].name,
                );
                files[file_rev.file].set_branch_added_on(branch);
                continue;
            }
        }

        if files[file_rev.file].branch_of(&file_rev.revision).is_none() {
            tracing::warn!(
                "ignoring {} r{}: it is on a branch without a name",
                files[file_rev.file].name,
                file_rev.revision,
            );
            continue;
        }

        if file_rev.commit_id.is_empty() {
            let slot = *message_slots
                .entry(file_rev.message.clone())
                .or_insert_with(|| {
                    by_message.push(Vec::new());
                    by_message.len() - 1
                });
            by_message[slot].push((pos, file_rev));
        } else {
            let slot = *id_slots.entry(file_rev.commit_id.clone()).or_insert_with(|| {
                by_id.push((file_rev.commit_id.clone(), pos, Vec::new()));
                by_id.len() - 1
            });
            by_id[slot].2.push(file_rev);
        }
    }

    let mut commits = Vec::with_capacity(by_id.len() + by_message.len());
    for (id, first_pos, file_revs) in by_id {
        commits.push((first_pos, make_commit(files, id, file_revs)));
    }

    let mut counter = 0u32;
    for mut file_revs in by_message {
        file_revs.sort_by_key(|(_, f)| f.time);

        let mut group = Vec::<(usize, FileRevision)>::new();
        for entry in file_revs {
            let split = group.last().is_some_and(|(_, prev)| {
                (entry.1.time - prev.time).num_seconds() > MAX_COMMIT_GAP_SECS
            });
            if split {
                commits.push(make_message_commit(files, std::mem::take(&mut group), &mut counter));
            }
            group.push(entry);
        }
        if !group.is_empty() {
            commits.push(make_message_commit(files, group, &mut counter));
        }
    }

    commits.sort_by_key(|(first_pos, c)| (c.time, *first_pos));
    commits.into_iter().map(|(_, c)| c).collect()
}

fn make_message_commit(
    files: &FileSet,
    group: Vec<(usize, FileRevision)>,
    counter: &mut u32,
) -> (usize, Commit) {
    let first_pos = group.iter().map(|&(pos, _)| pos).min().unwrap_or(0);
    let file_revs: Vec<_> = group.into_iter().map(|(_, f)| f).collect();
    let id = synthesize_id(&file_revs, counter);
    (first_pos, make_commit(files, id, file_revs))
}

fn added_on_branch_marker(message: &str) -> Option<&str> {
    let rest = message.strip_prefix("file ")?;
    let (_, rest) = rest
        .split_once(" was initially added on branch ")
        .or_else(|| rest.split_once(" was added on branch "))?;
    // newer servers append " on <date>"
    let branch = rest.trim_end().trim_end_matches('.').split(' ').next()?;
    (!branch.is_empty()).then_some(branch)
}

fn synthesize_id(group: &[FileRevision], counter: &mut u32) -> String {
    let first = &group[0];
    *counter += 1;
    format!("{}-{}-{}", first.time.format("%y%m%d"), first.author, counter)
}

fn make_commit(files: &FileSet, id: String, file_revs: Vec<FileRevision>) -> Commit {
    let branch = files[file_revs[0].file]
        .branch_of(&file_revs[0].revision)
        .unwrap_or_default()
        .to_string();
    Commit::new(id, branch, file_revs)
}

/// Splits commits whose files live on more than one branch into one
/// commit per branch, named `{id}-{branch}`.
pub(crate) fn split_multi_branch_commits(files: &FileSet, commits: Vec<Commit>) -> Vec<Commit> {
    let mut result = Vec::with_capacity(commits.len());
    for commit in commits {
        let mut per_branch = Vec::<(String, Vec<FileRevision>)>::new();
        for file_rev in commit.files.iter() {
            let branch = files[file_rev.file]
                .branch_of(&file_rev.revision)
                .unwrap_or_default();
            match per_branch.iter_mut().find(|(name, _)| name == branch) {
                Some((_, file_revs)) => file_revs.push(file_rev.clone()),
                None => per_branch.push((branch.into(), vec![file_rev.clone()])),
            }
        }

        if per_branch.len() == 1 {
            result.push(commit);
            continue;
        }

        tracing::debug!(
            "splitting commit {} across branches {}",
            commit.id,
            per_branch
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        );
        for (branch, file_revs) in per_branch {
            let id = format!("{}-{branch}", commit.id);
            result.push(Commit::new(id, branch, file_revs));
        }
    }
    result
}
