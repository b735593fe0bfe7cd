use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cvs::checkout::{ContentFetcher, ContentSource};
use crate::cvs::rlog;
use crate::term_out::ProgressPrint;
use crate::{FHashSet, git};

mod commit;
mod commit_builder;
mod commit_move;
mod emit;
mod filter;
mod manual_branch;
mod merges;
mod options;
mod player;
mod repo_state;
mod resolver;
mod streams;

pub(crate) use manual_branch::BranchpointRule;
pub(crate) use options::{InitOptions, Options};

use commit::CommitArena;
use resolver::{ResolveMode, Resolver, UnresolvedTag};

pub(crate) struct ConvertError;

pub(crate) struct GitCommitMeta {
    pub(crate) author: git::Signature,
    pub(crate) committer: git::Signature,
    pub(crate) message: String,
}

/// What a commit template can refer to.
pub(crate) struct CvsCommitInfo<'a> {
    pub(crate) commit_id: &'a str,
    pub(crate) branch: &'a str,
    pub(crate) author: &'a str,
    pub(crate) message: &'a str,
    pub(crate) time: chrono::DateTime<chrono::Utc>,
}

pub(crate) trait CommitMetaMaker {
    fn make_commit_meta(&self, commit: &CvsCommitInfo<'_>) -> Result<GitCommitMeta, String>;
}

/// Converts the module history in `log` into a fast-import stream written
/// to `out`.
pub(crate) fn convert(
    progress_print: &ProgressPrint,
    options: &Options,
    meta_maker: &dyn CommitMetaMaker,
    log: &mut dyn std::io::BufRead,
    module: &str,
    content_source: Arc<dyn ContentSource>,
    out: &mut dyn std::io::Write,
) -> Result<(), ConvertError> {
    progress_print.set_progress("reading log".into());
    let rlog::LogData {
        mut files,
        revisions,
    } = {
        let _span = tracing::info_span!("read log").entered();
        rlog::read_log(log, module).map_err(|e| {
            tracing::error!("{e}");
            ConvertError
        })?
    };
    tracing::info!(
        "read {} revisions of {} files",
        revisions.len(),
        files.len(),
    );

    progress_print.set_progress("building commits".into());
    let commits = {
        let _span = tracing::info_span!("build commits").entered();
        let commits = commit_builder::build_commits(&mut files, revisions);
        commit_builder::split_multi_branch_commits(&files, commits)
    };
    let filter::Filtered { commits, head_only } =
        filter::filter_commits(options, &files, commits);
    tracing::info!(
        "{} commits, {} head-only file revisions",
        commits.len(),
        head_only.len(),
    );

    let committed: FHashSet<usize> = commits
        .iter()
        .flat_map(|commit| commit.files.iter().map(|file_rev| file_rev.file))
        .collect();
    let mut arena = CommitArena::new();
    let commits = arena.extend(commits);

    progress_print.set_progress("resolving tags".into());
    let tag_names = filter::tag_names(options, &files, &committed);
    let (commits, tags) = {
        let _span = tracing::info_span!("tags").entered();
        tracing::info!("resolving {} tags", tag_names.len());
        let mut resolver = Resolver::new(
            ResolveMode::Tags,
            &files,
            &mut arena,
            commits,
            options.partial_tag_threshold,
        );
        let all_resolved = resolver.resolve(&tag_names).map_err(|e| {
            tracing::error!("{e}");
            ConvertError
        })?;
        tracing::info!("{} tags resolved", resolver.resolved_tags().len());
        if !all_resolved {
            let unresolved = resolver.unresolved_tags();
            report_unresolved("tag", unresolved);
            if !options.ignore_unresolved_tags {
                tracing::error!("{} tags could not be resolved", unresolved.len());
                return Err(ConvertError);
            }
        }
        let (commits, tags, _) = resolver.into_parts();
        (commits, tags)
    };

    progress_print.set_progress("resolving branches".into());
    let branch_names = filter::branch_names(options, &files, &committed);
    let (commits, branchpoints) = {
        let _span = tracing::info_span!("branches").entered();
        tracing::info!("resolving {} branches", branch_names.len());
        let resolver = Resolver::new(
            ResolveMode::Branches,
            &files,
            &mut arena,
            commits,
            options.partial_tag_threshold,
        );
        let resolved = if let Some(ref rule) = options.branchpoint_rule {
            let mut resolver = manual_branch::ManualBranchResolver::new(rule, &tags, resolver);
            resolver
                .resolve(&branch_names)
                .map(|_| resolver.into_parts())
        } else {
            let mut resolver = resolver;
            resolver
                .resolve(&branch_names)
                .map(|_| resolver.into_parts())
        };
        let (commits, branchpoints, unresolved) = resolved.map_err(|e| {
            tracing::error!("{e}");
            ConvertError
        })?;
        if !unresolved.is_empty() {
            report_unresolved("branch", &unresolved);
            tracing::error!("{} branches could not be resolved", unresolved.len());
            return Err(ConvertError);
        }
        (commits, branchpoints)
    };

    progress_print.set_progress("resolving merges".into());
    commit::index_file_commits(&mut files, &arena, &commits);
    let mut streams =
        streams::BranchStreams::build(&mut arena, &commits, branchpoints).map_err(|e| {
            tracing::error!("{e}");
            ConvertError
        })?;
    {
        let _span = tracing::info_span!("merges").entered();
        merges::MergeResolver::new(&files, &mut arena, &mut streams, &tags)
            .resolve(&commits)
            .map_err(|e| {
                tracing::error!("{e}");
                ConvertError
            })?;
    }

    let head_only_commits = filter::create_head_only_commits(
        options,
        &files,
        &mut arena,
        &mut streams,
        head_only,
    )
    .map_err(|e| {
        tracing::error!("{e}");
        ConvertError
    })?;
    if !head_only_commits.is_empty() {
        tracing::info!("added {} head-only commits", head_only_commits.len());
    }

    progress_print.set_progress("ordering commits".into());
    let order = player::play(&arena, &streams).map_err(|e| {
        tracing::error!("{e}");
        ConvertError
    })?;
    tracing::info!(
        "writing {} commits on {} branches",
        order.len(),
        streams.len(),
    );

    let _span = tracing::info_span!("write").entered();
    let mut content = ContentFetcher::new(
        content_source,
        options.cvs_processes,
        emit::content_requests(&files, &arena, &order),
    );
    let mut writer = git::FastImportWriter::new(out);
    emit::emit(
        progress_print,
        options,
        meta_maker,
        &emit::EmitInput {
            files: &files,
            arena: &arena,
            streams: &streams,
            order: &order,
            tags: &tags,
        },
        &mut content,
        &mut writer,
    )?;
    writer.finish().map_err(|e| {
        tracing::error!("failed to finish fast-import stream: {e}");
        ConvertError
    })?;

    progress_print.set_progress("finalizing".into());
    progress_print.freeze_progress();

    Ok(())
}

fn report_unresolved(noun: &str, unresolved: &[UnresolvedTag]) {
    let mut by_reason = BTreeMap::<String, Vec<&str>>::new();
    for tag in unresolved.iter() {
        by_reason
            .entry(tag.reason.to_string())
            .or_default()
            .push(&tag.name);
    }
    for (reason, names) in by_reason {
        tracing::warn!("unresolved {noun}s ({reason}): {}", names.join(", "));
    }
}
