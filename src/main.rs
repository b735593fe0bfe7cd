#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![allow(clippy::enum_variant_names, clippy::type_complexity)]

use std::process::ExitCode;
use std::sync::Arc;

mod cli;
mod convert;
mod cvs;
mod git;
mod make_meta;
mod params_file;
mod path_pattern;
mod term_out;
mod user_map;

use path_pattern::{PathPattern, PatternKind};
use term_out::ProgressPrint;

type FHashMap<K, V> = std::collections::HashMap<K, V, foldhash::fast::RandomState>;
type FHashSet<T> = std::collections::HashSet<T, foldhash::fast::RandomState>;

enum RunError {
    Generic,
    Usage,
}

fn main() -> ExitCode {
    match main_inner() {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Generic) => ExitCode::from(1),
        Err(RunError::Usage) => ExitCode::from(2),
    }
}

fn main_inner() -> Result<(), RunError> {
    let start = std::time::Instant::now();

    let args = match <cli::Cli as clap::Parser>::try_parse() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            return Err(RunError::Usage);
        }
    };

    if args.cvs_log.is_none() && args.cvs_root.is_none() {
        eprintln!("either --cvs-log or --cvs-root is required");
        return Err(RunError::Usage);
    }
    if args.cvs_root.is_none() && !args.placeholder_content {
        eprintln!("--cvs-root is required to fetch file contents (or use --placeholder-content)");
        return Err(RunError::Usage);
    }

    let term_out = term_out::init(start, !args.no_progress);
    let progress_print = term_out.get_progress_print();

    let stderr_log_level = args
        .stderr_log_level
        .unwrap_or(cli::LogLevel::Warn)
        .to_log_level_filter();
    let file_log_level = args.file_log_level.map(cli::LogLevel::to_log_level_filter);

    if let Err(e) = init_logger(
        Some(stderr_log_level),
        args.log_file.as_deref(),
        file_log_level,
        progress_print.clone(),
    ) {
        eprintln!("failed to initialize logging: {e}");
        return Err(RunError::Generic);
    }

    let r = run(&args, &progress_print);

    term_out.finish();

    r
}

fn run(args: &cli::Cli, progress_print: &ProgressPrint) -> Result<(), RunError> {
    let params_raw = std::fs::read_to_string(&args.conv_params).map_err(|e| {
        tracing::error!("failed to read {:?}: {e}", args.conv_params);
        RunError::Generic
    })?;
    let params: params_file::ConvParams = toml::from_str(&params_raw).map_err(|e| {
        tracing::error!("failed to parse {:?}: {e}", args.conv_params);
        RunError::Generic
    })?;

    let branchpoint_rule = params
        .branchpoint_rule
        .as_ref()
        .map(|rule| {
            convert::BranchpointRule::new(&rule.pattern, &rule.replacement).map_err(|e| {
                tracing::error!("invalid branchpoint rule pattern {:?}: {e}", rule.pattern);
                RunError::Generic
            })
        })
        .transpose()?;

    let mut options = convert::Options::new(convert::InitOptions {
        include_files: pattern(&params.include_files, PatternKind::Path)?,
        exclude_files: pattern(&params.exclude_files, PatternKind::Path)?,
        head_only: pattern(&params.head_only, PatternKind::Path)?,
        include_tags: pattern(&params.include_tags, PatternKind::Name)?,
        exclude_tags: pattern(&params.exclude_tags, PatternKind::Name)?,
        include_branches: pattern(&params.include_branches, PatternKind::Name)?,
        exclude_branches: pattern(&params.exclude_branches, PatternKind::Name)?,
        branchpoint_rule,
        partial_tag_threshold: params.partial_tag_threshold,
        ignore_unresolved_tags: params.ignore_unresolved_tags,
        head_only_author: params.head_only_author.clone(),
        cvs_processes: args.cvs_processes,
    });

    for (from, to) in params.rename_branches.iter() {
        options.add_branch_rename(from, to).map_err(|_| {
            tracing::error!("invalid branch rename: {from:?} -> {to:?}");
            RunError::Generic
        })?;
    }
    for (from, to) in params.rename_tags.iter() {
        options.add_tag_rename(from, to).map_err(|_| {
            tracing::error!("invalid tag rename: {from:?} -> {to:?}");
            RunError::Generic
        })?;
    }

    let user_map = match params.user_map_file {
        None => user_map::UserMap::new(),
        Some(ref user_map_path) => {
            let user_map_path = if user_map_path.is_relative() {
                let conv_params_path_parent = args.conv_params.parent().ok_or_else(|| {
                    tracing::error!("invalid parameters file path: {:?}", args.conv_params);
                    RunError::Generic
                })?;
                conv_params_path_parent.join(user_map_path)
            } else {
                user_map_path.clone()
            };

            let user_map_file = std::fs::OpenOptions::new()
                .read(true)
                .open(&user_map_path)
                .map_err(|e| {
                    tracing::error!("failed to open user map {user_map_path:?}: {e}");
                    RunError::Generic
                })?;

            user_map::UserMap::parse(&mut std::io::BufReader::new(user_map_file)).map_err(|e| {
                tracing::error!("failed to read user map {user_map_path:?}: {e}");
                RunError::Generic
            })?
        }
    };

    let meta_maker = make_meta::GitMetaMaker::new(
        &user_map,
        params
            .user_fallback_template
            .as_deref()
            .unwrap_or(make_meta::DEFAULT_USER_FALLBACK_TEMPLATE),
        params
            .commit_msg_template
            .as_deref()
            .unwrap_or(make_meta::DEFAULT_COMMIT_MSG_TEMPLATE),
    )
    .map_err(|e| {
        tracing::error!("{e}");
        RunError::Generic
    })?;

    let content_source: Arc<dyn cvs::checkout::ContentSource> = match args.cvs_root {
        Some(ref cvs_root) if !args.placeholder_content => Arc::new(
            cvs::checkout::CvsCheckout::new(cvs_root.clone(), args.module.clone()),
        ),
        _ => Arc::new(cvs::checkout::Placeholder),
    };

    let mut log_source = match (&args.cvs_log, &args.cvs_root) {
        (Some(log_path), _) => cvs::log_source::LogSource::open_file(log_path),
        (None, Some(cvs_root)) => cvs::log_source::LogSource::run_rlog(cvs_root, &args.module),
        (None, None) => unreachable!(),
    }
    .map_err(|e| {
        tracing::error!("failed to open CVS log: {e}");
        RunError::Generic
    })?;

    let mut out: Box<dyn std::io::Write> = if args.dest.as_os_str() == "-" {
        Box::new(std::io::BufWriter::new(std::io::stdout().lock()))
    } else {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&args.dest)
            .map_err(|e| {
                tracing::error!("failed to create {:?}: {e}", args.dest);
                RunError::Generic
            })?;
        Box::new(std::io::BufWriter::new(file))
    };

    convert::convert(
        progress_print,
        &options,
        &meta_maker,
        log_source.stream(),
        &args.module,
        content_source,
        &mut out,
    )
    .map_err(|convert::ConvertError| RunError::Generic)?;

    log_source.close().map_err(|e| {
        tracing::error!("failed to read CVS log: {e}");
        RunError::Generic
    })?;

    Ok(())
}

fn pattern(patterns: &[String], kind: PatternKind) -> Result<PathPattern, RunError> {
    PathPattern::new(patterns.iter().map(String::as_str), kind).map_err(|(pat, e)| {
        tracing::error!("invalid pattern {pat:?}: {e}");
        RunError::Generic
    })
}

fn init_logger(
    stderr_level: Option<tracing::Level>,
    file_path: Option<&std::path::Path>,
    file_level: Option<tracing::Level>,
    progress_print: ProgressPrint,
) -> Result<(), std::io::Error> {
    use tracing_subscriber::layer::{Layer as _, SubscriberExt as _};
    use tracing_subscriber::util::SubscriberInitExt as _;

    let stderr_sub = if let Some(stderr_level) = stderr_level {
        let filter = tracing_subscriber::filter::LevelFilter::from_level(stderr_level);
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(MakeLogPrinter::new(progress_print))
                .with_filter(filter),
        )
    } else {
        None
    };

    let file_sub = if let Some(file_path) = file_path {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_path)?;

        let filter = tracing_subscriber::filter::LevelFilter::from_level(
            file_level.unwrap_or(tracing::Level::DEBUG),
        );
        Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file)
                .with_filter(filter),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(stderr_sub)
        .with(file_sub)
        .init();

    Ok(())
}

struct MakeLogPrinter {
    progress_print: ProgressPrint,
}

impl MakeLogPrinter {
    fn new(progress_print: ProgressPrint) -> Self {
        Self { progress_print }
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for MakeLogPrinter {
    type Writer = LogPrinter<'a>;

    fn make_writer(&'a self) -> LogPrinter<'a> {
        LogPrinter {
            progress_print: &self.progress_print,
            buf: Vec::new(),
        }
    }
}

struct LogPrinter<'a> {
    progress_print: &'a ProgressPrint,
    buf: Vec<u8>,
}

impl Drop for LogPrinter<'_> {
    fn drop(&mut self) {
        self.progress_print.print_raw_line(self.buf.clone());
    }
}

impl std::io::Write for LogPrinter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.extend(buf);
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.buf.extend(buf);
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
