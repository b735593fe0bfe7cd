use std::ffi::OsString;
use std::path::PathBuf;

#[derive(clap::Parser)]
pub(crate) struct Cli {
    #[arg(
        long = "stderr-log-level",
        value_name = "LEVEL",
        value_enum,
        help = "Maximum stderr log level (warn by default)"
    )]
    pub(crate) stderr_log_level: Option<LogLevel>,
    #[arg(
        long = "log-file",
        value_name = "PATH",
        help = "File to write logs (besides stderr)"
    )]
    pub(crate) log_file: Option<PathBuf>,
    #[arg(
        long = "file-log-level",
        value_name = "LEVEL",
        value_enum,
        help = "Maximum file log level (debug by default)"
    )]
    pub(crate) file_log_level: Option<LogLevel>,
    #[arg(long = "no-progress", help = "Do not print progress")]
    pub(crate) no_progress: bool,
    #[arg(
        long = "cvs-log",
        short = 'l',
        value_name = "FILE",
        help = "Saved \"cvs rlog\" output (runs \"cvs rlog\" when omitted)"
    )]
    pub(crate) cvs_log: Option<PathBuf>,
    #[arg(
        long = "cvs-root",
        short = 'r',
        value_name = "CVSROOT",
        help = "Source CVS repository, as passed to \"cvs -d\""
    )]
    pub(crate) cvs_root: Option<OsString>,
    #[arg(
        long = "module",
        short = 'm',
        value_name = "MODULE",
        help = "Module to convert"
    )]
    pub(crate) module: String,
    #[arg(
        long = "dest",
        short = 'd',
        value_name = "PATH",
        help = "File where the fast-import stream is written (\"-\" for stdout)"
    )]
    pub(crate) dest: PathBuf,
    #[arg(
        long = "conv-params",
        short = 'P',
        value_name = "FILE",
        help = "Conversion parameters"
    )]
    pub(crate) conv_params: PathBuf,
    #[arg(
        long = "cvs-processes",
        value_name = "N",
        help = "Number of concurrent \"cvs checkout\" processes",
        default_value_t = 1
    )]
    pub(crate) cvs_processes: usize,
    #[arg(
        long = "placeholder-content",
        help = "Write \"<path> <revision>\" instead of the real file contents"
    )]
    pub(crate) placeholder_content: bool,
}

#[derive(Copy, Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl LogLevel {
    pub(crate) fn to_log_level_filter(self) -> tracing::Level {
        match self {
            Self::Error => tracing::Level::ERROR,
            Self::Warn => tracing::Level::WARN,
            Self::Info => tracing::Level::INFO,
            Self::Debug => tracing::Level::DEBUG,
            Self::Trace => tracing::Level::TRACE,
        }
    }
}
