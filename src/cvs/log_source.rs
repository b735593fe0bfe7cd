use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug)]
pub(crate) enum OpenError {
    FileOpenError {
        path: PathBuf,
        error: std::io::Error,
    },
    SpawnProcessError {
        arg0: OsString,
        error: std::io::Error,
    },
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FileOpenError { path, error } => {
                write!(f, "failed to open file {path:?}: {error}")
            }
            Self::SpawnProcessError { arg0, error } => {
                write!(f, "failed to spawn process {arg0:?}: {error}")
            }
        }
    }
}

/// Where `cvs rlog` output comes from: a saved file, or a live `cvs rlog`
/// run against the repository.
pub(crate) enum LogSource {
    File(std::io::BufReader<std::fs::File>),
    Command(
        std::process::Child,
        std::io::BufReader<std::process::ChildStdout>,
    ),
}

impl LogSource {
    pub(crate) fn open_file(path: &std::path::Path) -> Result<Self, OpenError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| OpenError::FileOpenError {
                path: path.to_path_buf(),
                error: e,
            })?;
        Ok(Self::File(std::io::BufReader::new(file)))
    }

    pub(crate) fn run_rlog(cvs_root: &std::ffi::OsStr, module: &str) -> Result<Self, OpenError> {
        let mut child = std::process::Command::new("cvs")
            .arg("-d")
            .arg(cvs_root)
            .arg("-q")
            .arg("rlog")
            .arg(module)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit())
            .spawn()
            .map_err(|e| OpenError::SpawnProcessError {
                arg0: "cvs".into(),
                error: e,
            })?;
        let stdout = child.stdout.take().unwrap();
        Ok(Self::Command(child, std::io::BufReader::new(stdout)))
    }

    pub(crate) fn close(self) -> Result<(), std::io::Error> {
        match self {
            Self::File(_) => Ok(()),
            Self::Command(mut child, stdout) => {
                drop(stdout);
                let exit_code = child.wait()?;
                if exit_code.success() {
                    Ok(())
                } else {
                    Err(std::io::Error::other(format!(
                        "process finished code {exit_code}"
                    )))
                }
            }
        }
    }

    pub(crate) fn stream(&mut self) -> &mut dyn std::io::BufRead {
        match self {
            Self::File(file) => file,
            Self::Command(_, stdout) => stdout,
        }
    }
}
