use std::collections::BTreeMap;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, mpsc};

use super::revision::Revision;

#[derive(Debug)]
pub(crate) enum ContentError {
    SpawnProcessError {
        arg0: OsString,
        error: std::io::Error,
    },
    CheckoutFailed {
        path: String,
        revision: Revision,
        status: std::process::ExitStatus,
        stderr: String,
    },
    WorkerGone,
}

impl std::fmt::Display for ContentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::SpawnProcessError {
                ref arg0,
                ref error,
            } => write!(f, "failed to spawn process {arg0:?}: {error}"),
            Self::CheckoutFailed {
                ref path,
                ref revision,
                status,
                ref stderr,
            } => {
                write!(f, "checkout of {path} r{revision} failed ({status})")?;
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr.trim_end())?;
                }
                Ok(())
            }
            Self::WorkerGone => write!(f, "checkout worker stopped unexpectedly"),
        }
    }
}

/// Provides the content of a file revision.
pub(crate) trait ContentSource: Send + Sync {
    fn fetch(&self, path: &str, revision: &Revision) -> Result<Vec<u8>, ContentError>;
}

/// Runs `cvs checkout -p` for every revision.
pub(crate) struct CvsCheckout {
    cvs_root: OsString,
    module: String,
}

impl CvsCheckout {
    pub(crate) fn new(cvs_root: OsString, module: String) -> Self {
        Self { cvs_root, module }
    }
}

impl ContentSource for CvsCheckout {
    fn fetch(&self, path: &str, revision: &Revision) -> Result<Vec<u8>, ContentError> {
        let module_path = if self.module.is_empty() || self.module == "." {
            path.to_string()
        } else {
            format!("{}/{path}", self.module)
        };

        let output = std::process::Command::new("cvs")
            .arg("-d")
            .arg(&self.cvs_root)
            .arg("-Q")
            .arg("co")
            .arg("-p")
            .arg("-r")
            .arg(revision.to_string())
            .arg(&module_path)
            .stdin(std::process::Stdio::null())
            .output()
            .map_err(|e| ContentError::SpawnProcessError {
                arg0: "cvs".into(),
                error: e,
            })?;

        if !output.status.success() {
            return Err(ContentError::CheckoutFailed {
                path: path.into(),
                revision: revision.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(output.stdout)
    }
}

/// Deterministic stand-in content, `"{path} {revision}\n"`.
pub(crate) struct Placeholder;

impl ContentSource for Placeholder {
    fn fetch(&self, path: &str, revision: &Revision) -> Result<Vec<u8>, ContentError> {
        Ok(format!("{path} {revision}\n").into_bytes())
    }
}

type Job = (u64, String, Revision);
type JobResult = (u64, Result<Vec<u8>, ContentError>);

/// Fetches contents on a pool of worker threads and hands them out in
/// request order. At most a few requests per worker are in flight.
pub(crate) struct ContentFetcher {
    requests: std::vec::IntoIter<(String, Revision)>,
    job_sender: Option<mpsc::Sender<Job>>,
    result_receiver: mpsc::Receiver<JobResult>,
    workers: Vec<std::thread::JoinHandle<()>>,
    window: u64,
    next_submit: u64,
    next_deliver: u64,
    ready: BTreeMap<u64, Result<Vec<u8>, ContentError>>,
}

impl ContentFetcher {
    pub(crate) fn new(
        source: Arc<dyn ContentSource>,
        num_workers: usize,
        requests: Vec<(String, Revision)>,
    ) -> Self {
        let num_workers = num_workers.max(1);
        let (job_sender, job_receiver) = mpsc::channel::<Job>();
        let (result_sender, result_receiver) = mpsc::channel::<JobResult>();
        let job_receiver = Arc::new(Mutex::new(job_receiver));

        let workers = (0..num_workers)
            .map(|i| {
                let source = source.clone();
                let job_receiver = job_receiver.clone();
                let result_sender = result_sender.clone();
                std::thread::Builder::new()
                    .name(format!("checkout {i}"))
                    .spawn(move || Self::worker_main(&*source, &job_receiver, &result_sender))
                    .expect("failed to spawn thread")
            })
            .collect();

        Self {
            requests: requests.into_iter(),
            job_sender: Some(job_sender),
            result_receiver,
            workers,
            window: 4 * num_workers as u64,
            next_submit: 0,
            next_deliver: 0,
            ready: BTreeMap::new(),
        }
    }

    fn worker_main(
        source: &dyn ContentSource,
        job_receiver: &Mutex<mpsc::Receiver<Job>>,
        result_sender: &mpsc::Sender<JobResult>,
    ) {
        loop {
            let job = job_receiver
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .recv();
            let Ok((seq, path, revision)) = job else {
                break;
            };
            let result = source.fetch(&path, &revision);
            if result_sender.send((seq, result)).is_err() {
                break;
            }
        }
    }

    fn submit(&mut self) {
        let Some(ref job_sender) = self.job_sender else {
            return;
        };
        while self.next_submit < self.next_deliver + self.window {
            let Some((path, revision)) = self.requests.next() else {
                // no more work, let idle workers exit
                self.job_sender = None;
                return;
            };
            if job_sender.send((self.next_submit, path, revision)).is_err() {
                self.job_sender = None;
                return;
            }
            self.next_submit += 1;
        }
    }

    /// Content of the next request, `None` after the last one.
    pub(crate) fn next_content(&mut self) -> Option<Result<Vec<u8>, ContentError>> {
        self.submit();
        if self.next_deliver == self.next_submit {
            return None;
        }

        let result = loop {
            if let Some(result) = self.ready.remove(&self.next_deliver) {
                break result;
            }
            match self.result_receiver.recv() {
                Ok((seq, result)) => {
                    self.ready.insert(seq, result);
                }
                Err(mpsc::RecvError) => break Err(ContentError::WorkerGone),
            }
        };
        self.next_deliver += 1;
        Some(result)
    }
}

impl Drop for ContentFetcher {
    fn drop(&mut self) {
        self.job_sender = None;
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.join() {
                std::panic::resume_unwind(e);
            }
        }
    }
}
