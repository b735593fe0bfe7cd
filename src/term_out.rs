use std::io::Write as _;
use std::sync::mpsc;
use std::time::{Duration, Instant};

pub(crate) fn init(start: Instant, enable_progress: bool) -> Handle {
    let (sender, receiver) = mpsc::channel();

    let join_handle = std::thread::Builder::new()
        .name("term out".into())
        .spawn(move || {
            let mut term = Terminal {
                start,
                enable_progress,
                progress: None,
                last_draw: start,
                stale: false,
                stderr: std::io::stderr(),
            };
            term.run(&receiver);
        })
        .expect("failed to spawn thread");

    Handle {
        join_handle,
        sender,
    }
}

const UPDATE_PERIOD: Duration = Duration::from_millis(50);

/// Owns stderr while conversion runs. Log lines are printed above a
/// progress line that is redrawn at most every [`UPDATE_PERIOD`], and
/// once per second so the elapsed time keeps ticking.
struct Terminal {
    start: Instant,
    enable_progress: bool,
    progress: Option<String>,
    last_draw: Instant,
    /// `progress` changed since it was last drawn.
    stale: bool,
    stderr: std::io::Stderr,
}

impl Terminal {
    fn run(&mut self, receiver: &mpsc::Receiver<Command>) {
        loop {
            let timeout = self.progress.as_ref().map(|_| {
                if self.stale {
                    UPDATE_PERIOD.saturating_sub(self.last_draw.elapsed())
                } else {
                    duration_to_next_second(self.start.elapsed())
                }
            });

            let cmd = match timeout {
                Some(timeout) if timeout.is_zero() => Err(mpsc::RecvTimeoutError::Timeout),
                Some(timeout) => receiver.recv_timeout(timeout),
                None => receiver.recv().map_err(|e| e.into()),
            };

            match cmd {
                Ok(Command::Finish) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                    self.close_progress();
                    break;
                }
                Ok(Command::PrintRawLine(line)) => self.print_line(&line),
                Ok(Command::SetProgress(progress)) => {
                    if self.enable_progress {
                        self.progress = Some(progress);
                        self.stale = true;
                        if self.last_draw.elapsed() >= UPDATE_PERIOD {
                            self.draw_progress();
                        }
                    }
                }
                Ok(Command::FreezeProgress) => self.close_progress(),
                Err(mpsc::RecvTimeoutError::Timeout) => self.draw_progress(),
            }
        }
    }

    fn draw_progress(&mut self) {
        if let Some(ref progress) = self.progress {
            let progress_line = render_progress_line(self.start, progress);
            handle_err(crossterm::queue!(
                self.stderr,
                crossterm::cursor::MoveToColumn(0),
                crossterm::style::Print(progress_line),
                crossterm::terminal::Clear(crossterm::terminal::ClearType::UntilNewLine),
            ));
            handle_err(self.stderr.flush());
        }
        self.last_draw = Instant::now();
        self.stale = false;
    }

    /// Leaves the current progress line on screen and stops updating it.
    fn close_progress(&mut self) {
        if self.progress.is_none() {
            return;
        }
        if self.stale {
            self.draw_progress();
        }
        handle_err(crossterm::queue!(
            self.stderr,
            crossterm::style::Print('\n'),
            crossterm::cursor::MoveToColumn(0),
        ));
        handle_err(self.stderr.flush());
        self.progress = None;
    }

    fn print_line(&mut self, line: &[u8]) {
        match self.progress {
            Some(ref progress) => {
                handle_err(crossterm::queue!(
                    self.stderr,
                    crossterm::terminal::Clear(crossterm::terminal::ClearType::CurrentLine),
                    crossterm::cursor::MoveToColumn(0),
                ));
                handle_err(self.stderr.write_all(line));
                handle_err(crossterm::queue!(
                    self.stderr,
                    crossterm::style::Print(render_progress_line(self.start, progress)),
                ));
            }
            None => handle_err(self.stderr.write_all(line)),
        }
        handle_err(self.stderr.flush());
    }
}

fn render_progress_line(start: Instant, line: &str) -> String {
    let elapsed = start.elapsed().as_secs();
    let secs = elapsed % 60;
    let mins = (elapsed / 60) % 60;
    let hours = elapsed / 3600;

    format!("[{hours:02}:{mins:02}:{secs:02}] {line}")
}

fn handle_err<T>(r: std::io::Result<T>) -> T {
    r.expect("stderr write failed")
}

fn duration_to_next_second(duration: Duration) -> Duration {
    let subsec_nanos = duration.subsec_nanos();
    if subsec_nanos == 0 {
        Duration::ZERO
    } else {
        Duration::from_nanos((1_000_000_000 - subsec_nanos).into())
    }
}

enum Command {
    Finish,
    PrintRawLine(Vec<u8>),
    SetProgress(String),
    FreezeProgress,
}

pub(crate) struct Handle {
    join_handle: std::thread::JoinHandle<()>,
    sender: mpsc::Sender<Command>,
}

impl Handle {
    pub(crate) fn finish(self) {
        self.sender
            .send(Command::Finish)
            .expect("term out endpoint closed");
        self.join_handle.join().expect("term out thread panicked");
    }

    pub(crate) fn get_progress_print(&self) -> ProgressPrint {
        ProgressPrint {
            sender: self.sender.clone(),
        }
    }
}

/// Cloneable handle to the terminal thread.
#[derive(Clone)]
pub(crate) struct ProgressPrint {
    sender: mpsc::Sender<Command>,
}

impl ProgressPrint {
    pub(crate) fn set_progress(&self, progress: String) {
        self.sender
            .send(Command::SetProgress(progress))
            .expect("term out endpoint closed");
    }

    pub(crate) fn freeze_progress(&self) {
        self.sender
            .send(Command::FreezeProgress)
            .expect("term out endpoint closed");
    }

    pub(crate) fn print_raw_line(&self, line: Vec<u8>) {
        self.sender
            .send(Command::PrintRawLine(line))
            .expect("term out endpoint closed");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::duration_to_next_second;

    #[test]
    fn test_duration_to_next_second() {
        assert_eq!(duration_to_next_second(Duration::from_secs(3)), Duration::ZERO);
        assert_eq!(
            duration_to_next_second(Duration::from_millis(2_250)),
            Duration::from_millis(750),
        );
    }
}
