use std::io::Write;

/// A `git fast-import` object mark.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Mark(u64);

impl std::fmt::Display for Mark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ":{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Signature {
    pub(crate) name: String,
    pub(crate) email: String,
    pub(crate) time: chrono::DateTime<chrono::Utc>,
}

impl std::fmt::Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} <{}> {} +0000",
            self.name,
            self.email,
            self.time.timestamp(),
        )
    }
}

pub(crate) enum FileChange<'a> {
    Modify { path: &'a str, blob: Mark },
    Delete { path: &'a str },
}

pub(crate) struct CommitCommand<'a> {
    pub(crate) git_ref: &'a str,
    pub(crate) author: &'a Signature,
    pub(crate) committer: &'a Signature,
    pub(crate) message: &'a str,
    pub(crate) from: Option<Mark>,
    pub(crate) merge: Option<Mark>,
    pub(crate) changes: &'a [FileChange<'a>],
}

/// Writes a `git fast-import` stream. Marks are allocated sequentially,
/// shared by blobs and commits.
pub(crate) struct FastImportWriter<W: Write> {
    out: W,
    last_mark: u64,
}

impl<W: Write> FastImportWriter<W> {
    pub(crate) fn new(out: W) -> Self {
        Self { out, last_mark: 0 }
    }

    fn next_mark(&mut self) -> Mark {
        self.last_mark += 1;
        Mark(self.last_mark)
    }

    fn write_data(&mut self, data: &[u8]) -> std::io::Result<()> {
        writeln!(self.out, "data {}", data.len())?;
        self.out.write_all(data)?;
        self.out.write_all(b"\n")
    }

    pub(crate) fn blob(&mut self, data: &[u8]) -> std::io::Result<Mark> {
        let mark = self.next_mark();
        writeln!(self.out, "blob")?;
        writeln!(self.out, "mark {mark}")?;
        self.write_data(data)?;
        Ok(mark)
    }

    pub(crate) fn commit(&mut self, commit: &CommitCommand<'_>) -> std::io::Result<Mark> {
        let mark = self.next_mark();
        writeln!(self.out, "commit {}", commit.git_ref)?;
        writeln!(self.out, "mark {mark}")?;
        writeln!(self.out, "author {}", commit.author)?;
        writeln!(self.out, "committer {}", commit.committer)?;
        self.write_data(commit.message.as_bytes())?;
        if let Some(from) = commit.from {
            writeln!(self.out, "from {from}")?;
        }
        if let Some(merge) = commit.merge {
            writeln!(self.out, "merge {merge}")?;
        }
        for change in commit.changes.iter() {
            match *change {
                FileChange::Modify { path, blob } => {
                    writeln!(self.out, "M 100644 {blob} {}", quote_path(path))?;
                }
                FileChange::Delete { path } => {
                    writeln!(self.out, "D {}", quote_path(path))?;
                }
            }
        }
        writeln!(self.out)?;
        Ok(mark)
    }

    pub(crate) fn reset(&mut self, git_ref: &str, from: Mark) -> std::io::Result<()> {
        writeln!(self.out, "reset {git_ref}")?;
        writeln!(self.out, "from {from}")?;
        writeln!(self.out)
    }

    pub(crate) fn finish(mut self) -> std::io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Paths starting with `"` or containing a newline or a backslash use
/// C-style quoting.
fn quote_path(path: &str) -> std::borrow::Cow<'_, str> {
    if !path.starts_with('"') && !path.contains(['\n', '\\']) {
        return std::borrow::Cow::Borrowed(path);
    }

    let mut quoted = String::with_capacity(path.len() + 2);
    quoted.push('"');
    for chr in path.chars() {
        match chr {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            _ => quoted.push(chr),
        }
    }
    quoted.push('"');
    std::borrow::Cow::Owned(quoted)
}
