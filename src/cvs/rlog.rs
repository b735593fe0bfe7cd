use super::file::{FileRevision, FileSet};
use super::revision::Revision;

// Parses the output of `cvs rlog` (or `cvs log`) for a whole module.
//
// Each file section looks like:
//
//   RCS file: /cvsroot/module/dir/Attic/file.c,v
//   head: 1.2
//   symbolic names:
//   	tag1: 1.2
//   	branch1: 1.1.0.2
//   description:
//   ----------------------------
//   revision 1.2
//   date: 2009/03/05 12:00:00;  author: bob;  state: Exp;  lines: +1 -0;  commitid: 1004;
//   log message
//   =============================================================================

const REVISION_SEPARATOR: &str = "----------------------------";
const FILE_SEPARATOR: &str =
    "=============================================================================";
const EMPTY_MESSAGE: &str = "*** empty log message ***";

#[derive(Debug)]
pub(crate) enum ReadError {
    Io(std::io::Error),
    UnexpectedEof,
    UnexpectedLine { line: usize, data: String },
    InvalidPath { line: usize, path: String },
    InvalidRevision { line: usize, error: super::revision::ParseError },
    InvalidDate { line: usize, date: String },
    MissingField { line: usize, field: &'static str },
}

impl From<std::io::Error> for ReadError {
    #[inline]
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Io(ref e) => write!(f, "failed to read log: {e}"),
            Self::UnexpectedEof => write!(f, "unexpected end of log"),
            Self::UnexpectedLine { line, ref data } => {
                write!(f, "unexpected content at line {line}: {data:?}")
            }
            Self::InvalidPath { line, ref path } => {
                write!(f, "invalid RCS file path at line {line}: {path:?}")
            }
            Self::InvalidRevision { line, ref error } => {
                write!(f, "invalid revision at line {line}: {error}")
            }
            Self::InvalidDate { line, ref date } => {
                write!(f, "invalid date at line {line}: {date:?}")
            }
            Self::MissingField { line, field } => {
                write!(f, "missing \"{field}\" at line {line}")
            }
        }
    }
}

pub(crate) struct LogData {
    pub(crate) files: FileSet,
    pub(crate) revisions: Vec<FileRevision>,
}

struct Lines<'a> {
    source: &'a mut dyn std::io::BufRead,
    line_no: usize,
    peeked: Option<String>,
}

impl<'a> Lines<'a> {
    fn new(source: &'a mut dyn std::io::BufRead) -> Self {
        Self {
            source,
            line_no: 0,
            peeked: None,
        }
    }

    fn read_raw(&mut self) -> Result<Option<String>, ReadError> {
        let mut raw = Vec::new();
        if self.source.read_until(b'\n', &mut raw)? == 0 {
            return Ok(None);
        }
        if raw.ends_with(b"\n") {
            raw.pop();
        }
        if raw.ends_with(b"\r") {
            raw.pop();
        }
        // Log messages are not necessarily UTF-8
        Ok(Some(String::from_utf8(raw).unwrap_or_else(|e| {
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        })))
    }

    fn next(&mut self) -> Result<Option<String>, ReadError> {
        if let Some(line) = self.peeked.take() {
            self.line_no += 1;
            return Ok(Some(line));
        }
        let line = self.read_raw()?;
        if line.is_some() {
            self.line_no += 1;
        }
        Ok(line)
    }

    fn next_required(&mut self) -> Result<String, ReadError> {
        self.next()?.ok_or(ReadError::UnexpectedEof)
    }

    fn peek(&mut self) -> Result<Option<&str>, ReadError> {
        if self.peeked.is_none() {
            self.peeked = self.read_raw()?;
        }
        Ok(self.peeked.as_deref())
    }
}

/// Reads a whole module log. `module` is the path of the module inside the
/// repository and is stripped from RCS file paths.
pub(crate) fn read_log(
    source: &mut dyn std::io::BufRead,
    module: &str,
) -> Result<LogData, ReadError> {
    let mut lines = Lines::new(source);
    let mut data = LogData {
        files: FileSet::new(),
        revisions: Vec::new(),
    };

    while let Some(line) = lines.next()? {
        if let Some(rcs_path) = line.strip_prefix("RCS file: ") {
            let name = rcs_path_to_name(rcs_path, module).ok_or_else(|| ReadError::InvalidPath {
                line: lines.line_no,
                path: rcs_path.into(),
            })?;
            read_file(&mut lines, &name, &mut data)?;
        } else if line.trim().is_empty()
            || line.starts_with('?')
            || line.starts_with("cvs rlog: ")
            || line.starts_with("cvs log: ")
            || line.starts_with("Working file: ")
        {
            // noise between file sections
        } else {
            return Err(ReadError::UnexpectedLine {
                line: lines.line_no,
                data: line,
            });
        }
    }

    Ok(data)
}

/// `/cvsroot/module/dir/Attic/file.c,v` -> `dir/file.c`
fn rcs_path_to_name(rcs_path: &str, module: &str) -> Option<String> {
    let path = rcs_path.trim().strip_suffix(",v")?;
    let module = module.trim_matches('/');

    let rel_path = if module.is_empty() || module == "." {
        path.trim_start_matches('/')
    } else {
        let marker = format!("/{module}/");
        let i = path.find(&marker)?;
        &path[(i + marker.len())..]
    };

    let (dir, file_name) = match rel_path.rfind('/') {
        Some(i) => (&rel_path[..i], &rel_path[(i + 1)..]),
        None => ("", rel_path),
    };
    if file_name.is_empty() {
        return None;
    }

    let dir = if dir == "Attic" {
        ""
    } else {
        dir.strip_suffix("/Attic").unwrap_or(dir)
    };

    if dir.is_empty() {
        Some(file_name.into())
    } else {
        Some(format!("{dir}/{file_name}"))
    }
}

fn read_file(lines: &mut Lines<'_>, name: &str, data: &mut LogData) -> Result<(), ReadError> {
    let file = data.files.insert(name);
    tracing::trace!("reading log of \"{name}\"");

    // header
    loop {
        let line = lines.next_required()?;
        if line == "symbolic names:" {
            while let Some(next) = lines.peek()? {
                if !next.starts_with('\t') && !next.starts_with(' ') {
                    break;
                }
                let symbol_line = lines.next_required()?;
                let (symbol, raw_rev) =
                    symbol_line
                        .trim()
                        .split_once(": ")
                        .ok_or_else(|| ReadError::UnexpectedLine {
                            line: lines.line_no,
                            data: symbol_line.clone(),
                        })?;
                let revision = parse_revision(raw_rev.trim(), lines.line_no)?;
                data.files[file].add_symbol(symbol, revision);
            }
        } else if line == "description:" {
            break;
        } else if line == FILE_SEPARATOR {
            // no description and no revisions
            return Ok(());
        }
    }

    // description, up to the first revision
    loop {
        let line = lines.next_required()?;
        if line == FILE_SEPARATOR {
            return Ok(());
        }
        if line == REVISION_SEPARATOR && lines.peek()?.is_some_and(|l| l.starts_with("revision ")) {
            break;
        }
    }

    loop {
        let more = read_revision(lines, file, data)?;
        if !more {
            return Ok(());
        }
    }
}

fn read_revision(
    lines: &mut Lines<'_>,
    file: usize,
    data: &mut LogData,
) -> Result<bool, ReadError> {
    let rev_line = lines.next_required()?;
    let raw_rev = rev_line
        .strip_prefix("revision ")
        .ok_or_else(|| ReadError::UnexpectedLine {
            line: lines.line_no,
            data: rev_line.clone(),
        })?;
    // "revision 1.2	locked by: bob;"
    let raw_rev = raw_rev.split_whitespace().next().unwrap_or_default();
    let revision = parse_revision(raw_rev, lines.line_no)?;

    let info_line = lines.next_required()?;
    let info_line_no = lines.line_no;
    let fields = parse_fields(&info_line);

    let raw_date = field(&fields, "date", info_line_no)?;
    let time = parse_date(raw_date).ok_or_else(|| ReadError::InvalidDate {
        line: info_line_no,
        date: raw_date.into(),
    })?;
    let author = field(&fields, "author", info_line_no)?.to_string();
    let state = field(&fields, "state", info_line_no)?;
    let commit_id = optional_field(&fields, "commitid").unwrap_or_default().to_string();
    let mergepoint = optional_field(&fields, "mergepoint")
        .map(|raw| parse_revision(raw, info_line_no))
        .transpose()?;

    let mut message = String::new();
    let mut first_line = true;
    let more = loop {
        let line = lines.next_required()?;
        if first_line && line.starts_with("branches:") {
            first_line = false;
            continue;
        }
        first_line = false;

        if line == FILE_SEPARATOR && lines.peek()?.is_none_or(is_section_start) {
            break false;
        }
        if line == REVISION_SEPARATOR && lines.peek()?.is_some_and(|l| l.starts_with("revision "))
        {
            break true;
        }

        if !message.is_empty() || !line.is_empty() {
            message.push_str(&line);
            message.push('\n');
        }
    };

    let mut message = message.trim_end().to_string();
    if message == EMPTY_MESSAGE {
        message.clear();
    }

    let is_dead = state == "dead";
    if is_dead {
        data.files[file].mark_dead(revision.clone());
    }

    data.revisions.push(FileRevision {
        file,
        revision,
        mergepoint,
        time,
        author,
        commit_id,
        is_dead,
        message,
    });

    Ok(more)
}

fn is_section_start(line: &str) -> bool {
    line.is_empty() || line.starts_with("RCS file: ")
}

fn parse_fields(line: &str) -> Vec<(&str, &str)> {
    line.split(';')
        .filter_map(|field| {
            let (key, value) = field.split_once(':')?;
            Some((key.trim(), value.trim()))
        })
        .collect()
}

fn field<'a>(
    fields: &[(&str, &'a str)],
    key: &'static str,
    line: usize,
) -> Result<&'a str, ReadError> {
    optional_field(fields, key).ok_or(ReadError::MissingField { line, field: key })
}

fn optional_field<'a>(fields: &[(&str, &'a str)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|&&(k, _)| k == key)
        .map(|&(_, v)| v)
        .filter(|v| !v.is_empty())
}

fn parse_revision(raw: &str, line: usize) -> Result<Revision, ReadError> {
    Revision::parse(raw).map_err(|error| ReadError::InvalidRevision { line, error })
}

/// Old servers write `2009/03/05 12:00:00` (UTC), newer ones
/// `2009-03-05 12:00:00 +0000`.
fn parse_date(raw: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    if let Ok(date) = chrono::DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S %z") {
        return Some(date.with_timezone(&chrono::Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y/%m/%d %H:%M:%S")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .map(|date| date.and_utc())
}

#[cfg(test)]
mod tests {
    use super::{parse_date, rcs_path_to_name, read_log};
    use crate::cvs::file::MAIN_BRANCH;
    use crate::cvs::revision::rev;

    const LOG: &str = indoc::indoc! {"
        RCS file: /cvsroot/mod/file1.txt,v
        head: 1.2
        branch:
        locks: strict
        access list:
        symbolic names:
            tag1: 1.2
            branch1: 1.1.0.2
        keyword substitution: kv
        total revisions: 3;\tselected revisions: 3
        description:
        ----------------------------
        revision 1.2
        date: 2009/03/05 12:00:10;  author: bob;  state: Exp;  lines: +1 -0;  commitid: c2;
        second

        with blank line
        ----------------------------
        revision 1.1
        date: 2009/03/05 12:00:00;  author: alice;  state: Exp;  commitid: c1;
        branches:  1.1.2;
        *** empty log message ***
        ----------------------------
        revision 1.1.2.1
        date: 2009-03-06 12:00:00 +0100;  author: bob;  state: Exp;  lines: +1 -0;  commitid: c3;  mergepoint: 1.2;
        on branch
        =============================================================================

        RCS file: /cvsroot/mod/dir/Attic/file2.txt,v
        head: 1.1
        symbolic names:
            branch1: 1.1.0.2
        description:
        ----------------------------
        revision 1.1
        date: 2009/03/05 12:00:00;  author: alice;  state: dead;
        file file2.txt was initially added on branch branch1.
        =============================================================================
    "};

    #[test]
    fn test_read_log() {
        let data = read_log(&mut LOG.as_bytes(), "mod").unwrap();

        assert_eq!(data.files.len(), 2);
        let file1 = data.files.find("file1.txt").unwrap();
        let file2 = data.files.find("dir/file2.txt").unwrap();
        assert_eq!(data.files[file1].tag_revision("tag1"), Some(&rev("1.2")));
        assert_eq!(data.files[file1].branchpoint("branch1"), Some(rev("1.1")));
        assert_eq!(data.files[file2].branch_of(&rev("1.1")), Some(MAIN_BRANCH));
        assert!(data.files[file2].is_dead(&rev("1.1")));

        assert_eq!(data.revisions.len(), 4);
        let r = &data.revisions[0];
        assert_eq!(r.file, file1);
        assert_eq!(r.revision, rev("1.2"));
        assert_eq!(r.author, "bob");
        assert_eq!(r.commit_id, "c2");
        assert_eq!(r.message, "second\n\nwith blank line");
        assert!(!r.is_dead);

        let r = &data.revisions[1];
        assert_eq!(r.revision, rev("1.1"));
        assert_eq!(r.message, "");

        let r = &data.revisions[2];
        assert_eq!(r.revision, rev("1.1.2.1"));
        assert_eq!(r.mergepoint, Some(rev("1.2")));
        assert_eq!(r.time, parse_date("2009/03/06 11:00:00").unwrap());

        let r = &data.revisions[3];
        assert_eq!(r.file, file2);
        assert!(r.is_dead);
        assert_eq!(r.commit_id, "");
        assert_eq!(
            r.message,
            "file file2.txt was initially added on branch branch1.",
        );
    }

    #[test]
    fn test_rcs_path_to_name() {
        assert_eq!(
            rcs_path_to_name("/cvs/mod/a/b.c,v", "mod").as_deref(),
            Some("a/b.c"),
        );
        assert_eq!(
            rcs_path_to_name("/cvs/mod/a/Attic/b.c,v", "mod").as_deref(),
            Some("a/b.c"),
        );
        assert_eq!(
            rcs_path_to_name("/cvs/mod/Attic/b.c,v", "mod").as_deref(),
            Some("b.c"),
        );
        assert_eq!(
            rcs_path_to_name("/cvs/mod/sub/x,v", "/mod/sub/").as_deref(),
            Some("x"),
        );
        assert_eq!(rcs_path_to_name("/cvs/other/b.c,v", "mod"), None);
        assert_eq!(rcs_path_to_name("/cvs/mod/b.c", "mod"), None);
    }

    #[test]
    fn test_truncated_log() {
        let log = "RCS file: /cvsroot/mod/a,v\nhead: 1.1\n";
        assert!(read_log(&mut log.as_bytes(), "mod").is_err());
    }
}
