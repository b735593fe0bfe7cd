use std::collections::HashMap;

/// Maps CVS user names to git identities, read from
/// `cvsuser = Name <email>` lines. Empty lines and lines starting with
/// `#` are ignored.
pub(crate) struct UserMap {
    map: HashMap<String, UserMapEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct UserMapEntry {
    name: String,
    email: String,
}

#[derive(Debug)]
pub(crate) enum UserMapParseError {
    Io(std::io::Error),
    BadLine(usize, String),
    Duplicate(usize, String),
}

impl From<std::io::Error> for UserMapParseError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl std::fmt::Display for UserMapParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Io(ref e) => e.fmt(f),
            Self::BadLine(line, ref line_data) => {
                write!(f, "bad line {}: {line_data:?}", line + 1)
            }
            Self::Duplicate(line, ref user) => {
                write!(f, "line {}: user {user:?} is mapped twice", line + 1)
            }
        }
    }
}

impl UserMap {
    pub(crate) fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub(crate) fn parse(src: &mut dyn std::io::BufRead) -> Result<Self, UserMapParseError> {
        let mut map = HashMap::new();

        let mut line = String::new();
        let mut line_i = 0;
        loop {
            line.clear();
            if src.read_line(&mut line)? == 0 {
                break;
            }

            match parse_line(&line) {
                Some(Some((user, entry))) => {
                    if map.insert(user.clone(), entry).is_some() {
                        return Err(UserMapParseError::Duplicate(line_i, user));
                    }
                }
                Some(None) => {}
                None => {
                    return Err(UserMapParseError::BadLine(
                        line_i,
                        line.trim_end().to_string(),
                    ));
                }
            }
            line_i += 1;
        }

        Ok(Self { map })
    }

    pub(crate) fn get(&self, user: &str) -> Option<(&str, &str)> {
        self.map
            .get(user)
            .map(|entry| (entry.name.as_str(), entry.email.as_str()))
    }
}

fn parse_line(line: &str) -> Option<Option<(String, UserMapEntry)>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Some(None);
    }

    let (user, rest) = line.split_once('=')?;
    let user = user.trim();
    if user.is_empty() || user.contains([' ', '\t']) {
        return None;
    }

    let (name, rest) = rest.split_once('<')?;
    let email = rest.strip_suffix('>')?;
    if email.contains(['<', '>']) {
        return None;
    }

    Some(Some((
        user.into(),
        UserMapEntry {
            name: name.trim().into(),
            email: email.trim().into(),
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::{UserMap, UserMapEntry, UserMapParseError, parse_line};

    fn entry(name: &str, email: &str) -> UserMapEntry {
        UserMapEntry {
            name: name.into(),
            email: email.into(),
        }
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(
            parse_line(" jdoe = John Doe <jdoe@example.com> \n"),
            Some(Some(("jdoe".into(), entry("John Doe", "jdoe@example.com")))),
        );
        assert_eq!(
            parse_line("jdoe=John Doe<jdoe@example.com>"),
            Some(Some(("jdoe".into(), entry("John Doe", "jdoe@example.com")))),
        );
        assert_eq!(parse_line("# comment"), Some(None));
        assert_eq!(parse_line("   \r\n"), Some(None));
        assert_eq!(parse_line("jdoe John Doe <jdoe@example.com>"), None);
        assert_eq!(parse_line("j doe = John Doe <jdoe@example.com>"), None);
        assert_eq!(parse_line("jdoe = John Doe <jdoe@example.com"), None);
        assert_eq!(parse_line("jdoe = John Doe <jdoe@example.com> x"), None);
    }

    #[test]
    fn test_parse() {
        let src = "# users\njdoe = John Doe <jdoe@example.com>\n\nroot = Admin <admin@example.com>";
        let map = UserMap::parse(&mut src.as_bytes()).unwrap();
        assert_eq!(map.get("jdoe"), Some(("John Doe", "jdoe@example.com")));
        assert_eq!(map.get("root"), Some(("Admin", "admin@example.com")));
        assert_eq!(map.get("nobody"), None);

        let src = "a = A <a@x>\na = B <b@x>\n";
        assert!(matches!(
            UserMap::parse(&mut src.as_bytes()),
            Err(UserMapParseError::Duplicate(1, ref user)) if user == "a",
        ));

        let src = "a = A <a@x>\nbroken\n";
        assert!(matches!(
            UserMap::parse(&mut src.as_bytes()),
            Err(UserMapParseError::BadLine(1, _)),
        ));
    }
}
