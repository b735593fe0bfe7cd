use regex_syntax::hir::{self as regex_hir, Hir};

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ParseError {
    InvalidDoubleAsterisk,
    UnallowedSlash,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDoubleAsterisk => write!(f, "invalid '**'"),
            Self::UnallowedSlash => write!(f, "unallowed '/'"),
        }
    }
}

/// What a pattern is matched against.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum PatternKind {
    /// Slash separated file paths, `**` matches any number of directories.
    Path,
    /// Tag and branch names, `/` and `**` are not allowed.
    Name,
}

fn non_slash() -> Hir {
    Hir::class(regex_hir::Class::Bytes(regex_hir::ClassBytes::new([
        regex_hir::ClassBytesRange::new(u8::MIN, b'/' - 1),
        regex_hir::ClassBytesRange::new(b'/' + 1, u8::MAX),
    ])))
}

fn any_of(sub: Hir) -> Hir {
    Hir::repetition(regex_hir::Repetition {
        min: 0,
        max: None,
        greedy: true,
        sub: Box::new(sub),
    })
}

/// Translates one path component, where `*` and `?` never match `/`.
fn component_to_hir(component: &str, out: &mut Vec<Hir>) -> Result<(), ParseError> {
    let mut literal = Vec::new();
    let mut chars = component.chars().peekable();
    while let Some(chr) = chars.next() {
        match chr {
            '*' | '?' => {
                if chr == '*' && chars.peek() == Some(&'*') {
                    return Err(ParseError::InvalidDoubleAsterisk);
                }
                if !literal.is_empty() {
                    out.push(Hir::literal(std::mem::take(&mut literal)));
                }
                out.push(if chr == '*' {
                    any_of(non_slash())
                } else {
                    non_slash()
                });
            }
            _ => {
                let mut buf = [0; 4];
                literal.extend_from_slice(chr.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    if !literal.is_empty() {
        out.push(Hir::literal(literal));
    }
    Ok(())
}

fn pattern_to_hir(pattern: &str, kind: PatternKind) -> Result<Hir, ParseError> {
    let mut hir = vec![Hir::look(regex_hir::Look::Start)];

    if kind == PatternKind::Name && pattern.contains('/') {
        return Err(ParseError::UnallowedSlash);
    }

    let components: Vec<_> = pattern.split('/').collect();
    for (i, &component) in components.iter().enumerate() {
        let is_last = i + 1 == components.len();
        if component == "**" {
            if kind == PatternKind::Name {
                return Err(ParseError::InvalidDoubleAsterisk);
            }
            if is_last {
                // ".*"
                hir.push(any_of(Hir::dot(regex_hir::Dot::AnyByte)));
            } else {
                // "([^/]*/)*"
                hir.push(any_of(Hir::concat(vec![
                    any_of(non_slash()),
                    Hir::literal(b"/".as_slice()),
                ])));
            }
            continue;
        }

        component_to_hir(component, &mut hir)?;
        if !is_last {
            hir.push(Hir::literal(b"/".as_slice()));
        }
    }

    hir.push(Hir::look(regex_hir::Look::End));
    Ok(Hir::concat(hir))
}

/// A set of glob patterns (`*`, `?` and, for paths, `**`). An empty set
/// matches nothing.
#[derive(Default)]
pub(crate) struct PathPattern {
    regex: Option<regex_automata::meta::Regex>,
}

impl PathPattern {
    pub(crate) fn new<'a>(
        patterns: impl IntoIterator<Item = &'a str>,
        kind: PatternKind,
    ) -> Result<Self, (&'a str, ParseError)> {
        let mut hirs = Vec::new();
        for pattern in patterns {
            hirs.push(pattern_to_hir(pattern, kind).map_err(|e| (pattern, e))?);
        }

        if hirs.is_empty() {
            Ok(Self { regex: None })
        } else {
            let regex = regex_automata::meta::Builder::new()
                .build_many_from_hir(&hirs)
                .expect("failed to build regex");

            Ok(Self { regex: Some(regex) })
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.regex.is_none()
    }

    pub(crate) fn is_match(&self, input: &str) -> bool {
        self.regex
            .as_ref()
            .is_some_and(|regex| regex.is_match(input.as_bytes()))
    }
}
