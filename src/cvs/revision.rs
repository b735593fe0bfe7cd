use smallvec::SmallVec;

/// A dotted CVS revision number (`1.2`, `1.2.4.1`), branch number
/// (`1.2.4`) or branch symbol (`1.2.0.4`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Revision {
    parts: SmallVec<[u32; 4]>,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ParseError {
    Empty,
    MissingDot,
    InvalidComponent(String),
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::Empty => write!(f, "empty revision"),
            Self::MissingDot => write!(f, "revision has a single component"),
            Self::InvalidComponent(ref s) => write!(f, "invalid revision component {s:?}"),
        }
    }
}

impl Revision {
    pub(crate) fn parse(s: &str) -> Result<Self, ParseError> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut parts = SmallVec::new();
        for component in s.split('.') {
            let n = component
                .parse::<u32>()
                .map_err(|_| ParseError::InvalidComponent(component.into()))?;
            parts.push(n);
        }

        if parts.len() < 2 {
            return Err(ParseError::MissingDot);
        }

        Ok(Self { parts })
    }

    fn from_parts(parts: &[u32]) -> Self {
        Self {
            parts: parts.into(),
        }
    }

    #[inline]
    pub(crate) fn parts(&self) -> &[u32] {
        &self.parts
    }

    #[inline]
    fn last(&self) -> u32 {
        self.parts[self.parts.len() - 1]
    }

    /// Whether the revision lives on the trunk (`MAIN`).
    #[inline]
    pub(crate) fn is_trunk(&self) -> bool {
        self.parts.len() == 2
    }

    /// `x.y.0.n` symbols name branches rooted at `x.y`.
    pub(crate) fn is_branch_symbol(&self) -> bool {
        let len = self.parts.len();
        len >= 4 && len % 2 == 0 && self.parts[len - 2] == 0
    }

    /// Branch numbers have an odd number of components (`1.2.4`, or the
    /// vendor branch `1.1.1`).
    #[inline]
    pub(crate) fn is_branch_number(&self) -> bool {
        self.parts.len() % 2 == 1
    }

    /// Converts a `x.y.0.n` branch symbol into the branch number `x.y.n`.
    pub(crate) fn branch_symbol_to_number(&self) -> Option<Self> {
        if !self.is_branch_symbol() {
            return None;
        }
        let len = self.parts.len();
        let mut parts: SmallVec<[u32; 4]> = self.parts[..(len - 2)].into();
        parts.push(self.parts[len - 1]);
        Some(Self { parts })
    }

    /// The branch number a revision lives on. Trunk revisions do not have
    /// one.
    pub(crate) fn branch_stem(&self) -> Option<Self> {
        if self.is_trunk() || self.is_branch_number() {
            None
        } else {
            Some(Self::from_parts(&self.parts[..(self.parts.len() - 1)]))
        }
    }

    /// The revision a branch number sprouts from (`1.2.4` → `1.2`).
    pub(crate) fn branch_root(&self) -> Option<Self> {
        if self.is_branch_number() && self.parts.len() >= 3 {
            Some(Self::from_parts(&self.parts[..(self.parts.len() - 1)]))
        } else {
            None
        }
    }

    /// Whether `next` is the revision that immediately follows `self`:
    /// either the next revision on the same line or the first revision of
    /// a branch rooted at `self`.
    pub(crate) fn directly_precedes(&self, next: &Self) -> bool {
        let len = self.parts.len();
        if next.parts.len() == len {
            self.parts[..(len - 1)] == next.parts[..(len - 1)]
                && self.last().checked_add(1) == Some(next.last())
        } else if next.parts.len() == len + 2 {
            next.parts[..len] == self.parts[..] && next.last() == 1
        } else {
            false
        }
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i != 0 {
                f.write_str(".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{self}")
    }
}

impl std::str::FromStr for Revision {
    type Err = ParseError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, ParseError> {
        Self::parse(s)
    }
}

#[cfg(test)]
pub(crate) fn rev(s: &str) -> Revision {
    Revision::parse(s).unwrap()
}

#[cfg(test)]
mod tests {
    use super::{ParseError, Revision, rev};

    #[test]
    fn test_parse() {
        assert_eq!(rev("1.2.3.4").parts(), [1, 2, 3, 4]);
        assert_eq!(rev("1.2").to_string(), "1.2");
        assert_eq!(Revision::parse(""), Err(ParseError::Empty));
        assert_eq!(Revision::parse("1"), Err(ParseError::MissingDot));
        assert_eq!(
            Revision::parse("1.x"),
            Err(ParseError::InvalidComponent("x".into())),
        );
        assert_eq!(
            Revision::parse("1..2"),
            Err(ParseError::InvalidComponent("".into())),
        );
    }

    #[test]
    fn test_branch_symbols() {
        assert!(rev("1.2.0.4").is_branch_symbol());
        assert!(!rev("1.2.4.1").is_branch_symbol());
        assert!(!rev("1.0").is_branch_symbol());
        assert_eq!(rev("1.2.0.4").branch_symbol_to_number(), Some(rev("1.2.4")));
        assert_eq!(rev("1.2.4.6.0.2").branch_symbol_to_number(), Some(rev("1.2.4.6.2")));
        assert_eq!(rev("1.2").branch_symbol_to_number(), None);

        assert!(rev("1.1.1").is_branch_number());
        assert_eq!(rev("1.1.1").branch_root(), Some(rev("1.1")));
    }

    #[test]
    fn test_branch_stem() {
        assert_eq!(rev("1.2").branch_stem(), None);
        assert_eq!(rev("1.2.4.1").branch_stem(), Some(rev("1.2.4")));
        assert_eq!(rev("1.2.4.3.2.7").branch_stem(), Some(rev("1.2.4.3.2")));
    }

    #[test]
    fn test_directly_precedes() {
        assert!(rev("1.1").directly_precedes(&rev("1.2")));
        assert!(rev("1.1").directly_precedes(&rev("1.1.2.1")));
        assert!(rev("1.1.2.1").directly_precedes(&rev("1.1.2.2")));
        assert!(rev("1.1.2.1").directly_precedes(&rev("1.1.2.1.4.1")));

        assert!(!rev("1.1").directly_precedes(&rev("1.3")));
        assert!(!rev("1.1").directly_precedes(&rev("1.1")));
        assert!(!rev("1.2").directly_precedes(&rev("1.1")));
        assert!(!rev("1.1").directly_precedes(&rev("1.1.2.2")));
        assert!(!rev("1.1").directly_precedes(&rev("1.2.2.1")));
        assert!(!rev("1.1.2.1").directly_precedes(&rev("1.2")));
        assert!(!rev("1.1").directly_precedes(&rev("2.1")));
    }

    #[test]
    fn test_directly_precedes_is_antisymmetric() {
        let revs = [
            "1.1", "1.2", "1.3", "2.1", "1.1.2.1", "1.1.2.2", "1.2.2.1", "1.1.2.1.2.1", "1.1.4.1",
        ];
        for a in revs {
            for b in revs {
                let (a, b) = (rev(a), rev(b));
                assert!(
                    !(a.directly_precedes(&b) && b.directly_precedes(&a)),
                    "{a} and {b} precede each other",
                );
            }
        }
    }
}
