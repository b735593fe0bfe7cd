use std::collections::BTreeMap;

use super::repo_state::ConsistencyError;
use super::resolver::{Resolver, UnresolvedTag};

/// Derives the name of the tag that marks where a branch was created
/// from the branch name, e.g. `^(.*)$` -> `$1-branchpoint`.
pub(crate) struct BranchpointRule {
    regex: regex_automata::meta::Regex,
    replacement: String,
}

impl BranchpointRule {
    pub(crate) fn new(
        pattern: &str,
        replacement: &str,
    ) -> Result<Self, regex_automata::meta::BuildError> {
        Ok(Self {
            regex: regex_automata::meta::Regex::new(pattern)?,
            replacement: replacement.into(),
        })
    }

    pub(crate) fn tag_for(&self, branch: &str) -> Option<String> {
        let mut caps = self.regex.create_captures();
        self.regex.captures(branch, &mut caps);
        if !caps.is_match() {
            return None;
        }

        let mut tag = String::new();
        caps.interpolate_string_into(branch, &self.replacement, &mut tag);
        Some(tag)
    }
}

/// Places branches at the commit of their branchpoint tag when the tag
/// was resolved, and resolves the remaining branches automatically.
pub(crate) struct ManualBranchResolver<'r, 'a> {
    rule: &'r BranchpointRule,
    resolved_tags: &'r BTreeMap<String, usize>,
    inner: Resolver<'a>,
    manual: BTreeMap<String, usize>,
}

impl<'r, 'a> ManualBranchResolver<'r, 'a> {
    pub(crate) fn new(
        rule: &'r BranchpointRule,
        resolved_tags: &'r BTreeMap<String, usize>,
        inner: Resolver<'a>,
    ) -> Self {
        Self {
            rule,
            resolved_tags,
            inner,
            manual: BTreeMap::new(),
        }
    }

    pub(crate) fn resolve(&mut self, names: &[String]) -> Result<bool, ConsistencyError> {
        self.manual.clear();

        let mut remaining = Vec::new();
        for name in names.iter() {
            let commit = self
                .rule
                .tag_for(name)
                .and_then(|tag| self.resolved_tags.get(&tag).map(|&c| (tag, c)));
            match commit {
                Some((tag, commit)) => {
                    tracing::debug!("branch {name} starts at tag {tag}");
                    self.manual.insert(name.clone(), commit);
                }
                None => remaining.push(name.clone()),
            }
        }

        if !remaining.is_empty() {
            tracing::info!(
                "{} branches have no branchpoint tag, resolving them automatically",
                remaining.len(),
            );
        }
        self.inner.resolve(&remaining)
    }

    pub(crate) fn into_parts(self) -> (Vec<usize>, BTreeMap<String, usize>, Vec<UnresolvedTag>) {
        let (commits, mut resolved, unresolved) = self.inner.into_parts();
        resolved.extend(self.manual);
        (commits, resolved, unresolved)
    }
}
