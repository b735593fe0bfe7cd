use std::collections::BTreeMap;

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Test {
    #[serde(default = "default_module")]
    pub(crate) module: String,
    #[serde(rename = "cvs-files")]
    pub(crate) cvs_files: Vec<CvsFile>,
    #[serde(rename = "conv-params", default = "String::new")]
    pub(crate) conv_params: String,
    #[serde(rename = "user-map")]
    pub(crate) user_map: Option<String>,
    #[serde(rename = "cvs-processes")]
    pub(crate) cvs_processes: Option<usize>,
    #[serde(rename = "failed", default = "false_")]
    pub(crate) failed: bool,
    #[serde(rename = "logs")]
    pub(crate) logs: Option<String>,
    #[serde(rename = "git-refs")]
    pub(crate) git_refs: Option<BTreeMap<String, usize>>,
    #[serde(rename = "git-commits")]
    pub(crate) git_commits: Option<Vec<GitCommit>>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CvsFile {
    pub(crate) path: String,
    #[serde(default = "false_")]
    pub(crate) attic: bool,
    #[serde(default = "BTreeMap::new")]
    pub(crate) symbols: BTreeMap<String, String>,
    pub(crate) revisions: Vec<CvsRevision>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct CvsRevision {
    pub(crate) rev: String,
    pub(crate) date: String,
    pub(crate) author: String,
    #[serde(default = "default_state")]
    pub(crate) state: String,
    pub(crate) commitid: Option<String>,
    pub(crate) mergepoint: Option<String>,
    #[serde(default = "Vec::new")]
    pub(crate) branches: Vec<String>,
    #[serde(default = "String::new")]
    pub(crate) message: String,
}

/// One `commit` command of the fast-import stream. Parents are indices
/// in the list of expected commits.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct GitCommit {
    #[serde(rename = "ref")]
    pub(crate) git_ref: String,
    pub(crate) author: Option<String>,
    pub(crate) committer: Option<String>,
    pub(crate) message: Option<String>,
    #[serde(default = "Vec::new")]
    pub(crate) parents: Vec<usize>,
    /// `None` for a deleted file.
    pub(crate) files: Option<BTreeMap<String, Option<String>>>,
}

fn default_module() -> String {
    "module".into()
}

fn default_state() -> String {
    "Exp".into()
}

#[inline(always)]
fn false_() -> bool {
    false
}
