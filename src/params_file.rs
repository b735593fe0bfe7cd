use std::collections::HashMap;
use std::path::PathBuf;

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConvParams {
    #[serde(rename = "include-files", default = "Vec::new")]
    pub(crate) include_files: Vec<String>,
    #[serde(rename = "exclude-files", default = "Vec::new")]
    pub(crate) exclude_files: Vec<String>,
    #[serde(rename = "head-only", default = "Vec::new")]
    pub(crate) head_only: Vec<String>,
    #[serde(rename = "head-only-author", default = "default_head_only_author")]
    pub(crate) head_only_author: String,
    #[serde(rename = "include-tags", default = "Vec::new")]
    pub(crate) include_tags: Vec<String>,
    #[serde(rename = "exclude-tags", default = "Vec::new")]
    pub(crate) exclude_tags: Vec<String>,
    #[serde(rename = "rename-tags", default = "HashMap::new")]
    pub(crate) rename_tags: HashMap<String, String>,
    #[serde(rename = "include-branches", default = "Vec::new")]
    pub(crate) include_branches: Vec<String>,
    #[serde(rename = "exclude-branches", default = "Vec::new")]
    pub(crate) exclude_branches: Vec<String>,
    #[serde(rename = "rename-branches", default = "HashMap::new")]
    pub(crate) rename_branches: HashMap<String, String>,
    #[serde(rename = "branchpoint-rule")]
    pub(crate) branchpoint_rule: Option<BranchpointRule>,
    #[serde(
        rename = "partial-tag-threshold",
        default = "default_partial_tag_threshold"
    )]
    pub(crate) partial_tag_threshold: usize,
    #[serde(rename = "ignore-unresolved-tags", default = "false_")]
    pub(crate) ignore_unresolved_tags: bool,
    #[serde(rename = "user-map-file")]
    pub(crate) user_map_file: Option<PathBuf>,
    #[serde(rename = "user-fallback-template")]
    pub(crate) user_fallback_template: Option<String>,
    #[serde(rename = "commit-msg-template")]
    pub(crate) commit_msg_template: Option<String>,
}

/// Branch `B` starts at the tag obtained by replacing `pattern` with
/// `replacement` in `B`.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct BranchpointRule {
    pub(crate) pattern: String,
    pub(crate) replacement: String,
}

#[inline(always)]
fn false_() -> bool {
    false
}

fn default_partial_tag_threshold() -> usize {
    30
}

fn default_head_only_author() -> String {
    "cvs2git".into()
}
