use crate::convert::{CvsCommitInfo, GitCommitMeta};
use crate::git::Signature;
use crate::user_map::UserMap;

pub(crate) const DEFAULT_USER_FALLBACK_TEMPLATE: &str =
    r#"{{ cvs_author or "no-author" }} <{{ cvs_author or "no-author" }}>"#;

pub(crate) const DEFAULT_COMMIT_MSG_TEMPLATE: &str = indoc::indoc! {r#"
    {{ cvs_message }}{% if cvs_commit_id %}

    [[CVS commit: {{ cvs_commit_id }}]]{% endif %}
"#};

pub(crate) struct GitMetaMaker<'a> {
    user_map: &'a UserMap,
    jinja_env: minijinja::Environment<'a>,
}

impl<'a> GitMetaMaker<'a> {
    pub(crate) fn new(
        user_map: &'a UserMap,
        user_fallback_template: &'a str,
        commit_msg_template: &'a str,
    ) -> Result<Self, String> {
        let mut jinja_env = minijinja::Environment::empty();
        jinja_env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);

        jinja_env
            .add_template("user_fallback", user_fallback_template)
            .map_err(|e| format!("failed to parse user fallback template: {e}"))?;
        jinja_env
            .add_template("commit_msg", commit_msg_template)
            .map_err(|e| format!("failed to parse commit message template: {e}"))?;

        Ok(Self {
            user_map,
            jinja_env,
        })
    }

    fn render(&self, template: &str, ctx: &JinjaCtx) -> Result<String, String> {
        self.jinja_env
            .get_template(template)
            .and_then(|template| template.render(ctx))
            .map_err(|e| format!("failed to render {template} template: {e}"))
    }
}

impl crate::convert::CommitMetaMaker for GitMetaMaker<'_> {
    fn make_commit_meta(&self, commit: &CvsCommitInfo<'_>) -> Result<GitCommitMeta, String> {
        let mapped = self.user_map.get(commit.author);
        let jinja_ctx = JinjaCtx {
            cvs_author: commit.author.into(),
            cvs_commit_id: commit.commit_id.into(),
            cvs_branch: commit.branch.into(),
            cvs_message: commit.message.trim_end().into(),
            mapped_author_name: mapped.map(|(name, _)| name.into()).unwrap_or_default(),
            mapped_author_email: mapped.map(|(_, email)| email.into()).unwrap_or_default(),
        };

        let (name, email) = match mapped {
            Some((name, email)) => (name.to_string(), email.to_string()),
            None => {
                let author = self.render("user_fallback", &jinja_ctx)?;
                let Some((name, email)) = split_author_name_email(&author) else {
                    return Err(format!(
                        "author {author:?} is not in \"name <email>\" format"
                    ));
                };
                (name.into(), email.into())
            }
        };

        let mut message = self
            .render("commit_msg", &jinja_ctx)?
            .replace("\r\n", "\n");
        if !message.ends_with('\n') {
            message.push('\n');
        }

        let author = Signature {
            name,
            email,
            time: commit.time,
        };
        Ok(GitCommitMeta {
            committer: author.clone(),
            author,
            message,
        })
    }
}

#[derive(serde::Serialize)]
struct JinjaCtx {
    cvs_author: String,
    cvs_commit_id: String,
    cvs_branch: String,
    cvs_message: String,
    mapped_author_name: String,
    mapped_author_email: String,
}

fn split_author_name_email(raw: &str) -> Option<(&str, &str)> {
    if raw.contains('\n') {
        return None;
    }

    let i_lt = raw.find('<')?;

    let name = raw[..i_lt].trim_matches(' ');
    let email = raw[(i_lt + 1)..]
        .trim_end_matches(' ')
        .strip_suffix('>')?
        .trim_matches(' ');

    Some((name, email))
}

#[cfg(test)]
mod tests {
    use super::{
        DEFAULT_COMMIT_MSG_TEMPLATE, DEFAULT_USER_FALLBACK_TEMPLATE, GitMetaMaker,
        split_author_name_email,
    };
    use crate::convert::{CommitMetaMaker as _, CvsCommitInfo};
    use crate::user_map::UserMap;

    fn info<'a>(author: &'a str, commit_id: &'a str) -> CvsCommitInfo<'a> {
        CvsCommitInfo {
            commit_id,
            branch: "MAIN",
            author,
            message: "Fix the build\n",
            time: chrono::DateTime::from_timestamp(1_000_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_default_templates() {
        let user_map = UserMap::parse(&mut "jdoe = John Doe <jdoe@example.com>\n".as_bytes()).unwrap();
        let maker = GitMetaMaker::new(
            &user_map,
            DEFAULT_USER_FALLBACK_TEMPLATE,
            DEFAULT_COMMIT_MSG_TEMPLATE,
        )
        .unwrap();

        let meta = maker.make_commit_meta(&info("jdoe", "100ABC")).unwrap();
        assert_eq!(meta.author.name, "John Doe");
        assert_eq!(meta.author.email, "jdoe@example.com");
        assert_eq!(meta.committer, meta.author);
        assert_eq!(meta.message, "Fix the build\n\n[[CVS commit: 100ABC]]\n");

        let meta = maker.make_commit_meta(&info("anon", "")).unwrap();
        assert_eq!(meta.author.name, "anon");
        assert_eq!(meta.author.email, "anon");
        assert_eq!(meta.message, "Fix the build\n");
    }

    #[test]
    fn test_custom_templates() {
        let user_map = UserMap::new();
        let maker = GitMetaMaker::new(
            &user_map,
            "{{ cvs_author }} <{{ cvs_author }}@cvs.example.com>",
            "[{{ cvs_branch }}] {{ cvs_message }}",
        )
        .unwrap();

        let meta = maker.make_commit_meta(&info("anon", "")).unwrap();
        assert_eq!(meta.author.email, "anon@cvs.example.com");
        assert_eq!(meta.message, "[MAIN] Fix the build\n");

        assert!(GitMetaMaker::new(&user_map, "{{", "").is_err());
        let maker = GitMetaMaker::new(&user_map, "no email", "").unwrap();
        assert!(maker.make_commit_meta(&info("anon", "")).is_err());
    }

    #[test]
    fn test_split_author_name_email() {
        assert_eq!(
            split_author_name_email("A U Thor <a@b>"),
            Some(("A U Thor", "a@b")),
        );
        assert_eq!(split_author_name_email("A <a@b"), None);
        assert_eq!(split_author_name_email("A\n<a@b>"), None);
    }
}
