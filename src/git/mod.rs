mod fast_import;

pub(crate) use fast_import::{CommitCommand, FastImportWriter, FileChange, Mark, Signature};

/// Turns a CVS symbol into a valid git reference name component.
pub(crate) fn legalize_ref_name(raw_name: &str) -> String {
    fn legalize_component(name: &mut String) {
        if name.ends_with(".lock") {
            name.truncate(name.len() - 5);
            name.push_str("_lock");
        } else if name.ends_with('.') {
            name.truncate(name.len() - 1);
            name.push('_');
        }
    }

    let mut legal_name = String::with_capacity(raw_name.len());
    for chr in raw_name.chars() {
        if chr == '/' {
            if !legal_name.is_empty() && !legal_name.ends_with('/') {
                legalize_component(&mut legal_name);
                legal_name.push('/');
            }
            continue;
        }

        let at_component_start = legal_name.is_empty() || legal_name.ends_with('/');
        let disallowed = matches!(
            chr,
            '\0'..=' ' | '*' | ':' | '?' | '[' | '\\' | '^' | '~' | '\x7F'
        ) || (chr == '.' && (at_component_start || legal_name.ends_with('.')))
            || (chr == '{' && legal_name.ends_with('@'))
            || (chr == '-' && legal_name.is_empty());
        legal_name.push(if disallowed { '_' } else { chr });
    }

    if legal_name.ends_with('/') {
        legal_name.pop();
    }
    legalize_component(&mut legal_name);
    if legal_name.is_empty() || legal_name == "@" {
        legal_name = "_".into();
    }

    legal_name
}
