#![warn(
    rust_2018_idioms,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_qualifications
)]
#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod defs;

fn main() -> ExitCode {
    let tests_path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .canonicalize()
        .unwrap()
        .join("convert-tests")
        .join("tests");

    let mut tests_paths = BTreeSet::new();
    gather_tests(&tests_path, Path::new(""), &mut tests_paths);

    let args = libtest_mimic::Arguments::from_args();

    let tests = tests_paths
        .into_iter()
        .map(|test_path| {
            let full_test_path = tests_path.join(&test_path);
            libtest_mimic::Trial::test(test_path.with_extension("").to_string_lossy(), move || {
                test::run_test(&full_test_path).map_err(|e| e.into())
            })
        })
        .collect();

    let conclusion = libtest_mimic::run(&args, tests);
    if conclusion.has_failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Collects the YAML files under `root/sub_dir`, relative to `root`.
fn gather_tests(root: &Path, sub_dir: &Path, tests: &mut BTreeSet<PathBuf>) {
    for entry in root.join(sub_dir).read_dir().unwrap() {
        let entry = entry.unwrap();
        let entry_path = sub_dir.join(entry.file_name());

        if entry.file_type().unwrap().is_dir() {
            gather_tests(root, &entry_path, tests);
            continue;
        }

        let extension = entry_path.extension();
        if extension == Some(OsStr::new("yaml")) || extension == Some(OsStr::new("yml")) {
            let inserted = tests.insert(entry_path);
            assert!(inserted);
        }
    }
}
