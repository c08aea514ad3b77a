//! Version inference from binary filenames.
//!
//! Upstream publishes APKs with names like
//! `SCRM_V6.19.07.W-beta_61907-yijianshi-release.apk`; the digit run after
//! an underscore is the version code and the `V…` group the version name.
//! Both are heuristics: absence is normal and handled by the caller's
//! auto-numbering fallback, never an error.

use once_cell::sync::Lazy;
use regex::Regex;

/// First run of 3+ digits preceded by `_` and followed by a delimiter.
static VERSION_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d{3,})[-_.]").expect("version code pattern"));

/// `V` (any case) followed by a dotted numeric group, e.g. `V6.19.07`.
static VERSION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)V(\d+(?:\.\d+)+)").expect("version name pattern"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InferredVersion {
    pub version_code: Option<i64>,
    pub version_name: Option<String>,
}

pub fn infer_from_filename(filename: &str) -> InferredVersion {
    let version_code = VERSION_CODE_RE
        .captures(filename)
        .and_then(|caps| caps[1].parse::<i64>().ok());
    let version_name = VERSION_NAME_RE
        .captures(filename)
        .map(|caps| caps[1].to_string());

    InferredVersion {
        version_code,
        version_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        "SCRM_V6.19.07.W-beta_61907-yijianshi-release.apk",
        Some(61907),
        Some("6.19.07")
    )]
    #[case("tool_v2.1_300-release.apk", Some(300), Some("2.1"))]
    #[case("plain-download.apk", None, None)]
    #[case("app_12-x.apk", None, None)] // only two digits, below the threshold
    #[case("noname_777.zip", Some(777), None)]
    fn test_infer_from_filename(
        #[case] filename: &str,
        #[case] code: Option<i64>,
        #[case] name: Option<&str>,
    ) {
        let inferred = infer_from_filename(filename);
        assert_eq!(inferred.version_code, code);
        assert_eq!(inferred.version_name, name.map(str::to_string));
    }

    #[test]
    fn test_first_code_match_wins() {
        let inferred = infer_from_filename("pkg_1000-extra_2000-final.apk");
        assert_eq!(inferred.version_code, Some(1000));
    }

    #[test]
    fn test_version_name_is_case_insensitive() {
        assert_eq!(
            infer_from_filename("demo-v3.4.5.apk").version_name.as_deref(),
            Some("3.4.5")
        );
    }
}
