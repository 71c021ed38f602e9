// Upload name templating
//
// One left-to-right pass over the pattern. Replacement text is never
// rescanned, and unknown `{tokens}` pass through literally.

use chrono::{DateTime, Utc};
use rand::Rng;

/// Split a file name into `(stem, extension-with-dot)`
///
/// Leading dots belong to the stem, so `.profile` has no extension.
pub fn split_extension(filename: &str) -> (&str, &str) {
    let leading = filename.len() - filename.trim_start_matches('.').len();
    match filename[leading..].rfind('.') {
        Some(pos) => filename.split_at(leading + pos),
        None => (filename, ""),
    }
}

fn resolve_token(token: &str, filename: &str, now: &DateTime<Utc>) -> Option<String> {
    let (basename, ext) = split_extension(filename);
    let value = match token {
        "filename" => filename.to_string(),
        "basename" => basename.to_string(),
        "ext" => ext.to_string(),
        "timestamp" => now.format("%Y%m%d%H%M%S").to_string(),
        "date" => now.format("%Y%m%d").to_string(),
        "time" => now.format("%H%M%S").to_string(),
        "uuid" => uuid::Uuid::new_v4().to_string(),
        "random" => format!("{:08x}", rand::thread_rng().gen::<u32>()),
        _ => return None,
    };
    Some(value)
}

/// Compute the upload name for `filename`
///
/// An empty pattern, or one that expands to itself, keeps the original name.
pub fn apply_rename(pattern: &str, filename: &str, now: &DateTime<Utc>) -> String {
    if pattern.is_empty() {
        return filename.to_string();
    }

    let mut out = String::with_capacity(pattern.len() + filename.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let token = &after[..close];
                match resolve_token(token, filename, now) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(token);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);

    if out == pattern {
        filename.to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap()
    }

    #[test]
    fn test_basename_and_ext_independent_of_time() {
        for now in [at(0, 0, 0), at(23, 59, 59)] {
            assert_eq!(
                apply_rename("archive_{basename}{ext}", "data.csv", &now),
                "archive_data.csv"
            );
        }
    }

    #[test]
    fn test_time_tokens() {
        let now = at(7, 5, 3);
        assert_eq!(
            apply_rename("{basename}_{timestamp}{ext}", "data.csv", &now),
            "data_20240309070503.csv"
        );
        assert_eq!(apply_rename("{date}-{time}-{filename}", "a.txt", &now), "20240309-070503-a.txt");
    }

    #[test]
    fn test_random_tokens_have_expected_shape() {
        let now = at(0, 0, 0);
        let name = apply_rename("{random}", "a.txt", &now);
        assert_eq!(name.len(), 8);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));

        let name = apply_rename("{uuid}{ext}", "a.txt", &now);
        assert!(uuid::Uuid::parse_str(name.trim_end_matches(".txt")).is_ok());
    }

    #[test]
    fn test_no_recognized_tokens_keeps_original_name() {
        let now = at(0, 0, 0);
        assert_eq!(apply_rename("fixed.csv", "data.csv", &now), "data.csv");
        assert_eq!(apply_rename("{unknown}", "data.csv", &now), "data.csv");
        assert_eq!(apply_rename("", "data.csv", &now), "data.csv");
    }

    #[test]
    fn test_unknown_tokens_pass_through_and_output_is_not_rescanned() {
        let now = at(0, 0, 0);
        assert_eq!(apply_rename("{x}_{basename}", "a.txt", &now), "{x}_a");
        // A produced "{ext}" must not be expanded again
        assert_eq!(apply_rename("{filename}", "{ext}.txt", &now), "{ext}.txt");
        assert_eq!(apply_rename("{basename}-{", "a.txt", &now), "a-{");
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("data.csv"), ("data", ".csv"));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension("README"), ("README", ""));
        assert_eq!(split_extension(".profile"), (".profile", ""));
        assert_eq!(split_extension("..a.b"), ("..a", ".b"));
    }
}
