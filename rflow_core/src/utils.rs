use std::collections::HashMap;
use std::path::Path;

use crate::vars::{
    KEYWORD_BASE, KEYWORD_DIR, KEYWORD_EXTENSION, KEYWORD_FILENAME, KEYWORD_JOB, KEYWORD_PATH,
    KEYWORD_PREFIX, KEYWORD_REL_DIR, KEYWORD_REL_PATH,
};

/// Determine the plural form for a number. (Does it need an 's' on the end?)
pub fn plural_s(i: usize) -> &'static str {
    crate::vars::plural_s(i)
}

/// Substitute the brace-delimited keywords in every string value of
/// `parameters` with values derived from the triggering path, job id,
/// and monitor base directory. Non-string values pass through untouched.
/// Idempotent on strings that contain no keywords.
pub fn replace_keywords(
    parameters: &HashMap<String, serde_json::Value>,
    job_id: &str,
    src_path: &Path,
    monitor_base: &Path,
) -> HashMap<String, serde_json::Value> {
    let filename = src_path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let dirname = src_path
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let relpath = src_path
        .strip_prefix(monitor_base)
        .unwrap_or(src_path)
        .to_string_lossy()
        .to_string();
    let reldirname = Path::new(&relpath)
        .parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default();
    let (prefix, extension) = split_extension(&filename);
    let path_str = src_path.to_string_lossy().to_string();
    let base_str = monitor_base.to_string_lossy().to_string();

    let mut result = HashMap::with_capacity(parameters.len());
    for (key, value) in parameters {
        let new_value = match value {
            serde_json::Value::String(s) => {
                let mut v = s.clone();
                v = v.replace(KEYWORD_PATH, &path_str);
                v = v.replace(KEYWORD_REL_PATH, &relpath);
                v = v.replace(KEYWORD_DIR, &dirname);
                v = v.replace(KEYWORD_REL_DIR, &reldirname);
                v = v.replace(KEYWORD_FILENAME, &filename);
                v = v.replace(KEYWORD_PREFIX, &prefix);
                v = v.replace(KEYWORD_BASE, &base_str);
                v = v.replace(KEYWORD_EXTENSION, &extension);
                v = v.replace(KEYWORD_JOB, job_id);
                serde_json::Value::String(v)
            }
            other => other.clone(),
        };
        result.insert(key.clone(), new_value);
    }
    result
}

fn split_extension(filename: &str) -> (String, String) {
    match filename.rfind('.') {
        Some(0) => (filename.to_string(), String::new()),
        Some(idx) => (filename[..idx].to_string(), filename[idx..].to_string()),
        None => (filename.to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_s_picks_singular_only_for_one() {
        assert_eq!(plural_s(0), "s");
        assert_eq!(plural_s(1), "");
        assert_eq!(plural_s(2), "s");
    }

    #[test]
    fn replace_keywords_substitutes_all_tokens() {
        let mut params = HashMap::new();
        params.insert(
            "infile".to_string(),
            serde_json::json!("{PATH}"),
        );
        params.insert(
            "outfile".to_string(),
            serde_json::json!("output/{PREFIX}_done{EXTENSION}"),
        );
        params.insert("count".to_string(), serde_json::json!(42));

        let base = Path::new("/base");
        let src = Path::new("/base/start/A.txt");
        let result = replace_keywords(&params, "job-1", src, base);

        assert_eq!(result["infile"], serde_json::json!("/base/start/A.txt"));
        assert_eq!(
            result["outfile"],
            serde_json::json!("output/A_done.txt")
        );
        assert_eq!(result["count"], serde_json::json!(42));
    }

    #[test]
    fn replace_keywords_is_idempotent_without_keywords() {
        let mut params = HashMap::new();
        params.insert("plain".to_string(), serde_json::json!("no keywords here"));
        let base = Path::new("/base");
        let src = Path::new("/base/start/A.txt");

        let once = replace_keywords(&params, "job-1", src, base);
        let twice = replace_keywords(&once, "job-1", src, base);
        assert_eq!(once, twice);
    }
}
