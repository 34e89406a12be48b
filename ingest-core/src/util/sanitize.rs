use std::path::{Component, Path};

/// Normalise a manifest folder path: `\` becomes `/`, surrounding slashes and
/// whitespace are dropped, empty segments collapse.
pub fn normalize_folder(raw: &str) -> String {
    raw.trim()
        .replace('\\', "/")
        .split('/')
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a folder path and a file name into a package-relative name.
pub fn join_name(folder: &str, file: &str) -> String {
    let folder = normalize_folder(folder);
    let file = file.trim();
    if folder.is_empty() {
        file.to_string()
    } else {
        format!("{folder}/{file}")
    }
}

/// Normalise a staging prefix to `a/b/` form. None when it is empty or
/// escapes the area root.
pub fn normalize_prefix(raw: &str) -> Option<String> {
    let folder = normalize_folder(raw);
    is_contained(&folder).then(|| format!("{folder}/"))
}

/// True when `rel` stays inside its root: relative, no `..`, no root or prefix.
pub fn is_contained(rel: &str) -> bool {
    if rel.is_empty() || rel.starts_with('/') || rel.contains('\\') {
        return false;
    }
    Path::new(rel)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_normalisation() {
        assert_eq!(normalize_folder("Video\\DV HDR\\"), "Video/DV HDR");
        assert_eq!(normalize_folder("/a//b/"), "a/b");
        assert_eq!(normalize_folder("  "), "");
    }

    #[test]
    fn joins_with_and_without_folder() {
        assert_eq!(join_name("", "a.mp4"), "a.mp4");
        assert_eq!(join_name("Audio/", "b.wav"), "Audio/b.wav");
    }

    #[test]
    fn prefixes_end_in_a_slash() {
        assert_eq!(normalize_prefix("T1/A1").as_deref(), Some("T1/A1/"));
        assert_eq!(normalize_prefix("/T1//A1/").as_deref(), Some("T1/A1/"));
        assert_eq!(normalize_prefix("  "), None);
        assert_eq!(normalize_prefix("T1/../.."), None);
    }

    #[test]
    fn containment() {
        assert!(is_contained("a/b.mp4"));
        assert!(!is_contained("../b.mp4"));
        assert!(!is_contained("a/../../b"));
        assert!(!is_contained("/etc/passwd"));
        assert!(!is_contained(""));
    }
}
