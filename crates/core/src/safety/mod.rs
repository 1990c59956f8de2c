//! Path and filename validation.
//!
//! Every path derived from user input or from an archive entry passes through
//! this module before it is used for filesystem I/O. The checks are purely
//! lexical: nothing here touches the disk, so a path that does not exist yet
//! can still be validated.

use std::path::{Component, Path, PathBuf};

/// Characters rejected in filenames on either Windows or Unix filesystems.
const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*', '\0'];

/// Returns the absolute, lexically normalized form of `path`.
///
/// Relative paths are anchored at the current working directory. `.` segments
/// are dropped and `..` segments pop the previous component (never past the
/// root). Symlinks are not followed.
pub fn normalize_path(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                // PathBuf::pop refuses to remove the root, which is what we want.
                normalized.pop();
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    Some(normalized)
}

/// Returns true iff `candidate` resolves to `base` itself or to a path inside it.
pub fn is_safe_path(base: &Path, candidate: &Path) -> bool {
    match (normalize_path(base), normalize_path(candidate)) {
        (Some(base), Some(candidate)) => candidate.starts_with(&base),
        _ => false,
    }
}

/// Resolves `target` and returns it only if it lies strictly inside `base`.
///
/// This is the single traversal guard shared by every archive reader; an entry
/// that resolves to `base` itself is rejected as well, since it would replace
/// the sandbox directory rather than create a file inside it.
pub fn guard_within(base: &Path, target: &Path) -> Option<PathBuf> {
    let base = normalize_path(base)?;
    let target = normalize_path(target)?;

    if target != base && target.starts_with(&base) {
        Some(target)
    } else {
        None
    }
}

/// Returns false for names that are empty, contain a forbidden or control
/// character, or start or end with a space or dot.
pub fn is_safe_filename(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    if name.chars().any(|c| FORBIDDEN_FILENAME_CHARS.contains(&c)) {
        return false;
    }

    if name.chars().any(|c| c.is_ascii_control()) {
        return false;
    }

    name.trim_matches(|c| c == ' ' || c == '.') == name
}

/// Returns true if an archive entry path tries to leave its extraction root,
/// either by being absolute or by containing a `..` segment.
pub fn is_escaping_entry(entry: &Path) -> bool {
    entry.components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    }) || entry.to_string_lossy().starts_with(['/', '\\'])
        || entry.to_string_lossy().split(['/', '\\']).any(|seg| seg == "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_dots() {
        let normalized = normalize_path(Path::new("/music/./input/../output/a.mp3")).unwrap();
        assert_eq!(normalized, PathBuf::from("/music/output/a.mp3"));
    }

    #[test]
    fn test_normalize_does_not_pop_past_root() {
        let normalized = normalize_path(Path::new("/../../etc/passwd")).unwrap();
        assert_eq!(normalized, PathBuf::from("/etc/passwd"));
    }

    #[test]
    fn test_normalize_relative_uses_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let normalized = normalize_path(Path::new("input/a.flac")).unwrap();
        assert_eq!(normalized, cwd.join("input").join("a.flac"));
    }

    #[test]
    fn test_safe_path_inside_base() {
        assert!(is_safe_path(Path::new("/music"), Path::new("/music/input/a.flac")));
    }

    #[test]
    fn test_safe_path_equal_to_base() {
        assert!(is_safe_path(Path::new("/music"), Path::new("/music")));
        assert!(is_safe_path(Path::new("/music"), Path::new("/music/sub/..")));
    }

    #[test]
    fn test_safe_path_rejects_traversal() {
        assert!(!is_safe_path(Path::new("/music"), Path::new("/music/../etc/passwd")));
        assert!(!is_safe_path(Path::new("/music"), Path::new("/etc/passwd")));
    }

    #[test]
    fn test_safe_path_rejects_sibling_with_common_prefix() {
        // "/music-backup" shares a string prefix with "/music" but is not inside it
        assert!(!is_safe_path(Path::new("/music"), Path::new("/music-backup/a.flac")));
    }

    #[test]
    fn test_guard_within_accepts_child() {
        let guarded = guard_within(Path::new("/opt/bin"), Path::new("/opt/bin/ffmpeg")).unwrap();
        assert_eq!(guarded, PathBuf::from("/opt/bin/ffmpeg"));
    }

    #[test]
    fn test_guard_within_rejects_base_and_escape() {
        assert!(guard_within(Path::new("/opt/bin"), Path::new("/opt/bin")).is_none());
        assert!(guard_within(Path::new("/opt/bin"), Path::new("/opt/bin/..")).is_none());
        assert!(guard_within(Path::new("/opt/bin"), Path::new("/opt/bin/../../etc/passwd")).is_none());
    }

    #[test]
    fn test_safe_filenames() {
        for name in ["track.flac", "01 - Intro.mp3", "a", "Björk – Jóga.flac", "x.y.z"] {
            assert!(is_safe_filename(name), "{name:?} should be safe");
        }
    }

    #[test]
    fn test_unsafe_filenames_forbidden_chars() {
        for name in [
            "a<b", "a>b", "a:b", "a\"b", "a/b", "a\\b", "a|b", "a?b", "a*b", "a\0b",
        ] {
            assert!(!is_safe_filename(name), "{name:?} should be unsafe");
        }
    }

    #[test]
    fn test_unsafe_filenames_control_chars() {
        assert!(!is_safe_filename("tab\there"));
        assert!(!is_safe_filename("new\nline"));
        assert!(!is_safe_filename("del\u{7f}"));
    }

    #[test]
    fn test_unsafe_filenames_edges() {
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename(" leading"));
        assert!(!is_safe_filename("trailing "));
        assert!(!is_safe_filename(".hidden"));
        assert!(!is_safe_filename("trailing."));
        assert!(!is_safe_filename(".."));
    }

    #[test]
    fn test_escaping_entries() {
        assert!(is_escaping_entry(Path::new("../../etc/passwd")));
        assert!(is_escaping_entry(Path::new("/usr/bin/ffmpeg")));
        assert!(is_escaping_entry(Path::new("bin/../../ffmpeg")));
        assert!(is_escaping_entry(Path::new("..\\..\\ffmpeg.exe")));
        assert!(!is_escaping_entry(Path::new("ffmpeg-7.0-static/ffmpeg")));
        assert!(!is_escaping_entry(Path::new("./ffmpeg")));
    }
}
