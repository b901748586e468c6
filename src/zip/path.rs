//! Entry path cleaning and traversal checks.

/// Lexically clean an archive path: backslashes become `/`, empty and `.`
/// segments drop out, and `..` cancels the preceding segment where one
/// exists. Leading `..` segments of a relative path are kept.
pub fn clean_path(raw: &str) -> String {
    let unified = raw.replace('\\', "/");
    let absolute = unified.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for seg in unified.split('/') {
        match seg {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Return the cleaned relative path of an entry, or `None` when writing it
/// under a destination root could land outside that root.
pub fn sanitize_entry_path(raw: &str) -> Option<String> {
    let clean = clean_path(raw);
    if clean.is_empty()
        || clean == ".."
        || clean.starts_with("../")
        || clean.starts_with('/')
        || clean.contains(":/")
        || has_drive_prefix(&clean)
    {
        return None;
    }
    Some(clean)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}
