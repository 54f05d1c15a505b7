//! Glob matching for input file patterns
//!
//! Paths and patterns use `/` as the separator. Supported syntax:
//! - `*` matches any run of characters within one path segment
//! - `?` matches exactly one character within one path segment
//! - `**` as a whole segment matches zero or more segments
//!
//! A pattern starting with `/` is anchored at the input root. Any other
//! pattern is matched against the full relative path and, when it carries no
//! directory part, against the file's base name as well.

/// Match `pattern` against a file path relative to its input root
pub fn matches_file(pattern: &str, relative_path: &str) -> bool {
    let (pattern, anchored) = match pattern.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (pattern, false),
    };
    let relative_path = relative_path.trim_start_matches('/');

    if glob_match(pattern, relative_path) {
        return true;
    }

    if !anchored && !pattern.contains('/') {
        let base_name = relative_path.rsplit('/').next().unwrap_or(relative_path);
        return glob_match(pattern, base_name);
    }

    false
}

/// Match a full `/`-separated path against a pattern
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let path_segments: Vec<&str> = path.split('/').collect();
    match_segments(&pattern_segments, &path_segments)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => {
            // Zero or more whole segments.
            (0..=path.len()).any(|skip| match_segments(rest, &path[skip..]))
        }
        Some((segment, rest)) => match path.split_first() {
            Some((name, path_rest)) => {
                match_segment(segment, name) && match_segments(rest, path_rest)
            }
            None => false,
        },
    }
}

fn match_segment(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    // Iterative wildcard match with single-star backtracking.
    let (mut p, mut n) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            // Consecutive stars behave like one.
            while p < pattern.len() && pattern[p] == '*' {
                p += 1;
            }
            star = Some((p, n));
        } else if let Some((star_p, star_n)) = star {
            p = star_p;
            n = star_n + 1;
            star = Some((star_p, star_n + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
