//! Minimal shell-style glob matching for watched file patterns.
//!
//! A pattern without `/` matches the file name anywhere under the project
//! (`*.py` behaves like `**/*.py`). A pattern containing `/` matches the
//! project-relative path, with `**` spanning directories.

use regex::Regex;

#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    regex: Regex,
    match_path: bool,
}

impl GlobPattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&glob_to_regex(pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            match_path: pattern.contains('/'),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test a project-relative path using `/` separators.
    pub fn matches(&self, relative: &str) -> bool {
        if self.match_path {
            self.regex.is_match(relative)
        } else {
            let name = relative.rsplit('/').next().unwrap_or(relative);
            self.regex.is_match(name)
        }
    }
}

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');

    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    if chars.peek() == Some(&'/') {
                        chars.next();
                        out.push_str("(?:.*/)?");
                    } else {
                        out.push_str(".*");
                    }
                } else {
                    out.push_str("[^/]*");
                }
            }
            '?' => out.push_str("[^/]"),
            '[' => {
                let rest: String = chars.clone().collect();
                match rest.find(']') {
                    Some(close) if close > 0 => {
                        let class = &rest[..close];
                        out.push('[');
                        if let Some(negated) = class.strip_prefix('!') {
                            out.push('^');
                            out.push_str(&escape_class(negated));
                        } else {
                            out.push_str(&escape_class(class));
                        }
                        out.push(']');
                        for _ in 0..=class.chars().count() {
                            chars.next();
                        }
                    }
                    _ => out.push_str(r"\["),
                }
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }

    out.push('$');
    out
}

fn escape_class(class: &str) -> String {
    class
        .chars()
        .map(|c| match c {
            '\\' | '[' | ']' | '^' | '&' | '~' => format!("\\{}", c),
            other => other.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob(p: &str) -> GlobPattern {
        GlobPattern::new(p).unwrap()
    }

    #[test]
    fn test_extension_pattern_matches_any_depth() {
        let g = glob("*.py");
        assert!(g.matches("main.py"));
        assert!(g.matches("pkg/sub/mod.py"));
        assert!(!g.matches("main.pyc"));
        assert!(!g.matches("py/main.rs"));
    }

    #[test]
    fn test_literal_file_name() {
        let g = glob("package.json");
        assert!(g.matches("package.json"));
        assert!(g.matches("web/package.json"));
        assert!(!g.matches("packageXjson"));
    }

    #[test]
    fn test_path_pattern_with_double_star() {
        let g = glob("src/**/*.rs");
        assert!(g.matches("src/lib.rs"));
        assert!(g.matches("src/a/b/mod.rs"));
        assert!(!g.matches("tests/lib.rs"));
        assert!(!g.matches("src/lib.rs.bak"));
    }

    #[test]
    fn test_single_star_does_not_cross_directories() {
        let g = glob("docs/*.md");
        assert!(g.matches("docs/readme.md"));
        assert!(!g.matches("docs/api/readme.md"));
    }

    #[test]
    fn test_question_mark_and_classes() {
        assert!(glob("?.md").matches("a.md"));
        assert!(!glob("?.md").matches("ab.md"));
        assert!(glob("[ab].txt").matches("b.txt"));
        assert!(!glob("[ab].txt").matches("c.txt"));
        assert!(glob("[!ab].txt").matches("c.txt"));
        assert!(!glob("[!ab].txt").matches("a.txt"));
    }

    #[test]
    fn test_unclosed_bracket_is_literal() {
        let g = glob("[weird.txt");
        assert!(g.matches("[weird.txt"));
        assert_eq!(g.as_str(), "[weird.txt");
    }
}
