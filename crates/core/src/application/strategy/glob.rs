// Shell-style file name matching: `*`, `?`, `[seq]`, `[!seq]`
//
// Patterns are translated to an anchored regex once per run, then matched
// against every listed base name.

use crate::domain::RunError;
use regex::Regex;

/// Compiled, case-sensitive base-name pattern
///
/// A blank pattern matches everything. An unclosed `[` is a literal, and `^`
/// inside a class is a literal too (negation is `!`).
#[derive(Debug, Clone)]
pub struct FileGlob {
    regex: Option<Regex>,
}

impl FileGlob {
    pub fn new(pattern: &str) -> Result<Self, RunError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Ok(Self { regex: None });
        }
        let regex = Regex::new(&translate(pattern)).map_err(|e| {
            RunError::Configuration(format!("Invalid file pattern '{}': {}", pattern, e))
        })?;
        Ok(Self { regex: Some(regex) })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.regex.as_ref().map_or(true, |r| r.is_match(name))
    }
}

fn escape(c: char) -> String {
    regex::escape(c.encode_utf8(&mut [0u8; 4]))
}

fn translate(pattern: &str) -> String {
    let p: Vec<char> = pattern.chars().collect();
    let mut out = String::from("(?s)^");
    let mut i = 0;
    while i < p.len() {
        match p[i] {
            '*' => {
                out.push_str(".*");
                i += 1;
            }
            '?' => {
                out.push('.');
                i += 1;
            }
            '[' => match translate_class(&p, i) {
                Some((class, next)) => {
                    out.push_str(&class);
                    i = next;
                }
                None => {
                    out.push_str(r"\[");
                    i += 1;
                }
            },
            c => {
                out.push_str(&escape(c));
                i += 1;
            }
        }
    }
    out.push('$');
    out
}

/// Regex class for the glob class starting at `p[start] == '['`
///
/// Returns the class and the index after `]`, or `None` if it is unclosed.
fn translate_class(p: &[char], start: usize) -> Option<(String, usize)> {
    let mut i = start + 1;
    let negate = i < p.len() && p[i] == '!';
    if negate {
        i += 1;
    }
    let first = i;
    let mut items = String::new();

    while i < p.len() {
        // A leading ']' is part of the set
        if p[i] == ']' && i > first {
            let caret = if negate { "^" } else { "" };
            return Some((format!("[{}{}]", caret, items), i + 1));
        }
        if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            items.push_str(&escape(p[i]));
            items.push('-');
            items.push_str(&escape(p[i + 2]));
            i += 3;
        } else {
            items.push_str(&escape(p[i]));
            i += 1;
        }
    }
    None
}
