//! Access control for joining and creating documents

use crate::document::DocumentId;
use tracing::debug;

/// What a caller wants to do with a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Attach to a document that already exists
    Join,
    /// Create a document that does not exist yet
    Create,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Join => write!(f, "join"),
            Intent::Create => write!(f, "create"),
        }
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

/// Decides whether an identity may join or create a document
pub trait Authorizer: Send + Sync {
    fn authorize(&self, path: &DocumentId, identity: &str, intent: Intent) -> Access;
}

/// Everyone may join anything; creation can be switched off
#[derive(Debug, Clone, Copy, Default)]
pub struct Anarchy {
    pub allow_create: bool,
}

impl Authorizer for Anarchy {
    fn authorize(&self, _path: &DocumentId, _identity: &str, intent: Intent) -> Access {
        match intent {
            Intent::Create if !self.allow_create => Access::Deny,
            _ => Access::Allow,
        }
    }
}

/// Glob-list policy.
///
/// A path is denied when it matches any `deny` pattern. When `allow` is
/// non-empty the path must also match one of its patterns. Creation is
/// additionally gated by `allow_create`.
#[derive(Debug, Clone, Default)]
pub struct PatternAcl {
    pub allow: Vec<String>,
    pub deny: Vec<String>,
    pub allow_create: bool,
}

impl PatternAcl {
    pub fn new(allow: Vec<String>, deny: Vec<String>, allow_create: bool) -> Self {
        Self {
            allow,
            deny,
            allow_create,
        }
    }

    fn any_match(patterns: &[String], path: &str) -> bool {
        patterns.iter().any(|p| matches_pattern(p, path))
    }
}

impl Authorizer for PatternAcl {
    fn authorize(&self, path: &DocumentId, identity: &str, intent: Intent) -> Access {
        let access = if Self::any_match(&self.deny, path.as_str()) {
            Access::Deny
        } else if !self.allow.is_empty() && !Self::any_match(&self.allow, path.as_str()) {
            Access::Deny
        } else if intent == Intent::Create && !self.allow_create {
            Access::Deny
        } else {
            Access::Allow
        };

        debug!(path = %path, identity, %intent, ?access, "ACL decision");
        access
    }
}

/// Glob match over slash separated paths.
///
/// `**` spans any number of segments, `*` and `?` stay within one segment.
/// Patterns starting with `./` are anchored at the root; other patterns
/// match any trailing run of segments, so `*.txt` matches `a/b/c.txt`.
pub fn matches_pattern(pattern: &str, path: &str) -> bool {
    let path = path.strip_prefix("./").unwrap_or(path);
    let path: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let (anchored, pattern) = match pattern.strip_prefix("./") {
        Some(rest) => (true, rest),
        None => (pattern.starts_with('/'), pattern.trim_start_matches('/')),
    };
    let pattern: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();

    if anchored {
        match_segments(&pattern, &path)
    } else {
        (0..path.len()).any(|start| match_segments(&pattern, &path[start..]))
    }
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((&"**", rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((first, rest)) => match path.split_first() {
            Some((segment, path_rest)) => {
                match_segment(first, segment) && match_segments(rest, path_rest)
            }
            None => false,
        },
    }
}

fn match_segment(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star = None;
    let mut mark = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            mark = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            mark += 1;
            ti = mark;
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}
