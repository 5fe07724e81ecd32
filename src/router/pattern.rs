//! Mount pattern compilation and segment matching.

use crate::{errors::CompileError, query::Params};

/// Key the wildcard remainder is bound to.
pub const WILDCARD_KEY: &str = "*";

/// One compiled pattern segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Matches exactly this text, case-sensitively.
    Literal(String),
    /// Matches any one segment and binds it to the name.
    Param(String),
    /// Matches the remainder of the path; always the last segment.
    Wildcard,
}

/// A compiled mount pattern.
///
/// Patterns are `/`-delimited: `:name` captures one segment, a final `*`
/// captures the rest of the path, anything else is a literal.
///
/// # Examples
/// ```
/// use maestro_web::router::pattern::{split_path, Pattern};
///
/// let pattern = Pattern::compile("/users/:id").unwrap();
///
/// let params = pattern.matches(&split_path("/users/42")).unwrap();
/// assert_eq!(params.get("id"), Some("42"));
///
/// assert!(pattern.matches(&split_path("/users/42/x")).is_none());
/// assert!(Pattern::compile("/files/*/meta").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

impl Pattern {
    /// Compiles `source`, rejecting malformed patterns.
    ///
    /// A trailing `/` is ignored; `/` alone matches the root path only.
    pub fn compile(source: &str) -> Result<Self, CompileError> {
        let rest = match source {
            "" => return Err(CompileError::EmptyPattern),
            _ => source
                .strip_prefix('/')
                .ok_or_else(|| CompileError::MissingLeadingSlash(source.to_string()))?,
        };
        let rest = match rest.strip_suffix('/') {
            Some("") => return Err(CompileError::EmptySegment(source.to_string())),
            Some(trimmed) => trimmed,
            None => rest,
        };

        let mut segments = Vec::new();
        if rest.is_empty() {
            return Ok(Pattern {
                source: source.to_string(),
                segments,
            });
        }

        let parts: Vec<&str> = rest.split('/').collect();
        let last = parts.len() - 1;

        for (index, part) in parts.into_iter().enumerate() {
            let segment = match part {
                "" => return Err(CompileError::EmptySegment(source.to_string())),
                "*" if index != last => {
                    return Err(CompileError::WildcardNotLast(source.to_string()))
                }
                "*" => Segment::Wildcard,
                ":" => return Err(CompileError::EmptyParamName(source.to_string())),
                _ => match part.strip_prefix(':') {
                    Some(name) => Segment::Param(name.to_string()),
                    None => Segment::Literal(part.to_string()),
                },
            };

            if let Segment::Param(name) = &segment {
                if segments.contains(&segment) {
                    return Err(CompileError::DuplicateParam {
                        pattern: source.to_string(),
                        name: name.clone(),
                    });
                }
            }
            segments.push(segment);
        }

        Ok(Pattern {
            source: source.to_string(),
            segments,
        })
    }

    /// The pattern text as mounted.
    #[inline(always)]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline(always)]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Matches the path segments positionally, returning the bindings.
    pub fn matches(&self, path: &[&str]) -> Option<Params> {
        let wildcard = matches!(self.segments.last(), Some(Segment::Wildcard));
        let fixed = match wildcard {
            true => self.segments.len() - 1,
            false => self.segments.len(),
        };

        match wildcard {
            true if path.len() < fixed => return None,
            false if path.len() != fixed => return None,
            _ => {}
        }

        let mut params = Params::new();
        for (segment, part) in self.segments[..fixed].iter().zip(path) {
            match segment {
                Segment::Literal(text) if text != part => return None,
                Segment::Param(name) => params.insert(name.as_str(), *part),
                Segment::Literal(_) | Segment::Wildcard => {}
            }
        }

        if wildcard {
            params.insert(WILDCARD_KEY, path[fixed..].join("/"));
        }
        Some(params)
    }
}

/// Splits a request path into its non-empty segments.
///
/// ```
/// use maestro_web::router::pattern::split_path;
///
/// assert_eq!(split_path("/a//b/"), ["a", "b"]);
/// assert!(split_path("/").is_empty());
/// ```
#[inline]
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn try_match(pattern: &str, path: &str) -> Option<Params> {
        Pattern::compile(pattern).unwrap().matches(&split_path(path))
    }

    #[test]
    fn compile() {
        assert_eq!(
            Pattern::compile("/users/:id/*").unwrap().segments(),
            [
                Segment::Literal("users".into()),
                Segment::Param("id".into()),
                Segment::Wildcard
            ]
        );
        assert!(Pattern::compile("/").unwrap().segments().is_empty());
        assert_eq!(Pattern::compile("/a/").unwrap().segments().len(), 1);
        assert_eq!(Pattern::compile("/a/").unwrap().source(), "/a/");
    }

    #[test]
    fn compile_errors() {
        #[rustfmt::skip]
        let cases = [
            ("",            CompileError::EmptyPattern),
            ("users",       CompileError::MissingLeadingSlash("users".into())),
            ("/a//b",       CompileError::EmptySegment("/a//b".into())),
            ("//",          CompileError::EmptySegment("//".into())),
            ("/*/a",        CompileError::WildcardNotLast("/*/a".into())),
            ("/a/:",        CompileError::EmptyParamName("/a/:".into())),
            ("/:id/x/:id",  CompileError::DuplicateParam {
                pattern: "/:id/x/:id".into(),
                name: "id".into(),
            }),
        ];

        for (pattern, expected) in cases {
            assert_eq!(Pattern::compile(pattern), Err(expected), "{pattern}");
        }
    }

    #[test]
    fn literal_match_is_exact() {
        #[rustfmt::skip]
        let cases = [
            ("/about",      "/about",      true),
            ("/about",      "/About",      false),
            ("/about",      "/about/",     true),
            ("/about",      "/about/us",   false),
            ("/a/b",        "/b/a",        false),
            ("/",           "/",           true),
            ("/",           "/x",          false),
        ];

        for (pattern, path, expected) in cases {
            assert_eq!(try_match(pattern, path).is_some(), expected, "{pattern} {path}");
        }
    }

    #[test]
    fn params() {
        let params = try_match("/users/:id", "/users/42").unwrap();
        assert_eq!(params.get("id"), Some("42"));
        assert_eq!(params.len(), 1);

        assert!(try_match("/users/:id", "/users/42/x").is_none());
        assert!(try_match("/users/:id", "/users").is_none());

        let params = try_match("/:a/to/:b", "/here/to/there").unwrap();
        assert_eq!(params.get("a"), Some("here"));
        assert_eq!(params.get("b"), Some("there"));
    }

    #[test]
    fn wildcard() {
        let params = try_match("/files/*", "/files/a/b/c").unwrap();
        assert_eq!(params.get(WILDCARD_KEY), Some("a/b/c"));

        let params = try_match("/files/*", "/files").unwrap();
        assert_eq!(params.get(WILDCARD_KEY), Some(""));

        let params = try_match("/*", "/").unwrap();
        assert_eq!(params.get(WILDCARD_KEY), Some(""));

        let params = try_match("/u/:id/*", "/u/7/avatar.png").unwrap();
        assert_eq!(params.get("id"), Some("7"));
        assert_eq!(params.get(WILDCARD_KEY), Some("avatar.png"));

        assert!(try_match("/files/*", "/other/a").is_none());
        assert!(try_match("/u/:id/*", "/u").is_none());
    }
}
