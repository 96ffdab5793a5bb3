//! Path templates with named whole-segment variables, e.g. `/chat/{room}`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use percent_encoding::percent_decode_str;

use crate::error::DeploymentError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Variable(String),
}

/// A parsed path template.
///
/// A template with N segments only matches paths with N segments; a variable
/// matches exactly one non-empty segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

/// A successful match: the template plus decoded variable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMatch {
    /// The template that matched.
    pub template: String,
    /// Variable name to percent-decoded segment value.
    pub parameters: HashMap<String, String>,
}

fn split_segments(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

impl PathTemplate {
    /// Parse a template.
    ///
    /// # Errors
    ///
    /// Returns [`DeploymentError::InvalidPathTemplate`] if the template does
    /// not start with `/`, a brace appears outside a whole `{name}` segment,
    /// or a variable name is empty or repeated.
    pub fn parse(template: &str) -> Result<Self, DeploymentError> {
        let invalid = |reason: &str| DeploymentError::InvalidPathTemplate {
            template: template.to_string(),
            reason: reason.to_string(),
        };
        if !template.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        let mut segments = Vec::new();
        for segment in split_segments(template) {
            let parsed = match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if name.is_empty() => return Err(invalid("empty variable name")),
                Some(name) if name.contains(['{', '}', '/']) => {
                    return Err(invalid("malformed variable"));
                }
                Some(name) => {
                    let duplicate = segments
                        .iter()
                        .any(|s| matches!(s, Segment::Variable(existing) if existing == name));
                    if duplicate {
                        return Err(invalid("duplicate variable name"));
                    }
                    Segment::Variable(name.to_string())
                }
                None if segment.contains(['{', '}']) => {
                    return Err(invalid("variables must span a whole segment"));
                }
                None => Segment::Literal(segment.to_string()),
            };
            segments.push(parsed);
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    /// The template as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of path segments.
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Variable names in template order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Variable(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a request path. Any query string is ignored.
    pub fn matches(&self, path: &str) -> Option<PathMatch> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let parts = split_segments(path);
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut parameters = HashMap::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) => {
                    if literal != part {
                        return None;
                    }
                }
                Segment::Variable(name) => {
                    if part.is_empty() {
                        return None;
                    }
                    let value = percent_decode_str(part).decode_utf8().ok()?;
                    parameters.insert(name.clone(), value.into_owned());
                }
            }
        }

        Some(PathMatch {
            template: self.raw.clone(),
            parameters,
        })
    }

    /// Both templates match exactly the same set of paths.
    ///
    /// Variable names are irrelevant; segment count and the position of every
    /// literal and variable must agree.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    (Segment::Variable(_), Segment::Variable(_)) => true,
                    _ => false,
                })
    }

    /// Ordering for candidates that match the same path: at the first
    /// segment where one has a literal and the other a variable, the literal
    /// sorts first.
    pub fn specificity_cmp(&self, other: &Self) -> Ordering {
        for pair in self.segments.iter().zip(&other.segments) {
            match pair {
                (Segment::Literal(_), Segment::Variable(_)) => return Ordering::Less,
                (Segment::Variable(_), Segment::Literal(_)) => return Ordering::Greater,
                _ => {}
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
