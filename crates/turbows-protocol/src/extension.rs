//! `Sec-WebSocket-Extensions` header grammar (RFC 6455 Section 9.1).
//!
//! ```text
//! extension-list  = 1#extension
//! extension       = name *( ";" param )
//! param           = token [ "=" ( token | quoted-string ) ]
//! ```

use std::fmt;

use crate::error::{HandshakeError, HandshakeResult};
use crate::headers::SEC_WEBSOCKET_EXTENSIONS;

/// One extension parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExtensionParam {
    /// Parameter name.
    pub name: String,
    /// Value, unquoted.
    pub value: Option<String>,
}

/// An extension offer or acceptance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Extension {
    /// Extension token, e.g. `permessage-deflate`.
    pub name: String,
    /// Parameters in header order.
    pub params: Vec<ExtensionParam>,
}

impl Extension {
    /// An extension with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.params.push(ExtensionParam {
            name: name.into(),
            value: value.map(str::to_string),
        });
        self
    }

    /// Look up a parameter. `Some(None)` for a valueless parameter.
    pub fn param(&self, name: &str) -> Option<Option<&str>> {
        self.params
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
            .map(|p| p.value.as_deref())
    }
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
        })
}

impl fmt::Display for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for param in &self.params {
            write!(f, "; {}", param.name)?;
            match &param.value {
                Some(value) if is_token(value) => write!(f, "={value}")?,
                Some(value) => {
                    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
                    write!(f, "=\"{escaped}\"")?;
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Split on `sep` outside double quotes.
fn split_unquoted(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in input.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            c if c == sep && !in_quotes => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn unquote(raw: &str) -> Option<String> {
    let inner = raw.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn invalid(value: &str) -> HandshakeError {
    HandshakeError::InvalidHeader {
        name: SEC_WEBSOCKET_EXTENSIONS,
        value: value.to_string(),
    }
}

/// Parse every extension across the given header values.
///
/// # Errors
///
/// Returns [`HandshakeError::InvalidHeader`] for an empty or non-token name,
/// or a malformed parameter.
pub fn parse_extensions<'a>(
    values: impl IntoIterator<Item = &'a str>,
) -> HandshakeResult<Vec<Extension>> {
    let mut extensions = Vec::new();
    for value in values {
        for item in split_unquoted(value, ',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            let mut pieces = split_unquoted(item, ';').into_iter().map(str::trim);
            let name = pieces.next().unwrap_or_default();
            if !is_token(name) {
                return Err(invalid(item));
            }
            let mut extension = Extension::new(name);
            for piece in pieces {
                let (key, value) = match piece.split_once('=') {
                    Some((key, raw)) => {
                        let raw = raw.trim();
                        let value = if raw.starts_with('"') {
                            unquote(raw).ok_or_else(|| invalid(item))?
                        } else if is_token(raw) {
                            raw.to_string()
                        } else {
                            return Err(invalid(item));
                        };
                        (key.trim(), Some(value))
                    }
                    None => (piece, None),
                };
                if !is_token(key) {
                    return Err(invalid(item));
                }
                extension.params.push(ExtensionParam {
                    name: key.to_string(),
                    value,
                });
            }
            extensions.push(extension);
        }
    }
    Ok(extensions)
}

/// Serialize extensions as a single header value.
pub fn serialize_extensions(extensions: &[Extension]) -> String {
    extensions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_across_values() {
        let parsed = parse_extensions([
            "permessage-deflate; client_max_window_bits, x-foo",
            "x-bar; level=3; name=\"a, b\"",
        ])
        .unwrap();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].name, "permessage-deflate");
        assert_eq!(parsed[0].param("client_max_window_bits"), Some(None));
        assert_eq!(parsed[1], Extension::new("x-foo"));
        assert_eq!(parsed[2].param("level"), Some(Some("3")));
        assert_eq!(parsed[2].param("name"), Some(Some("a, b")));
    }

    #[test]
    fn test_serialize_parse_roundtrip() {
        let extensions = vec![
            Extension::new("permessage-deflate").with_param("server_no_context_takeover", None),
            Extension::new("x-custom").with_param("q", Some("has space")),
        ];
        let header = serialize_extensions(&extensions);
        assert_eq!(
            header,
            "permessage-deflate; server_no_context_takeover, x-custom; q=\"has space\""
        );
        assert_eq!(parse_extensions([header.as_str()]).unwrap(), extensions);
    }

    #[test]
    fn test_invalid_extension_headers() {
        assert!(parse_extensions(["; foo"]).is_err());
        assert!(parse_extensions(["ext; =1"]).is_err());
        assert!(parse_extensions(["ext; a=\"open"]).is_err());
        assert!(parse_extensions(["ext; a=b c"]).is_err());
        assert!(parse_extensions(["", " , "]).unwrap().is_empty());
    }
}
