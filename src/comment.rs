//! Deterministic serialization of tag mappings into SQL trailing comments.
//!
//! The output format is the sqlcommenter wire format: a single
//! `/* key='value',key='value' */` comment with percent-encoded values,
//! appended after the statement text. Serialization is a pure function of
//! the tag mapping, so equal mappings always produce byte-identical
//! comments.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CommentError;
use crate::tags::TagMap;

static TAG_NAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9_][a-z0-9_.\-]*$").unwrap());

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// RFC 3986 unreserved characters. Everything else is `%XX`-encoded, so a
/// value can never contain a literal `*/`, quote, or control character.
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encode `input` byte-wise over its UTF-8 representation.
fn percent_encode(input: &str, out: &mut String) {
    for &byte in input.as_bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push(HEX_UPPER[(byte >> 4) as usize] as char);
            out.push(HEX_UPPER[(byte & 0x0f) as usize] as char);
        }
    }
}

/// Render a tag mapping into a single SQL trailing comment.
///
/// Disabled tags ([`crate::TagValue::Null`] and `Bool(false)`) are dropped;
/// the remaining tags are emitted in ascending byte order of their names as
/// `key='encoded_value'` pairs. An empty mapping (or one that is empty after
/// filtering) yields an empty string, meaning no comment at all.
///
/// Fails fast on a malformed tag name or a value containing a NUL byte
/// rather than producing a comment a database driver could reject.
pub fn serialize(tags: &TagMap) -> Result<String, CommentError> {
    let mut body = String::new();
    for (name, value) in tags.iter() {
        // Names are validated even for disabled tags, so a bad name fails
        // fast regardless of the value it happens to carry.
        if !TAG_NAME_REGEX.is_match(name) {
            return Err(CommentError::InvalidTagName(name.to_owned()));
        }
        let Some(rendered) = value.render() else {
            continue;
        };
        if rendered.contains('\0') {
            return Err(CommentError::InvalidTagValue {
                tag: name.to_owned(),
                reason: "contains a NUL byte",
            });
        }
        if !body.is_empty() {
            body.push(',');
        }
        body.push_str(name);
        body.push_str("='");
        percent_encode(rendered, &mut body);
        body.push('\'');
    }

    if body.is_empty() {
        Ok(String::new())
    } else {
        Ok(format!("/* {body} */"))
    }
}

/// Append the serialized comment to `sql`.
///
/// Returns `sql` unchanged when the mapping serializes to nothing. The
/// statement itself is never parsed or modified; the comment is purely
/// appended after a single space.
pub fn annotate(sql: &str, tags: &TagMap) -> Result<String, CommentError> {
    let comment = serialize(tags)?;
    if comment.is_empty() {
        Ok(sql.to_owned())
    } else {
        Ok(format!("{sql} {comment}"))
    }
}
