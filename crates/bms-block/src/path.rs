//! Path language: addresses a location inside a [`Value`](crate::Value) tree.
//!
//! # Grammar
//!
//! ```text
//! path      = "/" | ( "/" segment )+
//! segment   = ident [ subscript ] | subscript
//! subscript = "[" ident "=" literal "]"
//! ident     = [A-Za-z_][A-Za-z0-9_-]* | json-string
//! literal   = json-string | json-number | "true" | "false" | "null"
//! ```
//!
//! `/spaces[name="kitchen"]/hvac` selects the `hvac` field of the element of
//! the `spaces` array whose `name` field is `"kitchen"`. Identifiers that are
//! not bare words are written as JSON strings: `/"zone 1"/setpoint`.
//!
//! On the wire a [`Path`] is always written in its string form. It can be read
//! back from that form or from an array of segments, where a string is a field
//! and a single-key object `{"name": "kitchen"}` is an array element selector.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Number;

use crate::error::{BlockError, BlockResult};
use crate::value::{canonical_number, Scalar};

/// One step of a [`Path`].
#[derive(Clone, Debug, PartialEq)]
pub enum PathSegment {
    /// Object member access.
    Field(String),
    /// The element of an array whose `key` field equals `elem`.
    ArrayElem { key: String, elem: Scalar },
}

impl PathSegment {
    pub fn field(name: impl Into<String>) -> Self {
        PathSegment::Field(name.into())
    }

    pub fn elem(key: impl Into<String>, elem: impl Into<Scalar>) -> Self {
        PathSegment::ArrayElem {
            key: key.into(),
            elem: elem.into(),
        }
    }
}

/// An ordered sequence of segments. The empty path is the root.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Path {
    segments: Vec<PathSegment>,
}

impl Path {
    /// The empty path, addressing the whole value.
    pub fn root() -> Self {
        Self::default()
    }

    /// A path made of `segments`, outermost first.
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }

    /// The segments of this path, outermost first.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments; zero for the root.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// A copy of this path extended by one segment.
    pub fn child(&self, segment: PathSegment) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        segments.extend_from_slice(&self.segments);
        segments.push(segment);
        Self { segments }
    }

    /// Builder: append a field segment.
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::field(name));
        self
    }

    /// Builder: append an array element selector.
    pub fn elem(mut self, key: impl Into<String>, elem: impl Into<Scalar>) -> Self {
        self.segments.push(PathSegment::elem(key, elem));
        self
    }
}

impl From<Vec<PathSegment>> for Path {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self { segments }
    }
}

/// A path string did not match the grammar.
///
/// `position` is a byte offset into the input and always lies within
/// `0..=input.len()`.
#[derive(Clone, Debug, thiserror::Error)]
#[error("invalid path at byte {position}: expected {expected}, found {found}")]
pub struct PathParseError {
    pub position: usize,
    pub expected: String,
    pub found: String,
    /// The JSON decoder's error, for malformed string and number literals.
    #[source]
    pub cause: Option<Arc<serde_json::Error>>,
}

impl PartialEq for PathParseError {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.expected == other.expected
            && self.found == other.found
    }
}

impl Eq for PathParseError {}

/// Parse a path string. Never panics, whatever the input.
pub fn parse_path(input: &str) -> Result<Path, PathParseError> {
    let mut parser = Parser { input, pos: 0 };
    parser.expect('/', "'/'")?;
    if parser.at_end() {
        return Ok(Path::root());
    }

    let mut segments = Vec::new();
    loop {
        if parser.peek() == Some('[') {
            segments.push(parser.subscript()?);
        } else {
            segments.push(PathSegment::Field(parser.identifier()?));
            if parser.peek() == Some('[') {
                segments.push(parser.subscript()?);
            }
        }
        if parser.at_end() {
            break;
        }
        parser.expect('/', "'/' or end of input")?;
    }
    Ok(Path { segments })
}

impl FromStr for Path {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_path(s)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn error_at(&self, position: usize, expected: &str) -> PathParseError {
        let found = match self.input[position..].chars().next() {
            Some(c) => format!("{c:?}"),
            None => "end of input".to_string(),
        };
        PathParseError {
            position,
            expected: expected.to_string(),
            found,
            cause: None,
        }
    }

    fn decode_error(
        &self,
        position: usize,
        expected: &str,
        cause: serde_json::Error,
    ) -> PathParseError {
        PathParseError {
            cause: Some(Arc::new(cause)),
            ..self.error_at(position, expected)
        }
    }

    fn error(&self, expected: &str) -> PathParseError {
        self.error_at(self.pos, expected)
    }

    fn expect(&mut self, c: char, expected: &str) -> Result<(), PathParseError> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    fn identifier(&mut self) -> Result<String, PathParseError> {
        match self.peek() {
            Some('"') => self.quoted(),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Ok(self.input[start..self.pos].to_string())
            }
            _ => Err(self.error("identifier")),
        }
    }

    /// A JSON string literal, decoded with JSON escape rules.
    fn quoted(&mut self) -> Result<String, PathParseError> {
        let start = self.pos;
        self.bump();
        loop {
            match self.bump() {
                None => return Err(self.error("closing '\"'")),
                Some('\\') => {
                    if self.bump().is_none() {
                        return Err(self.error("escape sequence"));
                    }
                }
                Some('"') => break,
                Some(_) => {}
            }
        }
        serde_json::from_str(&self.input[start..self.pos])
            .map_err(|e| self.decode_error(start, "valid string literal", e))
    }

    fn subscript(&mut self) -> Result<PathSegment, PathParseError> {
        self.expect('[', "'['")?;
        let key = self.identifier()?;
        self.expect('=', "'='")?;
        let elem = self.literal()?;
        self.expect(']', "']'")?;
        Ok(PathSegment::ArrayElem { key, elem })
    }

    fn literal(&mut self) -> Result<Scalar, PathParseError> {
        const EXPECTED: &str = "string, number, true, false or null";
        let start = self.pos;
        match self.peek() {
            Some('"') => self.quoted().map(Scalar::String),
            Some(c) if c == '-' || c.is_ascii_digit() => {
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E') {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                serde_json::from_str::<Number>(&self.input[start..self.pos])
                    .map(Scalar::Number)
                    .map_err(|e| self.decode_error(start, "number literal", e))
            }
            Some(c) if c.is_ascii_alphabetic() => {
                while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                    self.pos += 1;
                }
                match &self.input[start..self.pos] {
                    "true" => Ok(Scalar::Bool(true)),
                    "false" => Ok(Scalar::Bool(false)),
                    "null" => Ok(Scalar::Null),
                    _ => Err(self.error_at(start, EXPECTED)),
                }
            }
            _ => Err(self.error(EXPECTED)),
        }
    }
}

fn is_bare_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn write_identifier(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    if is_bare_identifier(name) {
        f.write_str(name)
    } else {
        let quoted = serde_json::to_string(name).map_err(|_| fmt::Error)?;
        f.write_str(&quoted)
    }
}

/// Writes the canonical string form; [`parse_path`] reads it back unchanged.
impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str("/");
        }
        let mut after_field = false;
        for segment in &self.segments {
            match segment {
                PathSegment::Field(name) => {
                    f.write_str("/")?;
                    write_identifier(f, name)?;
                    after_field = true;
                }
                PathSegment::ArrayElem { key, elem } => {
                    if !after_field {
                        f.write_str("/")?;
                    }
                    f.write_str("[")?;
                    write_identifier(f, key)?;
                    write!(f, "={elem}]")?;
                    after_field = false;
                }
            }
        }
        Ok(())
    }
}

impl Serialize for Path {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Path {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(PathVisitor)
    }
}

struct PathVisitor;

impl<'de> Visitor<'de> for PathVisitor {
    type Value = Path;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a path string or an array of path segments")
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Path, E> {
        parse_path(v).map_err(E::custom)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Path, A::Error> {
        let mut segments = Vec::new();
        while let Some(raw) = seq.next_element::<serde_json::Value>()? {
            segments.push(segment_from_json(raw).map_err(de::Error::custom)?);
        }
        Ok(Path { segments })
    }
}

fn segment_from_json(raw: serde_json::Value) -> BlockResult<PathSegment> {
    match raw {
        serde_json::Value::String(name) => Ok(PathSegment::Field(name)),
        serde_json::Value::Object(map) => {
            if map.len() != 1 {
                return Err(BlockError::InvalidPathSegment(format!(
                    "segment object must have exactly one key, found {}",
                    map.len()
                )));
            }
            let Some((key, value)) = map.into_iter().next() else {
                return Err(BlockError::InvalidPathSegment("empty segment object".into()));
            };
            let elem = match value {
                serde_json::Value::Null => Scalar::Null,
                serde_json::Value::Bool(b) => Scalar::Bool(b),
                serde_json::Value::Number(n) => Scalar::Number(n),
                serde_json::Value::String(s) => Scalar::String(s),
                other => {
                    return Err(BlockError::InvalidPathSegment(format!(
                        "array key {key:?} must select a scalar, found {other}"
                    )))
                }
            };
            Ok(PathSegment::ArrayElem { key, elem })
        }
        other => Err(BlockError::InvalidPathSegment(format!(
            "expected a field name or a single-key object, found {other}"
        ))),
    }
}

impl Path {
    /// The segment-array form accepted by deserialization: a field is a
    /// string, an array selector a single-key object.
    pub fn to_json_segments(&self) -> serde_json::Value {
        let segments = self
            .segments
            .iter()
            .map(|segment| match segment {
                PathSegment::Field(name) => serde_json::Value::String(name.clone()),
                PathSegment::ArrayElem { key, elem } => {
                    let mut map = serde_json::Map::new();
                    map.insert(key.clone(), elem.clone().into());
                    serde_json::Value::Object(map)
                }
            })
            .collect();
        serde_json::Value::Array(segments)
    }
}

/// Total order over paths, used to make patch lists deterministic.
///
/// Segments compare pairwise: fields by name, array selectors by key and then
/// by value (strings before other scalars, other scalars by their literal
/// text). A field sorts before an array selector at the same position and a
/// path sorts before any path it is a prefix of.
pub fn compare_paths(a: &Path, b: &Path) -> Ordering {
    for (x, y) in a.segments.iter().zip(&b.segments) {
        let ord = compare_segments(x, y);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.segments.len().cmp(&b.segments.len())
}

fn compare_segments(a: &PathSegment, b: &PathSegment) -> Ordering {
    match (a, b) {
        (PathSegment::Field(x), PathSegment::Field(y)) => x.cmp(y),
        (PathSegment::Field(_), PathSegment::ArrayElem { .. }) => Ordering::Less,
        (PathSegment::ArrayElem { .. }, PathSegment::Field(_)) => Ordering::Greater,
        (
            PathSegment::ArrayElem { key: ka, elem: ea },
            PathSegment::ArrayElem { key: kb, elem: eb },
        ) => ka.cmp(kb).then_with(|| compare_elems(ea, eb)),
    }
}

/// Strings first, then everything else by literal text. Numbers use their
/// canonical text so that selectors equal under `==` compare equal.
fn compare_elems(a: &Scalar, b: &Scalar) -> Ordering {
    match (a, b) {
        (Scalar::String(x), Scalar::String(y)) => x.cmp(y),
        (Scalar::String(_), _) => Ordering::Less,
        (_, Scalar::String(_)) => Ordering::Greater,
        _ => sort_text(a).cmp(&sort_text(b)),
    }
}

fn sort_text(elem: &Scalar) -> String {
    match elem {
        Scalar::Number(n) => canonical_number(n),
        other => other.to_string(),
    }
}
