//! Hierarchical content names.
//!
//! A name is a sequence of opaque byte components. Names are totally ordered:
//! components compare byte-wise, the sequence compares lexicographically, and
//! a proper prefix sorts before any of its extensions. Leaf names in a sync
//! tree end with a content digest component.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::NameError;

/// One opaque name component.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Component(Bytes);

impl Component {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn write_escaped(&self, out: &mut String) {
        for &b in self.0.iter() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~' | b'+' | b'=') {
                out.push(b as char);
            } else {
                out.push_str(&format!("%{:02X}", b));
            }
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = String::new();
        self.write_escaped(&mut s);
        write!(f, "Component({})", s)
    }
}

impl AsRef<[u8]> for Component {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for Component {
    fn from(s: &str) -> Self {
        Self::from_slice(s.as_bytes())
    }
}

impl From<&[u8]> for Component {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl From<Vec<u8>> for Component {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes.into())
    }
}

impl From<Bytes> for Component {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

/// A hierarchical content name.
///
/// The derived ordering compares the component vectors lexicographically,
/// which is exactly the canonical name order.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<Component>,
}

impl Name {
    /// The empty (root) name.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_components(components: impl IntoIterator<Item = Component>) -> Self {
        Self {
            components: components.into_iter().collect(),
        }
    }

    /// Parse a name URI such as `/a/b%00c`.
    ///
    /// Empty segments are skipped, so `/a//b/` equals `/a/b`.
    pub fn from_uri(uri: &str) -> Result<Self, NameError> {
        let rest = uri
            .strip_prefix('/')
            .ok_or_else(|| NameError::MissingLeadingSlash(uri.to_string()))?;

        let mut components = Vec::new();
        for segment in rest.split('/').filter(|s| !s.is_empty()) {
            components.push(Component::from(unescape(segment)?));
        }
        Ok(Self { components })
    }

    pub fn components(&self) -> &[Component] {
        &self.components
    }

    pub fn component(&self, index: usize) -> Option<&Component> {
        self.components.get(index)
    }

    pub fn last(&self) -> Option<&Component> {
        self.components.last()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// A new name with one component appended.
    pub fn child(&self, component: impl Into<Component>) -> Self {
        let mut name = self.clone();
        name.push(component);
        name
    }

    pub fn push(&mut self, component: impl Into<Component>) {
        self.components.push(component.into());
    }

    /// A new name with all components of `other` appended.
    pub fn append(&self, other: &Name) -> Self {
        let mut name = self.clone();
        name.components.extend(other.components.iter().cloned());
        name
    }

    /// The name without its last component. The root name is its own parent.
    pub fn parent(&self) -> Self {
        let mut name = self.clone();
        name.components.pop();
        name
    }

    /// Whether `self` is a (not necessarily proper) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Name) -> bool {
        other.components.starts_with(&self.components)
    }

    /// Index of the first component equal to `component`.
    pub fn position_of(&self, component: &[u8]) -> Option<usize> {
        self.components
            .iter()
            .position(|c| c.as_bytes() == component)
    }

    /// Render as a URI; the root name renders as `/`.
    pub fn to_uri(&self) -> String {
        if self.components.is_empty() {
            return "/".to_string();
        }
        let mut out = String::new();
        for component in &self.components {
            out.push('/');
            component.write_escaped(&mut out);
        }
        out
    }
}

fn unescape(segment: &str) -> Result<Vec<u8>, NameError> {
    let raw = segment.as_bytes();
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'%' {
            let digits = raw
                .get(i + 1..i + 3)
                .ok_or_else(|| NameError::InvalidEscape(segment.to_string()))?;
            let decoded =
                hex::decode(digits).map_err(|_| NameError::InvalidEscape(segment.to_string()))?;
            out.extend_from_slice(&decoded);
            i += 3;
        } else {
            out.push(raw[i]);
            i += 1;
        }
    }
    Ok(out)
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({})", self.to_uri())
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_uri(s)
    }
}

impl FromIterator<Component> for Name {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        Self::from_components(iter)
    }
}
