//! Distinguished Name path arithmetic.
//!
//! DNs are kept exactly as the caller wrote them: two DNs are equal only when their text is
//! identical. Parsing splits on unescaped commas so `\,` stays inside a value, and a
//! multi-valued RDN (`a=1+b=2`) is treated as one opaque component.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

use adldap_core::Error as CoreError;

const ORGANIZATIONAL_UNIT_ATTRIBUTE: &str = "ou";

/// Errors that can occur when parsing or inspecting distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// A component was missing the value to the right of the `=`.
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    /// The distinguished name ended with an escape character or held a bad hex escape.
    #[error("distinguished name contains an invalid escape sequence")]
    InvalidEscape,
    /// The leaf component is not an `OU=` component.
    #[error("distinguished name `{0}` does not name an organizational unit")]
    NotOrganizationalUnit(String),
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidRequest(err.to_string())
    }
}

/// Relative distinguished name (one `attribute=value` component).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Attribute portion of the RDN (e.g. `OU`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true if this RDN matches the provided attribute name (case-insensitive).
    #[must_use]
    pub fn matches_attribute(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }
}

/// Distinguished name that preserves the caller's spelling.
///
/// Equality and hashing compare the text only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DistinguishedName {
    raw: String,
    // Byte offset in `raw` where each component starts, leading spaces excluded.
    offsets: Vec<usize>,
    rdns: Vec<RelativeDistinguishedName>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the distinguished name is empty or a component
    /// is not of the form `attribute=value`.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref();
        if raw.trim().is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut offsets = Vec::new();
        let mut rdns = Vec::new();
        for (start, end) in component_bounds(raw)? {
            let component = &raw[start..end];
            let trimmed = component.trim_start_matches(' ');
            if trimmed.trim().is_empty() {
                return Err(DistinguishedNameError::InvalidComponent(raw.to_string()));
            }
            offsets.push(start + (component.len() - trimmed.len()));
            rdns.push(parse_component(trimmed)?);
        }

        Ok(Self {
            raw: raw.to_string(),
            offsets,
            rdns,
        })
    }

    /// Borrows the distinguished name string as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of components.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Returns the components in order, most-specific first.
    #[must_use]
    pub fn components(&self) -> &[RelativeDistinguishedName] {
        &self.rdns
    }

    /// The most-specific component.
    #[must_use]
    pub fn leaf(&self) -> &RelativeDistinguishedName {
        &self.rdns[0]
    }

    /// Immediate parent: the DN with its first component removed.
    ///
    /// Returns `None` for a single-component DN, which has no parent.
    #[must_use]
    pub fn parent(&self) -> Option<DistinguishedName> {
        let start = *self.offsets.get(1)?;
        Some(Self {
            raw: self.raw[start..].to_string(),
            offsets: self.offsets[1..].iter().map(|offset| offset - start).collect(),
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// Returns true when the leaf component is an `OU=` component.
    #[must_use]
    pub fn is_organizational_unit(&self) -> bool {
        self.leaf().matches_attribute(ORGANIZATIONAL_UNIT_ATTRIBUTE)
    }

    /// Value of the leaf `OU=` component, used as the entry's naming attribute.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError::NotOrganizationalUnit`] when the leaf uses another
    /// attribute.
    pub fn organizational_unit_name(&self) -> std::result::Result<&str, DistinguishedNameError> {
        if self.is_organizational_unit() {
            Ok(self.leaf().value())
        } else {
            Err(DistinguishedNameError::NotOrganizationalUnit(
                self.raw.clone(),
            ))
        }
    }

    /// Returns true if this DN is `base` or lies beneath it.
    ///
    /// The comparison is textual: `self` must equal `base`, or end with `base` preceded by an
    /// unescaped comma (optionally followed by spaces) and a non-empty prefix.
    #[must_use]
    pub fn is_within(&self, base: &DistinguishedName) -> bool {
        if self.raw == base.raw {
            return true;
        }

        let Some(prefix) = self.raw.strip_suffix(base.as_str()) else {
            return false;
        };
        let prefix = prefix.trim_end_matches(' ');
        let Some(head) = prefix.strip_suffix(',') else {
            return false;
        };

        let trailing_backslashes = head.chars().rev().take_while(|ch| *ch == '\\').count();
        trailing_backslashes % 2 == 0 && !head.trim().is_empty()
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for DistinguishedName {}

impl Hash for DistinguishedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

fn component_bounds(
    input: &str,
) -> std::result::Result<Vec<(usize, usize)>, DistinguishedNameError> {
    let mut bounds = Vec::new();
    let mut start = 0;
    let mut escape = false;

    for (i, ch) in input.char_indices() {
        if escape {
            escape = false;
            continue;
        }

        match ch {
            '\\' => escape = true,
            ',' => {
                bounds.push((start, i));
                start = i + 1;
            }
            _ => {}
        }
    }

    if escape {
        return Err(DistinguishedNameError::InvalidEscape);
    }

    bounds.push((start, input.len()));
    Ok(bounds)
}

fn parse_component(
    component: &str,
) -> std::result::Result<RelativeDistinguishedName, DistinguishedNameError> {
    let mut escape = false;
    let mut index = None;

    for (i, ch) in component.char_indices() {
        if escape {
            escape = false;
            continue;
        }

        if ch == '\\' {
            escape = true;
            continue;
        }

        if ch == '=' {
            index = Some(i);
            break;
        }
    }

    let idx =
        index.ok_or_else(|| DistinguishedNameError::InvalidComponent(component.to_string()))?;
    let attribute = component[..idx].trim();
    let value_part = component[idx + 1..].trim_start();

    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(
            component.to_string(),
        ));
    }

    if value_part.is_empty() {
        return Err(DistinguishedNameError::MissingValue(attribute.to_string()));
    }

    Ok(RelativeDistinguishedName {
        attribute: attribute.to_string(),
        value: unescape(value_part)?,
    })
}

/// Decodes `\c` and `\XX` (hex byte) escapes.
fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            decoded.push(bytes[i]);
            i += 1;
            continue;
        }

        let next = *bytes.get(i + 1).ok_or(DistinguishedNameError::InvalidEscape)?;
        let hex = bytes
            .get(i + 1..i + 3)
            .and_then(|pair| std::str::from_utf8(pair).ok())
            .and_then(|pair| u8::from_str_radix(pair, 16).ok());

        if let Some(byte) = hex {
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(next);
            i += 2;
        }
    }

    String::from_utf8(decoded).map_err(|_| DistinguishedNameError::InvalidEscape)
}
