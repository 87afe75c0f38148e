//! ICN packet types and structures.
//!
//! This module provides the names and the three packet kinds the forwarder
//! moves around. Wire encoding lives outside the forwarder; packets here
//! are plain values.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents a single name component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NameComponent(pub Bytes);

impl NameComponent {
    /// Creates a new name component from a byte slice.
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Returns the component as bytes.
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }
}

impl fmt::Display for NameComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Print printable ASCII characters directly, otherwise use hex
        let printable = self.0.iter().all(|&b| b.is_ascii_graphic() || b == b' ');

        if printable {
            write!(f, "{}", String::from_utf8_lossy(&self.0))
        } else {
            write!(f, "0x")?;
            for &b in self.0.iter() {
                write!(f, "{:02x}", b)?;
            }
            Ok(())
        }
    }
}

/// A hierarchical name: an ordered sequence of opaque components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Name {
    components: Vec<NameComponent>,
}

impl Name {
    /// Creates a new empty name.
    pub fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Creates a name from a string representation with '/' as component separator.
    pub fn from_string(s: &str) -> Self {
        let components = s
            .split('/')
            .filter(|comp| !comp.is_empty())
            .map(|comp| NameComponent::new(comp.as_bytes().to_vec()))
            .collect();

        Self { components }
    }

    /// Adds a component to the name.
    pub fn push(&mut self, component: NameComponent) -> &mut Self {
        self.components.push(component);
        self
    }

    /// Returns a copy of this name with one more component.
    pub fn child(&self, component: &str) -> Self {
        let mut name = self.clone();
        name.push(NameComponent::new(component.as_bytes().to_vec()));
        name
    }

    /// Returns the number of components in the name.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns true if the name has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Returns an iterator over the name components.
    pub fn components(&self) -> impl Iterator<Item = &NameComponent> {
        self.components.iter()
    }

    /// Gets a component at the specified index.
    pub fn get(&self, index: usize) -> Option<&NameComponent> {
        self.components.get(index)
    }

    /// Returns a prefix of this name with the specified length.
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            components: self.components.iter().take(len).cloned().collect(),
        }
    }

    /// Checks if this name is a prefix of another name.
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.len() <= other.len()
            && self
                .components
                .iter()
                .zip(other.components.iter())
                .all(|(a, b)| a == b)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.components.is_empty() {
            return write!(f, "/");
        }

        for component in &self.components {
            write!(f, "/{}", component)?;
        }

        Ok(())
    }
}

impl Default for Name {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

impl FromStr for Name {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_string(s))
    }
}

/// A request for named content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interest {
    /// The name requested in the Interest.
    pub name: Name,
}

impl Interest {
    pub fn new(name: impl Into<Name>) -> Self {
        Self { name: name.into() }
    }
}

/// A named payload answering an Interest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Content {
    pub name: Name,
    pub payload: Bytes,
}

impl Content {
    pub fn new(name: impl Into<Name>, payload: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
        }
    }
}

/// Reason carried by a [`Nack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NackReason {
    NoRoute,
    NoContent,
    PitTimeout,
    CompNotRunning,
    CompParamUnavailable,
    CompException,
    CompTerminated,
    NotSet,
}

impl fmt::Display for NackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NackReason::NoRoute => "no forwarding rule",
            NackReason::NoContent => "no content available",
            NackReason::PitTimeout => "pit timeout",
            NackReason::CompNotRunning => "computation not running",
            NackReason::CompParamUnavailable => "computation parameter not available",
            NackReason::CompException => "computation exception",
            NackReason::CompTerminated => "computation terminated",
            NackReason::NotSet => "not set",
        };
        f.write_str(s)
    }
}

/// Negative acknowledgement for a name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nack {
    pub name: Name,
    pub reason: NackReason,
    /// The Interest being refused, when known.
    pub interest: Option<Interest>,
}

impl Nack {
    pub fn new(name: impl Into<Name>, reason: NackReason, interest: Option<Interest>) -> Self {
        Self {
            name: name.into(),
            reason,
            interest,
        }
    }
}

/// Any packet the forwarder handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Packet {
    Interest(Interest),
    Content(Content),
    Nack(Nack),
}

impl Packet {
    /// The name carried by the packet.
    pub fn name(&self) -> &Name {
        match self {
            Packet::Interest(i) => &i.name,
            Packet::Content(c) => &c.name,
            Packet::Nack(n) => &n.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Packet::Interest(_) => "Interest",
            Packet::Content(_) => "Content",
            Packet::Nack(_) => "Nack",
        }
    }
}

impl From<Interest> for Packet {
    fn from(i: Interest) -> Self {
        Packet::Interest(i)
    }
}

impl From<Content> for Packet {
    fn from(c: Content) -> Self {
        Packet::Content(c)
    }
}

impl From<Nack> for Packet {
    fn from(n: Nack) -> Self {
        Packet::Nack(n)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Packet::Nack(n) => write!(f, "Nack {} ({})", n.name, n.reason),
            other => write!(f, "{} {}", other.kind(), other.name()),
        }
    }
}
