//! Container schema model used to drive packet decommutation.
//!
//! A schema is the loaded, validated form of a packet definition document: an
//! ordered list of containers, each with restriction criteria selecting it
//! from header values and an ordered list of field decode rules. The model is
//! read-only once loaded.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The fixed primary header layout: name and width in bits, in decode order.
/// Every container's field list starts with these seven entries.
pub const HEADER_FIELDS: [(&str, usize); 7] = [
    ("VERSION", 3),
    ("TYPE", 1),
    ("SEC_HDR_FLG", 1),
    ("APID", 11),
    ("SEQ_FLGS", 2),
    ("SEQ_CTR", 14),
    ("LEN", 16),
];

/// A complete packet definition: every container layout the stream may carry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacketSchema {
    pub containers: Vec<Container>,
}

impl PacketSchema {
    /// Load and validate a schema from a JSON document.
    ///
    /// # Errors
    /// [`Error::SchemaFormat`] if the document does not parse,
    /// [`Error::Schema`] if it fails validation.
    pub fn from_str(doc: &str) -> Result<Self> {
        let schema: PacketSchema = serde_json::from_str(doc)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load and validate a schema from a reader of a JSON document.
    ///
    /// # Errors
    /// See [`PacketSchema::from_str`].
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let schema: PacketSchema = serde_json::from_reader(reader)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Load and validate a schema from a JSON file.
    ///
    /// # Errors
    /// See [`PacketSchema::from_str`], or any [`std::io::Error`] opening.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }

    /// Structural checks performed once at load so decode never has to.
    ///
    /// Restrictions may only reference header fields: container selection
    /// happens before any body field can be decoded. Dynamic lengths may only
    /// reference fields decoded earlier in the same container.
    fn validate(&self) -> Result<()> {
        for container in &self.containers {
            container.validate()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Container> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// One possible record layout, selected by its restrictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    #[serde(default)]
    pub restrictions: Vec<Restriction>,
    pub fields: Vec<FieldRule>,
}

impl Container {
    fn validate(&self) -> Result<()> {
        for restriction in &self.restrictions {
            if !HEADER_FIELDS.iter().any(|(n, _)| *n == restriction.field) {
                return Err(Error::Schema(format!(
                    "container {}: restriction on {:?} which is not a header field; \
                     containers must be selectable from the header alone",
                    self.name, restriction.field,
                )));
            }
        }

        if self.fields.len() < HEADER_FIELDS.len() {
            return Err(Error::Schema(format!(
                "container {}: fewer fields than the primary header",
                self.name
            )));
        }
        for (rule, (name, bits)) in self.fields.iter().zip(HEADER_FIELDS) {
            match rule.kind {
                FieldKind::Uint { bits: got } if got == bits && rule.name == name => {}
                _ => {
                    return Err(Error::Schema(format!(
                        "container {}: field {:?} does not mirror header field {name}({bits})",
                        self.name, rule.name,
                    )))
                }
            }
        }

        for (idx, rule) in self.fields.iter().enumerate() {
            rule.validate(&self.name)?;
            if let FieldKind::Bytes {
                len: Length::FieldOctets { octets_from },
            } = &rule.kind
            {
                let prior_uint = self.fields[..idx]
                    .iter()
                    .any(|f| f.name == *octets_from && matches!(f.kind, FieldKind::Uint { .. }));
                if !prior_uint {
                    return Err(Error::Schema(format!(
                        "container {}: field {:?} takes its length from {octets_from:?} \
                         which is not an earlier unsigned field",
                        self.name, rule.name,
                    )));
                }
            }
        }
        Ok(())
    }
}

/// An equality/range test on a header field used to pick a container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restriction {
    pub field: String,
    #[serde(default)]
    pub op: Comparator,
    pub value: i64,
}

impl Restriction {
    #[must_use]
    pub fn matches(&self, actual: u64) -> bool {
        self.op.compare(actual as i64, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Comparator {
    #[default]
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl Comparator {
    #[must_use]
    pub fn compare(&self, left: i64, right: i64) -> bool {
        match self {
            Comparator::Eq => left == right,
            Comparator::Ne => left != right,
            Comparator::Lt => left < right,
            Comparator::Le => left <= right,
            Comparator::Gt => left > right,
            Comparator::Ge => left >= right,
        }
    }
}

/// How to decode a single named field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub unit: Option<String>,
    /// When the decoder is configured with a word size, advance to the next
    /// word boundary after this field.
    #[serde(default)]
    pub word_aligned: bool,
    #[serde(default)]
    pub calibration: Option<Calibration>,
}

impl FieldRule {
    fn validate(&self, container: &str) -> Result<()> {
        let width = match self.kind {
            FieldKind::Uint { bits } | FieldKind::Int { bits } => bits,
            FieldKind::Padding { bits } => {
                if bits == 0 {
                    return Err(Error::Schema(format!(
                        "container {container}: field {:?} pads 0 bits",
                        self.name
                    )));
                }
                return Ok(());
            }
            FieldKind::Bool | FieldKind::Bytes { .. } => return Ok(()),
        };
        if !(1..=64).contains(&width) {
            return Err(Error::Schema(format!(
                "container {container}: field {:?} has width {width}, must be 1..=64",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FieldKind {
    /// Big-endian unsigned integer of the given bit width.
    Uint { bits: usize },
    /// Two's complement signed integer of the given bit width.
    Int { bits: usize },
    /// Single bit flag.
    Bool,
    /// Fixed-length byte string; length in octets, fixed or taken from a
    /// previously decoded field.
    Bytes { len: Length },
    /// Reserved/unused bits: consumed, never emitted as a field.
    Padding { bits: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Length {
    Octets { octets: usize },
    FieldOctets {
        #[serde(rename = "octetsFrom")]
        octets_from: String,
    },
}

/// Raw-to-derived value mapping for a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Calibration {
    /// Enumerated lookup from raw integer to a label.
    Lookup(HashMap<i64, String>),
    /// Polynomial coefficients, lowest order first.
    Polynomial(Vec<f64>),
}
