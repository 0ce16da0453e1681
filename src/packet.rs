//! Schema-driven packet decommutation.
//!
//! Decoding a stream is a fixed sequence per record: peek-decode the primary
//! header, use header values to resolve exactly one [`Container`] from the
//! schema, then decode the container's full field list (header included)
//! against the cursor. See [`RecordDecoder`] for the stream driver.
//!
//! References:
//! * CCSDS Space Packet Protocol 133.0-B-1
//!     - <https://public.ccsds.org/Pubs/133x0b1c2.pdf>

mod stream;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bits::BitCursor;
use crate::schema::{Calibration, Container, FieldKind, FieldRule, Length, PacketSchema};
use crate::{Error, Result};

pub use stream::{decode_records, Outcome, RecordDecoder, RecordIter};

pub type Apid = u16;

/// Packet is the first packet in a packet group
pub const SEQ_FIRST: u8 = 1;
/// Packet is a part of a packet group, but not first and not last
pub const SEQ_CONTINUATION: u8 = 0;
/// Packet is the last packet in a packet group
pub const SEQ_LAST: u8 = 2;
/// Packet is not part of a packet group, i.e., standalone.
pub const SEQ_UNSEGMENTED: u8 = 3;

/// CCSDS Primary Header
///
/// The primary header format is common to all CCSDS space packets, which is
/// what makes container resolution possible: it can always be decoded before
/// the record's layout is known.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub type_flag: u8,
    pub has_secondary_header: bool,
    pub apid: Apid,
    /// Defines a packets grouping. See the `SEQ_*` values.
    pub sequence_flags: u8,
    pub sequence_id: u16,
    pub len_minus1: u16,
}

impl Header {
    /// Size of a [`Header`] in octets.
    pub const LEN: usize = 6;
    /// Size of a [`Header`] in bits.
    pub const LEN_BITS: usize = 48;

    /// Decode a header, advancing the cursor past it.
    ///
    /// # Errors
    /// [`Error::OutOfRange`] if fewer than 48 bits remain.
    pub fn decode(cursor: &mut BitCursor) -> Result<Header> {
        Ok(Header {
            version: cursor.read_uint(3)? as u8,
            type_flag: cursor.read_uint(1)? as u8,
            has_secondary_header: cursor.read_bool()?,
            apid: cursor.read_uint(11)? as Apid,
            sequence_flags: cursor.read_uint(2)? as u8,
            sequence_id: cursor.read_uint(14)? as u16,
            len_minus1: cursor.read_uint(16)? as u16,
        })
    }

    /// Decode a header at bit position `at` without disturbing the cursor:
    /// the original position is restored whether or not the decode succeeds.
    /// This is how a header is classified before the same bits are re-decoded
    /// as part of the resolved container.
    ///
    /// # Errors
    /// [`Error::InvalidPosition`] if `at` is past the end of the buffer, or
    /// any error from [`Header::decode`].
    pub fn decode_at(cursor: &mut BitCursor, at: usize) -> Result<Header> {
        let saved = cursor.position();
        cursor.set_position(at)?;
        let zult = Self::decode(cursor);
        // saved came from the cursor, so it is always valid
        cursor.set_position(saved)?;
        zult
    }

    /// Header value by schema field name.
    #[must_use]
    pub fn value(&self, field: &str) -> Option<u64> {
        let val = match field {
            "VERSION" => u64::from(self.version),
            "TYPE" => u64::from(self.type_flag),
            "SEC_HDR_FLG" => u64::from(self.has_secondary_header),
            "APID" => u64::from(self.apid),
            "SEQ_FLGS" => u64::from(self.sequence_flags),
            "SEQ_CTR" => u64::from(self.sequence_id),
            "LEN" => u64::from(self.len_minus1),
            _ => return None,
        };
        Some(val)
    }

    /// Total octets in the record this header starts, per the protocol
    /// convention that `len_minus1` counts body octets minus one.
    #[must_use]
    pub fn total_octets(&self) -> usize {
        self.len_minus1 as usize + 1 + Self::LEN
    }

    #[must_use]
    pub fn is_first(&self) -> bool {
        self.sequence_flags == SEQ_FIRST
    }

    #[must_use]
    pub fn is_last(&self) -> bool {
        self.sequence_flags == SEQ_LAST
    }

    #[must_use]
    pub fn is_cont(&self) -> bool {
        self.sequence_flags == SEQ_CONTINUATION
    }

    #[must_use]
    pub fn is_standalone(&self) -> bool {
        self.sequence_flags == SEQ_UNSEGMENTED
    }
}

/// Select the single container whose restrictions the header satisfies.
///
/// # Errors
/// [`Error::UnrecognizedType`] if no container matches;
/// [`Error::AmbiguousType`] if more than one matches, which indicates a
/// schema authoring defect and is never resolved by priority.
pub fn resolve<'a>(schema: &'a PacketSchema, header: &Header) -> Result<&'a Container> {
    let mut matched: Vec<&Container> = Vec::new();
    for container in &schema.containers {
        // restriction fields are validated against the header at load
        let ok = container
            .restrictions
            .iter()
            .all(|r| header.value(&r.field).is_some_and(|v| r.matches(v)));
        if ok {
            matched.push(container);
        }
    }
    match matched.len() {
        1 => Ok(matched[0]),
        0 => Err(Error::UnrecognizedType { apid: header.apid }),
        _ => Err(Error::AmbiguousType(
            matched.iter().map(|c| c.name.clone()).collect(),
        )),
    }
}

/// Raw representation of a decoded field, before any calibration.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum RawValue {
    Uint(u64),
    Int(i64),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl RawValue {
    #[must_use]
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            RawValue::Uint(v) => Some(*v),
            _ => None,
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self {
            RawValue::Uint(v) => i64::try_from(*v).ok(),
            RawValue::Int(v) => Some(*v),
            RawValue::Bool(v) => Some(i64::from(*v)),
            RawValue::Bytes(_) => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            RawValue::Uint(v) => Some(*v as f64),
            RawValue::Int(v) => Some(*v as f64),
            RawValue::Bool(v) => Some(f64::from(*v)),
            RawValue::Bytes(_) => None,
        }
    }
}

/// Calibrated interpretation of a raw value.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum DerivedValue {
    Label(String),
    Float(f64),
}

/// A single decoded, named field.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub raw: RawValue,
    pub unit: Option<String>,
    /// Present only when the field rule defines a calibration and it applied
    /// to the raw value.
    pub derived: Option<DerivedValue>,
}

/// Decoded fields in schema order, addressable by name.
#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    fields: Vec<Field>,
}

impl FieldSet {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn push(&mut self, field: Field) {
        self.fields.push(field);
    }
}

/// One decoded record: the header fields plus the container-specific body.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Record {
    /// Name of the container the record decoded as.
    pub container: String,
    pub header: FieldSet,
    pub data: FieldSet,
}

/// Decode one full record for an already-resolved container, header first,
/// advancing the cursor past every field.
///
/// Body fields may reference any previously decoded field of the same record
/// (header included) for dynamic lengths. `word_size`, when set, enables the
/// per-rule word alignment flag.
///
/// # Errors
/// [`Error::OutOfRange`] on truncated input, which is fatal for the record.
pub fn decode_record(
    cursor: &mut BitCursor,
    container: &Container,
    word_size: Option<usize>,
) -> Result<Record> {
    let header_len = crate::schema::HEADER_FIELDS.len();

    let mut header = FieldSet::default();
    for rule in &container.fields[..header_len] {
        // header entries carry raw values only
        if let Some(field) = decode_field(cursor, rule, |_| None, word_size, false)? {
            header.push(field);
        }
    }

    let mut data = FieldSet::default();
    for rule in &container.fields[header_len..] {
        let lookup = |name: &str| {
            data.get(name)
                .or_else(|| header.get(name))
                .and_then(|f| f.raw.as_uint())
        };
        if let Some(field) = decode_field(cursor, rule, lookup, word_size, true)? {
            data.push(field);
        }
    }

    Ok(Record {
        container: container.name.clone(),
        header,
        data,
    })
}

/// Decode one field rule. Returns `None` for padding rules, which consume
/// bits but produce no field.
fn decode_field<F>(
    cursor: &mut BitCursor,
    rule: &FieldRule,
    lookup: F,
    word_size: Option<usize>,
    calibrate: bool,
) -> Result<Option<Field>>
where
    F: Fn(&str) -> Option<u64>,
{
    let raw = match &rule.kind {
        FieldKind::Uint { bits } => RawValue::Uint(cursor.read_uint(*bits)?),
        FieldKind::Int { bits } => RawValue::Int(cursor.read_int(*bits)?),
        FieldKind::Bool => RawValue::Bool(cursor.read_bool()?),
        FieldKind::Bytes { len } => {
            let octets = match len {
                Length::Octets { octets } => *octets,
                Length::FieldOctets { octets_from } => {
                    lookup(octets_from).ok_or_else(|| {
                        Error::Schema(format!(
                            "field {:?} length reference {octets_from:?} did not decode as \
                             an unsigned integer",
                            rule.name
                        ))
                    })? as usize
                }
            };
            RawValue::Bytes(cursor.read_bytes(octets)?)
        }
        FieldKind::Padding { bits } => {
            cursor.skip(*bits)?;
            if let Some(word) = word_size {
                if rule.word_aligned {
                    cursor.align(word)?;
                }
            }
            return Ok(None);
        }
    };

    if let Some(word) = word_size {
        if rule.word_aligned {
            cursor.align(word)?;
        }
    }

    let derived = if calibrate {
        rule.calibration
            .as_ref()
            .and_then(|cal| derive(cal, &raw, &rule.name))
    } else {
        None
    };

    Ok(Some(Field {
        name: rule.name.clone(),
        raw,
        unit: rule.unit.clone(),
        derived,
    }))
}

/// Apply a calibration to a raw value. A raw value with no defined mapping is
/// not an error: the field is emitted with no derived value.
fn derive(calibration: &Calibration, raw: &RawValue, name: &str) -> Option<DerivedValue> {
    match calibration {
        Calibration::Lookup(map) => {
            let key = raw.as_int()?;
            match map.get(&key) {
                Some(label) => Some(DerivedValue::Label(label.clone())),
                None => {
                    warn!(field = name, raw = key, "no calibration entry for raw value");
                    None
                }
            }
        }
        Calibration::Polynomial(coefs) => {
            let x = raw.as_f64()?;
            let val = coefs.iter().rev().fold(0.0, |acc, c| acc * x + c);
            Some(DerivedValue::Float(val))
        }
    }
}
