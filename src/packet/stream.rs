use tracing::{trace, warn};
use typed_builder::TypedBuilder;

use crate::bits::BitCursor;
use crate::schema::PacketSchema;
use crate::{Error, Result};

use super::{decode_record, resolve, Apid, Header, Record};

/// Decodes a buffer of concatenated records against a schema.
///
/// The decoder validates each record's consumed length against the length
/// declared in its header and always corrects the cursor to the declared
/// record boundary before continuing, so one malformed body cannot corrupt
/// the rest of the stream.
///
/// # Example
/// ```no_run
/// use decom::schema::PacketSchema;
/// use decom::packet::RecordDecoder;
///
/// let schema = PacketSchema::from_file("schema.json").unwrap();
/// let dat: Vec<u8> = std::fs::read("packets.dat").unwrap();
/// let decoder = RecordDecoder::builder().schema(&schema).build();
/// for zult in decoder.decode(&dat) {
///     let outcome = zult.unwrap();
///     println!("{outcome:?}");
/// }
/// ```
#[derive(TypedBuilder)]
pub struct RecordDecoder<'a> {
    schema: &'a PacketSchema,
    /// Word size in bits for field rules marked word-aligned. Default is no
    /// word boundary enforcement. Typical use is 32-bit words.
    #[builder(default)]
    word_size: Option<usize>,
    /// When true (the default), a record whose decoded length does not match
    /// its declared length is still emitted after the cursor is corrected.
    /// When false such records are reported as [`Outcome::Dropped`].
    #[builder(default = true)]
    emit_bad_lengths: bool,
    /// Bits to skip before each record, for streams with a non-protocol
    /// prefix prepended to every record.
    #[builder(default)]
    skip_leading_bits: usize,
}

impl<'a> RecordDecoder<'a> {
    /// Decode `buf` into a lazy sequence of [`Outcome`]s.
    ///
    /// The sequence is forward-only and finite; to restart, decode the same
    /// buffer again.
    #[must_use]
    pub fn decode<'b>(self, buf: &'b [u8]) -> RecordIter<'a, 'b> {
        RecordIter {
            schema: self.schema,
            word_size: self.word_size,
            emit_bad_lengths: self.emit_bad_lengths,
            skip_leading_bits: self.skip_leading_bits,
            cursor: BitCursor::new(buf),
            done: false,
        }
    }
}

/// Per-record disposition produced by [`RecordIter`].
///
/// Records that cannot be decoded but do not corrupt the stream are reported
/// rather than silently consumed, so a consumer can always distinguish end of
/// stream from data loss.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// A fully decoded record.
    Record(Record),
    /// No container matched the record's header; the whole declared record
    /// was skipped.
    Skipped { apid: Apid, octets: usize },
    /// The record's consumed length did not match its declared length and
    /// the decoder was configured not to emit such records. The cursor was
    /// corrected to the declared boundary.
    Dropped { apid: Apid, octets: usize },
}

pub struct RecordIter<'a, 'b> {
    schema: &'a PacketSchema,
    word_size: Option<usize>,
    emit_bad_lengths: bool,
    skip_leading_bits: usize,
    cursor: BitCursor<'b>,
    done: bool,
}

impl RecordIter<'_, '_> {
    /// Force the cursor to `target`, clamped to the end of the buffer.
    fn resync(&mut self, target: usize) {
        let target = target.min(self.cursor.len_bits());
        // clamped target is always valid
        let _ = self.cursor.set_position(target);
    }
}

impl Iterator for RecordIter<'_, '_> {
    type Item = Result<Outcome>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.skip_leading_bits > 0 {
            if self.cursor.remaining_bits() < self.skip_leading_bits {
                self.done = true;
                return None;
            }
            self.resync(self.cursor.position() + self.skip_leading_bits);
        }

        // Too few bits for another header is a clean end of stream.
        if self.cursor.remaining_bits() < Header::LEN_BITS {
            if self.cursor.remaining_bits() > 0 {
                trace!(
                    bits = self.cursor.remaining_bits(),
                    "trailing bits at end of stream"
                );
            }
            self.done = true;
            return None;
        }

        let start = self.cursor.position();

        // Peek the header so the same bits can be re-decoded once the
        // container is known.
        let header = match Header::decode_at(&mut self.cursor, start) {
            Ok(header) => header,
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };
        let declared_bits = header.total_octets() * 8;
        trace!(
            apid = header.apid,
            offset_bits = start,
            declared_octets = header.total_octets(),
            "decoding record"
        );

        let container = match resolve(self.schema, &header) {
            Ok(container) => container,
            Err(Error::UnrecognizedType { apid }) => {
                warn!(apid, "no container matched header, skipping record");
                self.resync(start + declared_bits);
                return Some(Ok(Outcome::Skipped {
                    apid,
                    octets: header.total_octets(),
                }));
            }
            // Ambiguity is a schema defect, fatal for the whole stream
            Err(err) => {
                self.done = true;
                return Some(Err(err));
            }
        };

        let record = match decode_record(&mut self.cursor, container, self.word_size) {
            Ok(record) => record,
            Err(err) => {
                // mid-record truncation; there is nothing to resume to
                self.done = true;
                return Some(Err(err));
            }
        };

        let consumed = self.cursor.position() - start;
        if consumed != declared_bits {
            warn!(
                apid = header.apid,
                container = %record.container,
                consumed_bits = consumed,
                declared_bits,
                "record length does not match header, correcting cursor to declared boundary"
            );
            self.resync(start + declared_bits);
            if !self.emit_bad_lengths {
                return Some(Ok(Outcome::Dropped {
                    apid: header.apid,
                    octets: header.total_octets(),
                }));
            }
        }

        Some(Ok(Outcome::Record(record)))
    }
}

/// Decode `buf` against `schema` with default options: no word alignment, no
/// leading bits, bad-length records emitted.
#[must_use]
pub fn decode_records<'a, 'b>(schema: &'a PacketSchema, buf: &'b [u8]) -> RecordIter<'a, 'b> {
    RecordDecoder::builder().schema(schema).build().decode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::RawValue;
    use crate::schema::{
        Comparator, Container, FieldKind, FieldRule, Length, Restriction, HEADER_FIELDS,
    };

    fn rule(name: &str, kind: FieldKind) -> FieldRule {
        FieldRule {
            name: name.to_string(),
            kind,
            unit: None,
            word_aligned: false,
            calibration: None,
        }
    }

    fn container(name: &str, apid: i64, body: Vec<FieldRule>) -> Container {
        let mut fields: Vec<FieldRule> = HEADER_FIELDS
            .iter()
            .map(|(name, bits)| rule(name, FieldKind::Uint { bits: *bits }))
            .collect();
        fields.extend(body);
        Container {
            name: name.to_string(),
            restrictions: vec![Restriction {
                field: "APID".to_string(),
                op: Comparator::Eq,
                value: apid,
            }],
            fields,
        }
    }

    /// Schema with one container for apid 100 with a 2-octet body.
    fn test_schema() -> PacketSchema {
        PacketSchema {
            containers: vec![container(
                "HK",
                100,
                vec![
                    rule("A", FieldKind::Uint { bits: 8 }),
                    rule("B", FieldKind::Uint { bits: 8 }),
                ],
            )],
        }
    }

    /// One record: header for `apid` declaring `body.len()` octets, plus body.
    fn record_bytes(apid: u16, body: &[u8]) -> Vec<u8> {
        let mut dat = Vec::new();
        dat.extend((0x1800u16 | apid).to_be_bytes()); // version 0, sec hdr, apid
        dat.extend(0xc001u16.to_be_bytes()); // unsegmented, seq 1
        dat.extend((body.len() as u16 - 1).to_be_bytes());
        dat.extend(body);
        dat
    }

    #[test]
    fn emits_each_record() {
        let schema = test_schema();
        let mut dat = record_bytes(100, &[1, 2]);
        dat.extend(record_bytes(100, &[3, 4]));

        let outcomes: Vec<Outcome> = decode_records(&schema, &dat)
            .map(Result::unwrap)
            .collect();
        assert_eq!(outcomes.len(), 2);

        let Outcome::Record(record) = &outcomes[1] else {
            panic!("expected a record, got {:?}", outcomes[1]);
        };
        assert_eq!(record.container, "HK");
        assert_eq!(record.header.get("APID").unwrap().raw, RawValue::Uint(100));
        assert_eq!(record.data.get("A").unwrap().raw, RawValue::Uint(3));
        assert_eq!(record.data.get("B").unwrap().raw, RawValue::Uint(4));
    }

    #[test]
    fn decode_is_idempotent() {
        let schema = test_schema();
        let mut dat = record_bytes(100, &[1, 2]);
        dat.extend(record_bytes(100, &[3, 4]));

        let records = |dat: &[u8]| -> Vec<Record> {
            decode_records(&schema, dat)
                .map(Result::unwrap)
                .filter_map(|o| match o {
                    Outcome::Record(r) => Some(r),
                    _ => None,
                })
                .collect()
        };
        assert_eq!(records(&dat), records(&dat));
    }

    #[test]
    fn unrecognized_apid_is_skipped() {
        let schema = test_schema();
        // record for an apid with no container, then a good record
        let mut dat = record_bytes(200, &[9, 9, 9]);
        dat.extend(record_bytes(100, &[1, 2]));

        let outcomes: Vec<Outcome> = decode_records(&schema, &dat)
            .map(Result::unwrap)
            .collect();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0],
            Outcome::Skipped { apid: 200, octets: 9 }
        ));
        assert!(matches!(&outcomes[1], Outcome::Record(r) if r.data.get("A").unwrap().raw == RawValue::Uint(1)));
    }

    #[test]
    fn ambiguous_schema_is_fatal() {
        let schema = PacketSchema {
            containers: vec![
                container("C0", 100, vec![]),
                container("C1", 100, vec![]),
            ],
        };
        let dat = record_bytes(100, &[1]);

        let mut iter = decode_records(&schema, &dat);
        assert!(matches!(
            iter.next().unwrap().unwrap_err(),
            Error::AmbiguousType(_)
        ));
        assert!(iter.next().is_none(), "stream should have terminated");
    }

    #[test]
    fn short_body_lenient_emits_and_resyncs() {
        // container consumes 2 octets but the header declares 4: the record
        // is still emitted and the cursor lands on the declared boundary
        let schema = test_schema();
        let mut dat = record_bytes(100, &[1, 2, 0xde, 0xad]);
        dat.extend(record_bytes(100, &[3, 4]));

        let outcomes: Vec<Outcome> = decode_records(&schema, &dat)
            .map(Result::unwrap)
            .collect();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[0], Outcome::Record(r) if r.data.get("B").unwrap().raw == RawValue::Uint(2)));
        assert!(matches!(&outcomes[1], Outcome::Record(r) if r.data.get("A").unwrap().raw == RawValue::Uint(3)));
    }

    #[test]
    fn short_body_strict_drops() {
        let schema = test_schema();
        let mut dat = record_bytes(100, &[1, 2, 0xde, 0xad]);
        dat.extend(record_bytes(100, &[3, 4]));

        let decoder = RecordDecoder::builder()
            .schema(&schema)
            .emit_bad_lengths(false)
            .build();
        let outcomes: Vec<Outcome> = decoder.decode(&dat).map(Result::unwrap).collect();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(
            outcomes[0],
            Outcome::Dropped { apid: 100, octets: 10 }
        ));
        assert!(matches!(&outcomes[1], Outcome::Record(_)));
    }

    #[test]
    fn truncated_record_is_fatal() {
        let schema = test_schema();
        let dat = record_bytes(100, &[1, 2]);
        // chop one body byte off
        let dat = &dat[..dat.len() - 1];

        let mut iter = decode_records(&schema, dat);
        assert!(matches!(
            iter.next().unwrap().unwrap_err(),
            Error::OutOfRange { .. }
        ));
        assert!(iter.next().is_none());
    }

    #[test]
    fn trailing_partial_header_ends_stream() {
        let schema = test_schema();
        let mut dat = record_bytes(100, &[1, 2]);
        dat.extend([0x18, 0x64, 0xc0]); // 3 stray bytes, less than a header

        let outcomes: Vec<Result<Outcome>> = decode_records(&schema, &dat).collect();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].is_ok());
    }

    #[test]
    fn leading_bits_skipped_per_record() {
        let schema = test_schema();
        let mut dat = vec![0xee, 0xee]; // 2-octet prefix before every record
        dat.extend(record_bytes(100, &[1, 2]));
        dat.extend([0xee, 0xee]);
        dat.extend(record_bytes(100, &[3, 4]));

        let decoder = RecordDecoder::builder()
            .schema(&schema)
            .skip_leading_bits(16)
            .build();
        let outcomes: Vec<Outcome> = decoder.decode(&dat).map(Result::unwrap).collect();
        assert_eq!(outcomes.len(), 2);
        assert!(matches!(&outcomes[1], Outcome::Record(r) if r.data.get("A").unwrap().raw == RawValue::Uint(3)));
    }
}
