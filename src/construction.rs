//! EDOS Production Data Set (PDS) Construction Record decoding.
//!
//! A construction record is a single large binary record describing one data
//! delivery: session time ranges, per-APID accounting (virtual channels,
//! sequence gaps, fill regions, length discrepancies), and the files that
//! store the delivered data. Unlike packet streams the layout is fixed rather
//! than schema-driven, with repeated substructures whose counts are decoded
//! fields, so decoding is a single sequential pass and any out-of-range read
//! fails the whole record.

use serde::Serialize;

use crate::bits::BitCursor;
use crate::timecode::CdsTime;
use crate::Result;

/// One decoded construction record.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ConstructionRecord {
    /// EDOS software version word; see [`version_major`](Self::version_major)
    /// and [`version_release`](Self::version_release).
    pub edos_version: u16,
    /// Record type; [`ConstructionRecord::TYPE_PDS`] for a PDS delivery.
    pub record_type: u8,
    pub id: String,
    pub test_flag: bool,
    /// Spacecraft contact session start/stop times.
    pub sessions: Vec<ScsSession>,
    pub fill_octets: u64,
    pub length_mismatch_count: u32,
    pub first_packet_time: CdsTime,
    pub last_packet_time: CdsTime,
    pub first_packet_esh_time: u64,
    pub last_packet_esh_time: u64,
    pub rs_corrected_count: u32,
    pub packet_count: u32,
    pub size_octets: u64,
    pub discontinuity_count: u32,
    pub completion_time: u64,
    pub apids: Vec<ApidInfo>,
    pub files: Vec<DataFile>,
}

impl ConstructionRecord {
    /// Record type value for a PDS construction record.
    pub const TYPE_PDS: u8 = 1;

    /// Decode a whole construction record from `buf`.
    ///
    /// # Errors
    /// [`crate::Error::OutOfRange`] if the buffer is too short for the
    /// layout; no partial record is produced.
    pub fn from_slice(buf: &[u8]) -> Result<Self> {
        Self::decode(&mut BitCursor::new(buf))
    }

    /// Decode a whole construction record at the cursor.
    ///
    /// # Errors
    /// [`crate::Error::OutOfRange`] on truncation; fatal for the record.
    pub fn decode(cursor: &mut BitCursor) -> Result<Self> {
        let edos_version = cursor.read_uint(16)? as u16;
        let record_type = cursor.read_uint(8)? as u8;
        cursor.skip(8)?;
        let id = string_field(cursor, 36)?;
        cursor.skip(7)?;
        let test_flag = cursor.read_bool()?;
        cursor.skip(8)?;
        cursor.skip(64)?;

        let session_count = cursor.read_uint(16)?;
        let mut sessions = Vec::with_capacity(session_count as usize);
        for _ in 0..session_count {
            sessions.push(ScsSession::decode(cursor)?);
        }

        let fill_octets = cursor.read_uint(64)?;
        let length_mismatch_count = cursor.read_uint(32)? as u32;
        let first_packet_time = time_field(cursor)?;
        let last_packet_time = time_field(cursor)?;
        let first_packet_esh_time = cursor.read_uint(64)?;
        let last_packet_esh_time = cursor.read_uint(64)?;
        let rs_corrected_count = cursor.read_uint(32)? as u32;
        let packet_count = cursor.read_uint(32)? as u32;
        let size_octets = cursor.read_uint(64)?;
        let discontinuity_count = cursor.read_uint(32)? as u32;
        let completion_time = cursor.read_uint(64)?;
        cursor.skip(56)?;

        let apid_count = cursor.read_uint(8)?;
        let mut apids = Vec::with_capacity(apid_count as usize);
        for _ in 0..apid_count {
            apids.push(ApidInfo::decode(cursor)?);
        }

        cursor.skip(24)?;
        let file_count = cursor.read_uint(8)?;
        let mut files = Vec::with_capacity(file_count as usize);
        for _ in 0..file_count {
            files.push(DataFile::decode(cursor)?);
        }

        Ok(ConstructionRecord {
            edos_version,
            record_type,
            id,
            test_flag,
            sessions,
            fill_octets,
            length_mismatch_count,
            first_packet_time,
            last_packet_time,
            first_packet_esh_time,
            last_packet_esh_time,
            rs_corrected_count,
            packet_count,
            size_octets,
            discontinuity_count,
            completion_time,
            apids,
            files,
        })
    }

    /// Major version number of the EDOS software that produced the record.
    #[must_use]
    pub fn version_major(&self) -> u8 {
        (self.edos_version >> 8) as u8
    }

    /// Release number of the EDOS software that produced the record.
    #[must_use]
    pub fn version_release(&self) -> u8 {
        (self.edos_version & 0xff) as u8
    }
}

/// Spacecraft contact session (SCS) start and stop times.
#[derive(Serialize, Debug, Copy, Clone, PartialEq)]
pub struct ScsSession {
    pub start: CdsTime,
    pub stop: CdsTime,
}

impl ScsSession {
    fn decode(cursor: &mut BitCursor) -> Result<Self> {
        Ok(ScsSession {
            start: time_field(cursor)?,
            stop: time_field(cursor)?,
        })
    }
}

/// Accounting for a single APID within the delivery.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ApidInfo {
    /// Packed word of spacecraft id and apid; see [`scid`](Self::scid) and
    /// [`apid`](Self::apid).
    pub scid_apid: u32,
    pub byte_offset: u64,
    pub vcids: Vec<VcidInfo>,
    pub gaps: Vec<SequenceGap>,
    pub fill: Vec<FillRegion>,
    pub fill_octets: u64,
    pub length_discrepancies: Vec<u32>,
    pub first_packet_time: CdsTime,
    pub last_packet_time: CdsTime,
    pub first_packet_esh_time: u64,
    pub last_packet_esh_time: u64,
    pub corrected_packet_count: u32,
    pub packet_count: u32,
    pub size_octets: u64,
}

impl ApidInfo {
    fn decode(cursor: &mut BitCursor) -> Result<Self> {
        cursor.skip(8)?;
        let scid_apid = cursor.read_uint(24)? as u32;
        let byte_offset = cursor.read_uint(64)?;
        cursor.skip(24)?;

        let vcid_count = cursor.read_uint(8)?;
        let mut vcids = Vec::with_capacity(vcid_count as usize);
        for _ in 0..vcid_count {
            cursor.skip(16)?;
            vcids.push(VcidInfo::decode(cursor)?);
        }

        let gap_count = cursor.read_uint(32)?;
        let mut gaps = Vec::with_capacity(gap_count as usize);
        for _ in 0..gap_count {
            gaps.push(SequenceGap::decode(cursor)?);
        }

        let fill_count = cursor.read_uint(32)?;
        let mut fill = Vec::with_capacity(fill_count as usize);
        for _ in 0..fill_count {
            fill.push(FillRegion::decode(cursor)?);
        }

        let fill_octets = cursor.read_uint(64)?;
        let discrepancy_count = cursor.read_uint(32)?;
        let mut length_discrepancies = Vec::with_capacity(discrepancy_count as usize);
        for _ in 0..discrepancy_count {
            length_discrepancies.push(cursor.read_uint(32)? as u32);
        }

        let first_packet_time = time_field(cursor)?;
        let last_packet_time = time_field(cursor)?;
        let first_packet_esh_time = cursor.read_uint(64)?;
        let last_packet_esh_time = cursor.read_uint(64)?;
        let corrected_packet_count = cursor.read_uint(32)? as u32;
        let packet_count = cursor.read_uint(32)? as u32;
        let size_octets = cursor.read_uint(64)?;
        cursor.skip(64)?;

        Ok(ApidInfo {
            scid_apid,
            byte_offset,
            vcids,
            gaps,
            fill,
            fill_octets,
            length_discrepancies,
            first_packet_time,
            last_packet_time,
            first_packet_esh_time,
            last_packet_esh_time,
            corrected_packet_count,
            packet_count,
            size_octets,
        })
    }

    #[must_use]
    pub fn scid(&self) -> u8 {
        scid_of(self.scid_apid)
    }

    #[must_use]
    pub fn apid(&self) -> u16 {
        apid_of(self.scid_apid)
    }
}

/// Virtual channel identification for an APID.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct VcidInfo {
    /// Packed word: 2 reserved bits, 8 bits of spacecraft id, 6 bits of vcid.
    pub scid_vcid: u16,
}

impl VcidInfo {
    fn decode(cursor: &mut BitCursor) -> Result<Self> {
        Ok(VcidInfo {
            scid_vcid: cursor.read_uint(16)? as u16,
        })
    }

    #[must_use]
    pub fn scid(&self) -> u8 {
        (self.scid_vcid >> 6 & 0xff) as u8
    }

    #[must_use]
    pub fn vcid(&self) -> u8 {
        (self.scid_vcid & 0x3f) as u8
    }
}

/// A run of missing source sequence counts (SSCs) for an APID.
#[derive(Serialize, Debug, Copy, Clone, PartialEq)]
pub struct SequenceGap {
    pub first_missing_ssc: u32,
    pub byte_offset: u64,
    pub missing_count: u32,
    pub preceding_packet_time: CdsTime,
    pub following_packet_time: CdsTime,
    pub preceding_packet_esh_time: u64,
    pub following_packet_esh_time: u64,
}

impl SequenceGap {
    fn decode(cursor: &mut BitCursor) -> Result<Self> {
        Ok(SequenceGap {
            first_missing_ssc: cursor.read_uint(32)? as u32,
            byte_offset: cursor.read_uint(64)?,
            missing_count: cursor.read_uint(32)? as u32,
            preceding_packet_time: time_field(cursor)?,
            following_packet_time: time_field(cursor)?,
            preceding_packet_esh_time: cursor.read_uint(64)?,
            following_packet_esh_time: cursor.read_uint(64)?,
        })
    }
}

/// A packet region filled with EDOS-generated data.
#[derive(Serialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct FillRegion {
    pub ssc: u32,
    pub byte_offset: u64,
    pub fill_index: u32,
}

impl FillRegion {
    fn decode(cursor: &mut BitCursor) -> Result<Self> {
        Ok(FillRegion {
            ssc: cursor.read_uint(32)? as u32,
            byte_offset: cursor.read_uint(64)?,
            fill_index: cursor.read_uint(32)? as u32,
        })
    }
}

/// One file storing part of the delivery, with the APIDs it contains.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct DataFile {
    pub name: String,
    pub apids: Vec<FileApid>,
}

impl DataFile {
    fn decode(cursor: &mut BitCursor) -> Result<Self> {
        let name = string_field(cursor, 40)?;
        cursor.skip(24)?;

        // The ICD quotes this as a one-up counter of 1 to 3, but on the wire
        // an explicit 0 means "one entry, all zero-filled" rather than "no
        // entries", so the count is clamped to at least 1.
        let apid_count = cursor.read_uint(8)?.max(1);
        let mut apids = Vec::with_capacity(apid_count as usize);
        for _ in 0..apid_count {
            apids.push(FileApid::decode(cursor)?);
        }

        Ok(DataFile { name, apids })
    }
}

/// An APID's packet time range within one data file.
#[derive(Serialize, Debug, Copy, Clone, PartialEq)]
pub struct FileApid {
    pub scid_apid: u32,
    pub first_packet_time: CdsTime,
    pub last_packet_time: CdsTime,
}

impl FileApid {
    fn decode(cursor: &mut BitCursor) -> Result<Self> {
        cursor.skip(8)?;
        let scid_apid = cursor.read_uint(24)? as u32;
        let first_packet_time = time_field(cursor)?;
        let last_packet_time = time_field(cursor)?;
        cursor.skip(32)?;

        Ok(FileApid {
            scid_apid,
            first_packet_time,
            last_packet_time,
        })
    }

    #[must_use]
    pub fn scid(&self) -> u8 {
        scid_of(self.scid_apid)
    }

    #[must_use]
    pub fn apid(&self) -> u16 {
        apid_of(self.scid_apid)
    }
}

/// Spacecraft id slice of a 24-bit scid/apid word: the top 8 bits.
fn scid_of(scid_apid: u32) -> u8 {
    (scid_apid >> 16 & 0xff) as u8
}

/// Apid slice of a 24-bit scid/apid word: the low 11 bits.
fn apid_of(scid_apid: u32) -> u16 {
    (scid_apid & 0x7ff) as u16
}

fn string_field(cursor: &mut BitCursor, octets: usize) -> Result<String> {
    Ok(String::from_utf8_lossy(&cursor.read_bytes(octets)?).into_owned())
}

fn time_field(cursor: &mut BitCursor) -> Result<CdsTime> {
    Ok(CdsTime::new(cursor.read_uint(CdsTime::SIZE * 8)?))
}
