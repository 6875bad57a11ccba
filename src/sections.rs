//! Section 0/1/2/3/5 parsing: the envelope around the Section 4 payload
//! that [`crate::walker`] and [`crate::extract`] decode. See spec.md §6.

use crate::bitbuffer::BitBuffer;
use crate::descriptor::Descriptor;
use crate::error::{DecodeError, DecodeErrorKind, UnsupportedFeatureKind};

/// Section 0: magic, declared total message length, and edition.
#[derive(Debug, Clone, Copy)]
pub struct Section0 {
    /// Declared total length of the message, in bytes, magic through `"7777"`.
    pub total_length: u32,
    /// BUFR edition; only 3 and 4 are supported.
    pub edition: u8,
}

/// Parse the 8-byte Section 0.
pub fn parse_section0(bytes: &[u8]) -> Result<Section0, DecodeError> {
    if bytes.len() < 8 || &bytes[0..4] != b"BUFR" {
        return Err(DecodeError::at("section0", DecodeErrorKind::BadMagic));
    }
    let bits = BitBuffer::new(bytes);
    let total_length = bits.read_u("section0", 32, 24)? as u32;
    let edition = bits.read_u("section0", 56, 8)? as u8;
    if edition != 3 && edition != 4 {
        return Err(DecodeError::at("section0", DecodeErrorKind::UnsupportedEdition(edition)));
    }
    Ok(Section0 { total_length, edition })
}

/// A BUFR Section 1 date/time, always given in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufrDateTime {
    /// Full (four-digit) year.
    pub year: u16,
    /// Month, 1-12.
    pub month: u8,
    /// Day of month, 1-31.
    pub day: u8,
    /// Hour, 0-23.
    pub hour: u8,
    /// Minute, 0-59.
    pub minute: u8,
    /// Second, 0-59. Always `0` for edition 3, which has no seconds field.
    pub second: u8,
}

/// Section 1 metadata, normalised across editions 3 and 4.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufrMetadata {
    /// Declared total message length in bytes, from Section 0.
    pub size: u32,
    /// BUFR edition this message was parsed as.
    pub edition: u8,
    /// Master table number (normally `0`, WMO).
    pub master_table: u8,
    /// Originating centre.
    pub centre: u16,
    /// Originating sub-centre.
    pub sub_centre: u16,
    /// Update sequence number; `0` for an original message.
    pub update_sequence: u8,
    /// Whether an optional Section 2 follows.
    pub sect2_present: bool,
    /// Data category (Table A).
    pub data_category: u8,
    /// International data subcategory.
    pub international_sub_category: u8,
    /// Local data subcategory; edition 4 only.
    pub local_sub_category: Option<u8>,
    /// Master table version.
    pub master_version: u8,
    /// Local table version.
    pub local_version: u8,
    /// Message date and time.
    pub datetime: BufrDateTime,
}

/// WMO FM 94 edition 3 encodes a two-digit "year of century"; this mirrors
/// the common originating-centre convention of treating it as an offset
/// from 2000 rather than reintroducing the 1900 pivot.
fn year_of_century_to_full(yy: u64) -> u16 {
    2000 + yy as u16
}

/// Parse Section 1 given its own bytes (starting at its length field), the
/// edition determined from Section 0, and the message's declared total
/// size (also from Section 0).
pub fn parse_section1(section1: &[u8], edition: u8, size: u32) -> Result<BufrMetadata, DecodeError> {
    let bits = BitBuffer::new(section1);
    let master_table = bits.read_u("section1", 24, 8)? as u8;
    match edition {
        3 => {
            let sub_centre = bits.read_u("section1", 32, 8)?;
            let centre = bits.read_u("section1", 40, 8)?;
            let update_sequence = bits.read_u("section1", 48, 8)? as u8;
            let optional_flag = bits.read_u("section1", 56, 8)?;
            let data_category = bits.read_u("section1", 64, 8)? as u8;
            let data_subcategory = bits.read_u("section1", 72, 8)? as u8;
            let master_table_version = bits.read_u("section1", 80, 8)? as u8;
            let local_table_version = bits.read_u("section1", 88, 8)? as u8;
            let year_of_century = bits.read_u("section1", 96, 8)?;
            let month = bits.read_u("section1", 104, 8)? as u8;
            let day = bits.read_u("section1", 112, 8)? as u8;
            let hour = bits.read_u("section1", 120, 8)? as u8;
            let minute = bits.read_u("section1", 128, 8)? as u8;
            Ok(BufrMetadata {
                size,
                edition,
                master_table,
                centre: centre as u16,
                sub_centre: sub_centre as u16,
                update_sequence,
                sect2_present: optional_flag & 0b1000_0000 != 0,
                data_category,
                international_sub_category: data_subcategory,
                local_sub_category: None,
                master_version: master_table_version,
                local_version: local_table_version,
                datetime: BufrDateTime {
                    year: year_of_century_to_full(year_of_century),
                    month,
                    day,
                    hour,
                    minute,
                    second: 0,
                },
            })
        }
        4 => {
            let centre = bits.read_u("section1", 32, 16)?;
            let sub_centre = bits.read_u("section1", 48, 16)?;
            let update_sequence = bits.read_u("section1", 64, 8)? as u8;
            let optional_flag = bits.read_u("section1", 72, 8)?;
            let data_category = bits.read_u("section1", 80, 8)? as u8;
            let data_subcategory = bits.read_u("section1", 88, 8)? as u8;
            let local_subcategory = bits.read_u("section1", 96, 8)? as u8;
            let master_table_version = bits.read_u("section1", 104, 8)? as u8;
            let local_table_version = bits.read_u("section1", 112, 8)? as u8;
            let year = bits.read_u("section1", 120, 16)? as u16;
            let month = bits.read_u("section1", 136, 8)? as u8;
            let day = bits.read_u("section1", 144, 8)? as u8;
            let hour = bits.read_u("section1", 152, 8)? as u8;
            let minute = bits.read_u("section1", 160, 8)? as u8;
            let second = bits.read_u("section1", 168, 8)? as u8;
            Ok(BufrMetadata {
                size,
                edition,
                master_table,
                centre: centre as u16,
                sub_centre: sub_centre as u16,
                update_sequence,
                sect2_present: optional_flag & 0b1000_0000 != 0,
                data_category,
                international_sub_category: data_subcategory,
                local_sub_category: Some(local_subcategory),
                master_version: master_table_version,
                local_version: local_table_version,
                datetime: BufrDateTime { year, month, day, hour, minute, second },
            })
        }
        other => Err(DecodeError::at("section1", DecodeErrorKind::UnsupportedEdition(other))),
    }
}

/// Section 3 framing: subset count and the observed/compressed flags.
#[derive(Debug, Clone, Copy)]
pub struct Section3Header {
    /// Number of data subsets described by Section 4.
    pub n_subsets: u16,
    /// Whether the data is observed (vs. other) data.
    pub observed: bool,
    /// Whether Section 4 uses BUFR compression.
    pub compressed: bool,
}

/// Parse Section 3: its header plus the descriptor list, expanding nothing.
/// Rejects compressed or multi-subset messages, which this core does not
/// decode (spec.md §1 Non-goals).
pub fn parse_section3(section3: &[u8]) -> Result<(Section3Header, Vec<Descriptor>), DecodeError> {
    let bits = BitBuffer::new(section3);
    let length = bits.read_u("section3", 0, 24)? as u64;
    let n_subsets = bits.read_u("section3", 32, 16)? as u16;
    let flags = bits.read_u("section3", 48, 8)?;
    let observed = flags & 0b1000_0000 != 0;
    let compressed = flags & 0b0100_0000 != 0;
    if compressed {
        return Err(DecodeError::at("section3", UnsupportedFeatureKind::CompressedSection4));
    }
    if n_subsets != 1 {
        return Err(DecodeError::at("section3", UnsupportedFeatureKind::MultiSubset));
    }

    let mut descriptors = Vec::new();
    let mut offset = 56u64;
    let data_end = length * 8;
    while offset + 16 <= data_end {
        let word = bits.read_u("section3", offset, 16)? as u16;
        descriptors.push(Descriptor::from_word(word));
        offset += 16;
    }
    Ok((Section3Header { n_subsets, observed, compressed }, descriptors))
}

/// Validate that Section 4's own byte count matches its declared length,
/// returning the exact subslice the structural walker should read from
/// (its 4-byte header followed by data, cursor starting at bit 32).
pub fn parse_section4(section4: &[u8]) -> Result<&[u8], DecodeError> {
    let bits = BitBuffer::new(section4);
    let length = bits.read_u("section4", 0, 24)? as usize;
    if section4.len() < length {
        return Err(DecodeError::at_bit(
            "section4",
            0,
            DecodeErrorKind::Truncated { offset: 0, width: (length * 8) as u32, total: (section4.len() * 8) as u64 },
        ));
    }
    Ok(&section4[..length])
}

/// Validate the Section 5 end marker.
pub fn verify_section5(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.len() < 4 || &bytes[0..4] != b"7777" {
        return Err(DecodeError::at("section5", DecodeErrorKind::BadMagic));
    }
    Ok(())
}

/// The message split into its constituent section byte ranges.
pub struct Sections<'a> {
    /// Section 0 bytes (always 8).
    pub section0: &'a [u8],
    /// Section 1 bytes, length-prefixed.
    pub section1: &'a [u8],
    /// Section 2 bytes, if present.
    pub section2: Option<&'a [u8]>,
    /// Section 3 bytes, length-prefixed.
    pub section3: &'a [u8],
    /// Section 4 bytes, length-prefixed.
    pub section4: &'a [u8],
    /// Section 5 bytes (always 4, `"7777"`).
    pub section5: &'a [u8],
}

/// Locate every section's byte range within a single (already decompressed)
/// BUFR message. The `"BUFR"` sentinel may appear at a non-zero offset (some
/// distributors prepend a transport wrapper), so it is located by search
/// rather than assumed to start the buffer.
pub fn split_sections(message: &[u8]) -> Result<Sections<'_>, DecodeError> {
    let start = find_magic(message).ok_or_else(|| DecodeError::at("section0", DecodeErrorKind::BadMagic))?;
    let message = &message[start..];
    let section0_bytes = message
        .get(0..8)
        .ok_or_else(|| DecodeError::at("section0", DecodeErrorKind::BadMagic))?;
    let header = parse_section0(section0_bytes)?;
    let mut offset = 8usize;

    let section1_len = section_length(message, offset, "section1")?;
    let section1_bytes = slice_at(message, offset, section1_len, "section1")?;
    let has_section2 = match header.edition {
        3 => section1_bytes.get(6).copied(),
        _ => section1_bytes.get(8).copied(),
    }
    .map(|flags| flags & 0b1000_0000 != 0)
    .unwrap_or(false);
    offset += section1_len;

    let section2_bytes = if has_section2 {
        let len = section_length(message, offset, "section2")?;
        let s = slice_at(message, offset, len, "section2")?;
        offset += len;
        Some(s)
    } else {
        None
    };

    let section3_len = section_length(message, offset, "section3")?;
    let section3_bytes = slice_at(message, offset, section3_len, "section3")?;
    offset += section3_len;

    let section4_len = section_length(message, offset, "section4")?;
    let section4_bytes = slice_at(message, offset, section4_len, "section4")?;
    offset += section4_len;

    let section5_bytes = slice_at(message, offset, 4, "section5")?;

    Ok(Sections {
        section0: section0_bytes,
        section1: section1_bytes,
        section2: section2_bytes,
        section3: section3_bytes,
        section4: section4_bytes,
        section5: section5_bytes,
    })
}

/// Find the byte offset of the `"BUFR"` sentinel, searching from the start
/// of the buffer rather than assuming it begins there.
fn find_magic(message: &[u8]) -> Option<usize> {
    message.windows(4).position(|w| w == b"BUFR")
}

fn section_length(message: &[u8], offset: usize, section: &'static str) -> Result<usize, DecodeError> {
    let header = slice_at(message, offset, 3, section)?;
    Ok(((header[0] as usize) << 16) | ((header[1] as usize) << 8) | header[2] as usize)
}

fn slice_at<'a>(message: &'a [u8], offset: usize, len: usize, section: &'static str) -> Result<&'a [u8], DecodeError> {
    message.get(offset..offset + len).ok_or_else(|| {
        DecodeError::at_bit(
            section,
            offset as u64 * 8,
            DecodeErrorKind::Truncated { offset: offset as u64 * 8, width: (len * 8) as u32, total: message.len() as u64 * 8 },
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_edition4_message(descriptors: &[u16], data: &[u8]) -> Vec<u8> {
        let mut msg = Vec::new();
        msg.extend_from_slice(b"BUFR");
        msg.extend_from_slice(&[0, 0, 0]); // total length, patched below
        msg.push(4); // edition

        let mut section1 = vec![0u8; 22];
        section1[3] = 0; // master table
        section1[4..6].copy_from_slice(&1u16.to_be_bytes()); // centre
        section1[6..8].copy_from_slice(&0u16.to_be_bytes()); // sub-centre
        section1[8] = 0; // update sequence
        section1[9] = 0; // optional section flag, no section 2
        section1[10] = 6; // data category
        section1[11] = 0; // subcategory
        section1[12] = 0; // local subcategory
        section1[13] = 24; // master table version
        section1[14] = 0; // local table version
        section1[15..17].copy_from_slice(&2024u16.to_be_bytes());
        section1[17] = 1; // month
        section1[18] = 1; // day
        section1[19] = 0; // hour
        section1[20] = 0; // minute
        section1[21] = 0; // second
        let len1 = section1.len() as u32;
        section1[0..3].copy_from_slice(&len1.to_be_bytes()[1..4]);
        msg.extend_from_slice(&section1);

        let mut section3 = vec![0u8; 8 + descriptors.len() * 2];
        section3[3] = 0; // reserved
        section3[4..6].copy_from_slice(&1u16.to_be_bytes()); // n_subsets
        section3[6] = 0b1000_0000; // observed, not compressed
        for (i, d) in descriptors.iter().enumerate() {
            section3[8 + i * 2..10 + i * 2].copy_from_slice(&d.to_be_bytes());
        }
        let len3 = section3.len() as u32;
        section3[0..3].copy_from_slice(&len3.to_be_bytes()[1..4]);
        msg.extend_from_slice(&section3);

        let mut section4 = vec![0u8; 4 + data.len()];
        section4[3] = 0; // reserved
        section4[4..].copy_from_slice(data);
        let len4 = section4.len() as u32;
        section4[0..3].copy_from_slice(&len4.to_be_bytes()[1..4]);
        msg.extend_from_slice(&section4);

        msg.extend_from_slice(b"7777");

        let total: u32 = msg.len() as u32;
        msg[4..7].copy_from_slice(&total.to_be_bytes()[1..4]);
        msg
    }

    #[test]
    fn parses_section0_magic_and_edition() {
        let msg = sample_edition4_message(&[0x0401], &[0x00]);
        let header = parse_section0(&msg[0..8]).unwrap();
        assert_eq!(header.edition, 4);
    }

    #[test]
    fn rejects_bad_magic() {
        let err = parse_section0(&[0u8; 8]).unwrap_err();
        assert!(matches!(err.kind, DecodeErrorKind::BadMagic));
    }

    #[test]
    fn splits_and_parses_a_full_message() {
        let msg = sample_edition4_message(&[0x0401], &[0x2a]);
        let section0 = parse_section0(&msg[0..8]).unwrap();
        let sections = split_sections(&msg).unwrap();
        assert!(sections.section2.is_none());
        let metadata = parse_section1(sections.section1, section0.edition, section0.total_length).unwrap();
        assert_eq!(metadata.centre, 1);
        assert_eq!(metadata.size, msg.len() as u32);
        assert_eq!(metadata.datetime.year, 2024);
        let (section3_header, descriptors) = parse_section3(sections.section3).unwrap();
        assert_eq!(section3_header.n_subsets, 1);
        assert_eq!(descriptors, vec![Descriptor::from_word(0x0401)]);
        verify_section5(sections.section5).unwrap();
    }

    #[test]
    fn locates_the_magic_past_a_leading_wrapper() {
        let msg = sample_edition4_message(&[0x0401], &[0x2a]);
        let mut wrapped = vec![0xde, 0xad, 0xbe, 0xef, 0x00];
        wrapped.extend_from_slice(&msg);
        let sections = split_sections(&wrapped).unwrap();
        let section0 = parse_section0(sections.section0).unwrap();
        assert_eq!(section0.edition, 4);
        let (section3_header, descriptors) = parse_section3(sections.section3).unwrap();
        assert_eq!(section3_header.n_subsets, 1);
        assert_eq!(descriptors, vec![Descriptor::from_word(0x0401)]);
        verify_section5(sections.section5).unwrap();
    }

    #[test]
    fn rejects_compressed_section3() {
        let msg = sample_edition4_message(&[0x0401], &[0x2a]);
        let sections = split_sections(&msg).unwrap();
        let mut section3 = sections.section3.to_vec();
        section3[6] |= 0b0100_0000; // flip the compression bit
        let err = parse_section3(&section3).unwrap_err();
        assert!(matches!(
            err.kind,
            DecodeErrorKind::UnsupportedFeature(UnsupportedFeatureKind::CompressedSection4)
        ));
    }
}
