//! e2store-framed era files for cold history.
//!
//! An era file is a sequence of framed entries:
//! `type (2B) || length (4B LE) || reserved (2B zero) || payload`.
//! One era covers `SLOTS_PER_HISTORICAL_ROOT` slots. The genesis era (era 0)
//! carries only the genesis state; later eras carry the era-boundary state,
//! the era's blocks, and a `SlotIndex` of byte offsets so a reader can seek
//! straight to a slot. Block and state payloads are snappy-framed.

use crate::Error;
use snap::{read::FrameDecoder, write::FrameEncoder};
use std::io::{Read, Write};
use types::{Hash256, Slot};

pub const VERSION_TYPE: [u8; 2] = [0x65, 0x32];
pub const COMPRESSED_SIGNED_BEACON_BLOCK_TYPE: [u8; 2] = [0x01, 0x00];
pub const COMPRESSED_BEACON_STATE_TYPE: [u8; 2] = [0x02, 0x00];
pub const SLOT_INDEX_TYPE: [u8; 2] = [0x69, 0x32];

const HEADER_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct E2StoreEntry {
    pub entry_type: [u8; 2],
    pub data: Vec<u8>,
}

/// Append one framed entry to `out`.
pub fn write_entry(out: &mut Vec<u8>, entry_type: [u8; 2], data: &[u8]) {
    out.extend_from_slice(&entry_type);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(data);
}

/// Read the entry starting at `offset`; returns the entry and the offset of
/// the next one.
pub fn read_entry(bytes: &[u8], offset: usize) -> Result<(E2StoreEntry, usize), Error> {
    let header = bytes
        .get(offset..offset + HEADER_LEN)
        .ok_or_else(|| Error::InvalidEraFile("truncated entry header".to_string()))?;
    let entry_type = [header[0], header[1]];
    let length = u32::from_le_bytes(header[2..6].try_into().expect("sliced 4 bytes")) as usize;
    if header[6] != 0 || header[7] != 0 {
        return Err(Error::InvalidEraFile("non-zero reserved bytes".to_string()));
    }
    let data_start = offset + HEADER_LEN;
    let data = bytes
        .get(data_start..data_start + length)
        .ok_or_else(|| Error::InvalidEraFile("truncated entry payload".to_string()))?;
    Ok((
        E2StoreEntry {
            entry_type,
            data: data.to_vec(),
        },
        data_start + length,
    ))
}

pub fn compress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = FrameEncoder::new(Vec::new());
    encoder.write_all(data)?;
    encoder
        .into_inner()
        .map_err(|e| Error::CompressionError(e.to_string()))
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut decoder = FrameDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// A `SlotIndex` payload: `start_slot (8B LE) || offsets (8B LE each) ||
/// count (8B LE)`. Offsets are byte positions of entries in the file; zero
/// means "no entry for this slot".
#[derive(Debug, Clone, PartialEq)]
pub struct SlotIndex {
    pub start_slot: Slot,
    pub offsets: Vec<u64>,
}

impl SlotIndex {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 * (self.offsets.len() + 2));
        out.extend_from_slice(&self.start_slot.as_u64().to_le_bytes());
        for offset in &self.offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend_from_slice(&(self.offsets.len() as u64).to_le_bytes());
        out
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, Error> {
        if data.len() < 16 || data.len() % 8 != 0 {
            return Err(Error::InvalidEraFile("malformed slot index".to_string()));
        }
        let count = u64::from_le_bytes(
            data[data.len() - 8..].try_into().expect("sliced 8 bytes"),
        ) as usize;
        let expected_len = 8 * (count + 2);
        if data.len() != expected_len {
            return Err(Error::InvalidEraFile(format!(
                "slot index length {} does not match count {}",
                data.len(),
                count
            )));
        }
        let start_slot = Slot::new(u64::from_le_bytes(
            data[..8].try_into().expect("sliced 8 bytes"),
        ));
        let offsets = data[8..8 + 8 * count]
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().expect("chunked 8 bytes")))
            .collect();
        Ok(Self { start_slot, offsets })
    }
}

/// `<config>-<era5>-<historical_root_4B_hex>.era`
pub fn era_file_name(config_name: &str, era: u64, historical_root: Hash256) -> String {
    format!(
        "{config_name}-{era:05}-{}.era",
        hex::encode(&historical_root.as_slice()[..4])
    )
}

/// An era file under construction.
#[derive(Debug, Default)]
pub struct EraWriter {
    bytes: Vec<u8>,
    block_offsets: Vec<u64>,
    start_slot: Slot,
}

impl EraWriter {
    /// Begin an era covering `slots_per_historical_root` slots starting at
    /// `start_slot`.
    pub fn new(start_slot: Slot, slots_per_historical_root: usize) -> Self {
        let mut writer = EraWriter {
            bytes: Vec::new(),
            block_offsets: vec![0; slots_per_historical_root],
            start_slot,
        };
        write_entry(&mut writer.bytes, VERSION_TYPE, &[]);
        writer
    }

    /// Append the block for `slot` (must be within the era).
    pub fn write_block(&mut self, slot: Slot, block_ssz: &[u8]) -> Result<(), Error> {
        let position = slot
            .as_u64()
            .checked_sub(self.start_slot.as_u64())
            .filter(|position| (*position as usize) < self.block_offsets.len())
            .ok_or_else(|| Error::InvalidEraFile(format!("slot {slot} outside era")))?;
        self.block_offsets[position as usize] = self.bytes.len() as u64;
        let compressed = compress(block_ssz)?;
        write_entry(
            &mut self.bytes,
            COMPRESSED_SIGNED_BEACON_BLOCK_TYPE,
            &compressed,
        );
        Ok(())
    }

    /// Append the era-boundary state and both indices, returning the file
    /// bytes. Genesis eras (no blocks) omit the block index.
    pub fn finish(mut self, state_ssz: &[u8]) -> Result<Vec<u8>, Error> {
        let state_offset = self.bytes.len() as u64;
        let compressed = compress(state_ssz)?;
        write_entry(&mut self.bytes, COMPRESSED_BEACON_STATE_TYPE, &compressed);

        let era_len = self.block_offsets.len() as u64;
        let has_blocks = self.block_offsets.iter().any(|offset| *offset != 0);
        if has_blocks {
            let block_index = SlotIndex {
                start_slot: self.start_slot,
                offsets: std::mem::take(&mut self.block_offsets),
            };
            write_entry(&mut self.bytes, SLOT_INDEX_TYPE, &block_index.serialize());
        }

        let state_index = SlotIndex {
            start_slot: self.start_slot + era_len,
            offsets: vec![state_offset],
        };
        write_entry(&mut self.bytes, SLOT_INDEX_TYPE, &state_index.serialize());

        Ok(self.bytes)
    }
}

/// A parsed era file.
#[derive(Debug)]
pub struct EraReader {
    pub entries: Vec<(u64, E2StoreEntry)>,
}

impl EraReader {
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let mut entries = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (entry, next) = read_entry(bytes, offset)?;
            entries.push((offset as u64, entry));
            offset = next;
        }
        let Some((_, first)) = entries.first() else {
            return Err(Error::InvalidEraFile("empty era file".to_string()));
        };
        if first.entry_type != VERSION_TYPE {
            return Err(Error::InvalidEraFile("missing version frame".to_string()));
        }
        Ok(Self { entries })
    }

    /// The decompressed block SSZ for `slot`, if the era holds one.
    pub fn block_at_slot(&self, slot: Slot) -> Result<Option<Vec<u8>>, Error> {
        let Some(index) = self.block_slot_index()? else {
            return Ok(None);
        };
        let position = match slot.as_u64().checked_sub(index.start_slot.as_u64()) {
            Some(position) if (position as usize) < index.offsets.len() => position as usize,
            _ => return Ok(None),
        };
        let offset = index.offsets[position];
        if offset == 0 {
            return Ok(None);
        }
        let entry = self
            .entries
            .iter()
            .find(|(entry_offset, _)| *entry_offset == offset)
            .map(|(_, entry)| entry)
            .ok_or_else(|| Error::InvalidEraFile("dangling slot-index offset".to_string()))?;
        decompress(&entry.data).map(Some)
    }

    /// The decompressed era-boundary state SSZ.
    pub fn state(&self) -> Result<Vec<u8>, Error> {
        let entry = self
            .entries
            .iter()
            .map(|(_, entry)| entry)
            .find(|entry| entry.entry_type == COMPRESSED_BEACON_STATE_TYPE)
            .ok_or_else(|| Error::InvalidEraFile("missing state frame".to_string()))?;
        decompress(&entry.data)
    }

    /// The block `SlotIndex`, absent for the genesis era.
    fn block_slot_index(&self) -> Result<Option<SlotIndex>, Error> {
        let mut indices = self
            .entries
            .iter()
            .map(|(_, entry)| entry)
            .filter(|entry| entry.entry_type == SLOT_INDEX_TYPE)
            .collect::<Vec<_>>();
        match indices.len() {
            // Genesis era: only the state index.
            1 => Ok(None),
            2 => SlotIndex::deserialize(&indices.remove(0).data).map(Some),
            n => Err(Error::InvalidEraFile(format!(
                "expected 1 or 2 slot indices, found {n}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::FixedBytesExtended;

    #[test]
    fn frame_round_trip() {
        let mut bytes = Vec::new();
        write_entry(&mut bytes, VERSION_TYPE, &[]);
        write_entry(&mut bytes, COMPRESSED_BEACON_STATE_TYPE, b"hello");

        let (version, next) = read_entry(&bytes, 0).unwrap();
        assert_eq!(version.entry_type, VERSION_TYPE);
        assert!(version.data.is_empty());

        let (state, end) = read_entry(&bytes, next).unwrap();
        assert_eq!(state.data, b"hello");
        assert_eq!(end, bytes.len());
    }

    #[test]
    fn compression_round_trip() {
        let data = vec![42u8; 4096];
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn era_with_blocks_round_trips() {
        let mut writer = EraWriter::new(Slot::new(16), 8);
        writer.write_block(Slot::new(17), b"block-17").unwrap();
        writer.write_block(Slot::new(20), b"block-20").unwrap();
        let bytes = writer.finish(b"state-24").unwrap();

        let reader = EraReader::parse(&bytes).unwrap();
        assert_eq!(reader.state().unwrap(), b"state-24");
        assert_eq!(
            reader.block_at_slot(Slot::new(17)).unwrap(),
            Some(b"block-17".to_vec())
        );
        assert_eq!(
            reader.block_at_slot(Slot::new(20)).unwrap(),
            Some(b"block-20".to_vec())
        );
        // Skip slot inside the era.
        assert_eq!(reader.block_at_slot(Slot::new(18)).unwrap(), None);
        // Slot outside the era.
        assert_eq!(reader.block_at_slot(Slot::new(99)).unwrap(), None);
    }

    #[test]
    fn genesis_era_carries_only_state() {
        let writer = EraWriter::new(Slot::new(0), 8);
        let bytes = writer.finish(b"genesis-state").unwrap();
        let reader = EraReader::parse(&bytes).unwrap();
        assert_eq!(reader.state().unwrap(), b"genesis-state");
        assert_eq!(reader.block_at_slot(Slot::new(0)).unwrap(), None);
    }

    #[test]
    fn malformed_files_are_rejected() {
        assert!(EraReader::parse(&[]).is_err());
        // Valid frames but no leading version.
        let mut bytes = Vec::new();
        write_entry(&mut bytes, COMPRESSED_BEACON_STATE_TYPE, b"x");
        assert!(EraReader::parse(&bytes).is_err());
        // Truncated payload.
        let mut bytes = Vec::new();
        write_entry(&mut bytes, VERSION_TYPE, &[]);
        write_entry(&mut bytes, COMPRESSED_BEACON_STATE_TYPE, b"hello");
        bytes.truncate(bytes.len() - 2);
        assert!(EraReader::parse(&bytes).is_err());
    }

    #[test]
    fn file_naming() {
        let root = Hash256::from_low_u64_be(0xaabbccdd);
        // from_low_u64_be puts the value at the end; the first four bytes are
        // zero for this root.
        assert_eq!(era_file_name("mainnet", 7, root), "mainnet-00007-00000000.era");
    }
}
