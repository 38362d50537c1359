// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Splitting of Annex B elementary streams into NAL units and access units.

use amfcodec::CodecId;

fn find_start_code(data: &[u8], offset: usize) -> Option<usize> {
    data.get(offset..)?
        .windows(3)
        .position(|window| window == [0x00, 0x00, 0x01])
        .map(|pos| offset + pos)
}

/// A NAL unit of a stream, without its start code.
#[derive(Debug, PartialEq, Eq)]
pub struct Nalu<'a> {
    /// Offset of the start code, including a leading zero byte.
    pub sc_offset: usize,
    /// Header and payload.
    pub data: &'a [u8],
}

/// Iterates over the NAL units of an Annex B stream.
pub struct NaluIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> NaluIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        NaluIter { data, pos: 0 }
    }
}

impl<'a> Iterator for NaluIter<'a> {
    type Item = Nalu<'a>;

    fn next(&mut self) -> Option<Nalu<'a>> {
        let start = find_start_code(self.data, self.pos)?;
        // A preceding zero byte makes it a four byte start code.
        let sc_offset = if start > 0 && self.data[start - 1] == 0 {
            start - 1
        } else {
            start
        };
        let nalu_offset = start + 3;
        let mut end = find_start_code(self.data, nalu_offset).unwrap_or(self.data.len());
        self.pos = end;
        // Discard trailing_zero_8bits.
        while end > nalu_offset && self.data[end - 1] == 0 {
            end -= 1;
        }
        Some(Nalu {
            sc_offset,
            data: &self.data[nalu_offset..end],
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum NaluKind {
    // Slice starting a new picture.
    FirstSlice,
    Slice,
    // Parameter sets, SEI and delimiters, which precede the slices of their access unit.
    Prefix,
    Other,
}

fn classify(codec: CodecId, nalu: &[u8]) -> NaluKind {
    match codec {
        CodecId::H264 => {
            let Some(&header) = nalu.first() else {
                return NaluKind::Other;
            };
            match header & 0x1f {
                1 | 5 => match nalu.get(1) {
                    // first_mb_in_slice is ue(v): a leading 1 bit encodes 0.
                    Some(b) if b & 0x80 != 0 => NaluKind::FirstSlice,
                    _ => NaluKind::Slice,
                },
                6..=9 | 14 | 15 => NaluKind::Prefix,
                _ => NaluKind::Other,
            }
        }
        CodecId::Hevc => {
            let Some(&header) = nalu.first() else {
                return NaluKind::Other;
            };
            match (header >> 1) & 0x3f {
                0..=31 => match nalu.get(2) {
                    // first_slice_segment_in_pic_flag.
                    Some(b) if b & 0x80 != 0 => NaluKind::FirstSlice,
                    _ => NaluKind::Slice,
                },
                32..=35 | 39 => NaluKind::Prefix,
                _ => NaluKind::Other,
            }
        }
        _ => NaluKind::Other,
    }
}

/// Splits an H.264 or HEVC Annex B stream into access units, each one with its start codes.
///
/// Other codecs are returned as a single unit.
pub fn access_units(codec: CodecId, data: &[u8]) -> Vec<&[u8]> {
    if !matches!(codec, CodecId::H264 | CodecId::Hevc) {
        return if data.is_empty() { Vec::new() } else { vec![data] };
    }
    let mut units = Vec::new();
    let mut start: Option<usize> = None;
    let mut has_slice = false;
    for nalu in NaluIter::new(data) {
        let kind = classify(codec, nalu.data);
        let begins_unit = has_slice && matches!(kind, NaluKind::FirstSlice | NaluKind::Prefix);
        if begins_unit {
            if let Some(begin) = start {
                units.push(&data[begin..nalu.sc_offset]);
            }
            start = Some(nalu.sc_offset);
            has_slice = false;
        }
        if start.is_none() {
            start = Some(nalu.sc_offset);
        }
        if matches!(kind, NaluKind::FirstSlice | NaluKind::Slice) {
            has_slice = true;
        }
    }
    if let Some(begin) = start {
        units.push(&data[begin..]);
    }
    units
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPS: &[u8] = &[0x67, 0x42, 0x00, 0x1e];
    const PPS: &[u8] = &[0x68, 0xce, 0x38, 0x80];
    const IDR: &[u8] = &[0x65, 0x88, 0x84, 0x21];
    const P_FIRST: &[u8] = &[0x41, 0x9a, 0x02];
    const P_SECOND: &[u8] = &[0x41, 0x40, 0x21];

    fn stream(nalus: &[&[u8]]) -> Vec<u8> {
        let mut data = Vec::new();
        for (i, nalu) in nalus.iter().enumerate() {
            if i == 0 {
                data.push(0);
            }
            data.extend_from_slice(&[0, 0, 1]);
            data.extend_from_slice(nalu);
        }
        data
    }

    #[test]
    fn nal_units() {
        let mut data = stream(&[SPS, PPS, IDR]);
        data.extend_from_slice(&[0, 0]);
        let nalus: Vec<Nalu> = NaluIter::new(&data).collect();
        assert_eq!(nalus.len(), 3);
        assert_eq!(nalus[0].sc_offset, 0);
        assert_eq!(nalus[0].data, SPS);
        assert_eq!(nalus[1].sc_offset, 8);
        assert_eq!(nalus[1].data, PPS);
        assert_eq!(nalus[2].data, IDR);
        assert!(NaluIter::new(&[0xff, 0xfe]).next().is_none());
    }

    #[test]
    fn h264_access_units() {
        let data = stream(&[SPS, PPS, IDR, P_FIRST, P_SECOND, P_FIRST]);
        let units = access_units(CodecId::H264, &data);
        assert_eq!(units.len(), 3);
        assert_eq!(units.concat(), data);
        assert_eq!(units[0].len(), 1 + 3 * 3 + SPS.len() + PPS.len() + IDR.len());
        assert_eq!(units[1], &stream(&[P_FIRST, P_SECOND])[1..]);
        assert_eq!(units[2], &stream(&[P_FIRST])[1..]);
    }

    #[test]
    fn hevc_access_units() {
        let vps: &[u8] = &[0x40, 0x01, 0x0c];
        let idr: &[u8] = &[0x26, 0x01, 0xaf];
        let trail: &[u8] = &[0x02, 0x01, 0xd0];
        let data = stream(&[vps, idr, trail, trail]);
        let units = access_units(CodecId::Hevc, &data);
        assert_eq!(units.len(), 3);
        assert_eq!(units.concat(), data);
    }

    #[test]
    fn other_codecs_are_not_split() {
        let data = stream(&[SPS, IDR]);
        assert_eq!(access_units(CodecId::Av1, &data), vec![&data[..]]);
        assert!(access_units(CodecId::Av1, &[]).is_empty());
    }
}
