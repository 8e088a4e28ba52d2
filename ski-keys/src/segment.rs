//! Payload segmentation for storage txns
//!
//! Large payloads are split into segments no larger than an operator-configured
//! bound. Each segment records its position and the segment count so it can be
//! checked and reassembled on its own.
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use crate::error::{SkiError, SkiResult};
use crate::framing::{append_var_buf, read_u32, read_var_buf, write_varint};

/// Codec of the payload carried by a set of segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadCodec(pub u32);

impl PayloadCodec {
    pub const UNSPECIFIED: PayloadCodec = PayloadCodec(0);
    pub const BINARY: PayloadCodec = PayloadCodec(1);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnSegInfo {
    pub payload_codec: PayloadCodec,
    pub payload_name: Vec<u8>,
    /// Byte length of this segment's data
    pub payload_size: u32,
    pub segment_num: u32,
    pub total_segments: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnSegment {
    pub info: TxnSegInfo,
    pub seg_data: Vec<u8>,
}

fn check_max_segment_size(max_segment_size: usize) -> SkiResult<u32> {
    if max_segment_size == 0 {
        return Err(SkiError::Configuration(
            "max segment size must be greater than zero".to_string(),
        ));
    }
    u32::try_from(max_segment_size).map_err(|_| {
        SkiError::Configuration(format!(
            "max segment size {} does not fit in 32 bits",
            max_segment_size
        ))
    })
}

/// Chop `data` into segments of at most `max_segment_size` bytes
pub fn segment_into_txns(
    data: &[u8],
    payload_name: &[u8],
    payload_codec: PayloadCodec,
    max_segment_size: usize,
) -> SkiResult<Vec<TxnSegment>> {
    check_max_segment_size(max_segment_size)?;

    let total = data.len().div_ceil(max_segment_size);
    let total_segments = u32::try_from(total).map_err(|_| SkiError::PayloadTooLarge {
        size: data.len() as u64,
        max: u64::from(u32::MAX) * max_segment_size as u64,
    })?;

    let segments = data
        .chunks(max_segment_size)
        .enumerate()
        .map(|(i, chunk)| TxnSegment {
            info: TxnSegInfo {
                payload_codec,
                payload_name: payload_name.to_vec(),
                payload_size: chunk.len() as u32,
                segment_num: i as u32,
                total_segments,
            },
            seg_data: chunk.to_vec(),
        })
        .collect::<Vec<_>>();

    debug_assert_eq!(segments.len(), total);
    Ok(segments)
}

impl TxnSegment {
    pub fn encode(&self) -> SkiResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.seg_data.len() + self.info.payload_name.len() + 32);
        write_varint(&mut buf, u64::from(self.info.payload_codec.0));
        append_var_buf(&mut buf, &self.info.payload_name)?;
        write_varint(&mut buf, u64::from(self.info.payload_size));
        write_varint(&mut buf, u64::from(self.info.segment_num));
        write_varint(&mut buf, u64::from(self.info.total_segments));
        append_var_buf(&mut buf, &self.seg_data)?;
        Ok(buf)
    }

    /// Decode one segment record. A declared or actual data size above
    /// `max_segment_size` is rejected before the data is copied.
    pub fn decode(buf: &[u8], max_segment_size: usize) -> SkiResult<Self> {
        let max = check_max_segment_size(max_segment_size)?;

        let (codec, offset) = read_u32(buf, 0)?;
        let (payload_name, offset) = read_var_buf(buf, offset)?;
        let (payload_size, offset) = read_u32(buf, offset)?;
        if payload_size > max {
            return Err(SkiError::PayloadTooLarge {
                size: u64::from(payload_size),
                max: u64::from(max),
            });
        }
        let (segment_num, offset) = read_u32(buf, offset)?;
        let (total_segments, offset) = read_u32(buf, offset)?;
        if segment_num >= total_segments {
            return Err(SkiError::DecodeFailed(format!(
                "segment {} out of range for {} segments",
                segment_num, total_segments
            )));
        }

        let (seg_data, offset) = read_var_buf(buf, offset)?;
        if seg_data.len() as u64 > u64::from(max) {
            return Err(SkiError::PayloadTooLarge {
                size: seg_data.len() as u64,
                max: u64::from(max),
            });
        }
        if seg_data.len() as u64 != u64::from(payload_size) {
            return Err(SkiError::DecodeFailed(format!(
                "segment declares {} bytes but carries {}",
                payload_size,
                seg_data.len()
            )));
        }
        if offset != buf.len() {
            return Err(SkiError::DecodeFailed("trailing bytes after segment".to_string()));
        }

        Ok(Self {
            info: TxnSegInfo {
                payload_codec: PayloadCodec(codec),
                payload_name: payload_name.to_vec(),
                payload_size,
                segment_num,
                total_segments,
            },
            seg_data: seg_data.to_vec(),
        })
    }
}

/// Reassemble segments (in any order) into the original payload
pub fn assemble_segments(mut segments: Vec<TxnSegment>, max_segment_size: usize) -> SkiResult<Vec<u8>> {
    let max = check_max_segment_size(max_segment_size)?;
    let Some(first) = segments.first() else {
        return Ok(Vec::new());
    };

    let total = first.info.total_segments;
    let codec = first.info.payload_codec;
    let name = first.info.payload_name.clone();

    if segments.len() as u64 != u64::from(total) {
        return Err(SkiError::DecodeFailed(format!(
            "expected {} segments, got {}",
            total,
            segments.len()
        )));
    }

    segments.sort_by_key(|seg| seg.info.segment_num);

    let mut payload = Vec::with_capacity(segments.iter().map(|seg| seg.seg_data.len()).sum());
    for (i, seg) in segments.iter().enumerate() {
        if seg.info.segment_num as usize != i {
            return Err(SkiError::DecodeFailed(format!(
                "missing or duplicate segment {}",
                i
            )));
        }
        if seg.info.total_segments != total || seg.info.payload_codec != codec || seg.info.payload_name != name {
            return Err(SkiError::DecodeFailed(format!(
                "segment {} does not belong to payload",
                i
            )));
        }
        if seg.seg_data.len() as u64 > u64::from(max) {
            return Err(SkiError::PayloadTooLarge {
                size: seg.seg_data.len() as u64,
                max: u64::from(max),
            });
        }
        payload.extend_from_slice(&seg.seg_data);
    }

    Ok(payload)
}
