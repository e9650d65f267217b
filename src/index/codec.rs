//! Flat byte layout shared by both index variants
//!
//! Layout (all integers little-endian):
//! - Bit width: u8 (1 byte)
//! - Offset table length N: u32 (4 bytes), always `4 * (planes + 1)`
//! - Offsets: `planes + 1` cumulative u32 boundaries into the payload
//! - Payload: each plane's bitmap in the portable roaring format, in plane order
//!
//! The stream carries no variant tag. The plane count is derived from the bit
//! width and the variant of the index doing the reading, so a signed blob fed to
//! an unsigned index (or the reverse) fails the table length check.

use bytes::{Buf, BufMut};

use super::{plane_count, Slices, MAX_BIT_WIDTH};
use crate::types::Bitmap;
use crate::{Error, Result};

const HEADER_LEN: usize = 1 + 4;
const OFFSET_LEN: usize = 4;

pub(crate) fn encode(slices: &Slices) -> Result<Vec<u8>> {
    let planes = slices.planes();

    let mut payload = Vec::new();
    let mut offsets = Vec::with_capacity(planes.len() + 1);
    offsets.push(0u32);
    for plane in planes {
        plane.serialize_into(&mut payload)?;
        let end = u32::try_from(payload.len())
            .map_err(|_| Error::internal("serialized index exceeds 4 GiB"))?;
        offsets.push(end);
    }

    let table_len = offsets.len() * OFFSET_LEN;
    let mut buf = Vec::with_capacity(HEADER_LEN + table_len + payload.len());
    buf.put_u8(slices.bit_width());
    buf.put_u32_le(table_len as u32);
    for offset in offsets {
        buf.put_u32_le(offset);
    }
    buf.put_slice(&payload);

    Ok(buf)
}

pub(crate) fn decode(buf: &[u8], signed: bool) -> Result<Slices> {
    let mut cursor = buf;
    if cursor.remaining() < HEADER_LEN {
        return Err(Error::decode(format!(
            "buffer of {} bytes is shorter than the {} byte header",
            buf.len(),
            HEADER_LEN
        )));
    }

    let bit_width = cursor.get_u8();
    if bit_width > MAX_BIT_WIDTH {
        return Err(Error::decode(format!("bit width {} exceeds 64", bit_width)));
    }

    let planes = plane_count(bit_width, signed);
    let table_len = cursor.get_u32_le() as usize;
    let expected = (planes + 1) * OFFSET_LEN;
    if table_len != expected {
        return Err(Error::decode(format!(
            "offset table of {} bytes does not match {} planes for bit width {}",
            table_len, planes, bit_width
        )));
    }
    if cursor.remaining() < table_len {
        return Err(Error::decode(format!(
            "offset table truncated: need {} bytes, have {}",
            table_len,
            cursor.remaining()
        )));
    }

    let offsets: Vec<usize> = (0..=planes)
        .map(|_| cursor.get_u32_le() as usize)
        .collect();
    let payload = cursor;

    if offsets[0] != 0 {
        return Err(Error::decode(format!(
            "first plane offset is {}, expected 0",
            offsets[0]
        )));
    }
    if offsets[planes] != payload.len() {
        return Err(Error::decode(format!(
            "offset table ends at {} but payload holds {} bytes",
            offsets[planes],
            payload.len()
        )));
    }

    let mut decoded = Vec::with_capacity(planes);
    for (index, window) in offsets.windows(2).enumerate() {
        let (start, end) = (window[0], window[1]);
        if start > end || end > payload.len() {
            return Err(Error::decode(format!(
                "plane {} spans {}..{} outside a {} byte payload",
                index,
                start,
                end,
                payload.len()
            )));
        }
        let bytes = &payload[start..end];
        let plane = Bitmap::deserialize_from(bytes).map_err(|e| {
            Error::decode(format!(
                "plane {} ({} bytes) is not a valid bitmap: {}",
                index,
                bytes.len(),
                e
            ))
        })?;
        if plane.serialized_size() != bytes.len() {
            return Err(Error::decode(format!(
                "plane {} has {} trailing bytes",
                index,
                bytes.len().saturating_sub(plane.serialized_size())
            )));
        }
        decoded.push(plane);
    }

    tracing::debug!(
        bit_width,
        planes,
        bytes = buf.len(),
        signed,
        "Decoded bit-sliced index"
    );

    Ok(Slices::from_planes(bit_width, signed, decoded))
}
