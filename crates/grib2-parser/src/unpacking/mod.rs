//! GRIB2 data unpacking.
//!
//! Simple packing (template 5.0) is decoded here directly. Every other
//! packing scheme is handed to the `grib` crate.

use std::io::Cursor;

use tracing::debug;

use crate::sections::{Bitmap, DataRepresentation};
use crate::Grib2Error;

/// Unpack simple packed GRIB2 data.
///
/// `Y = (R + X * 2^E) / 10^D`. Points masked out by the bitmap come back
/// as NaN.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    repr: &DataRepresentation,
    bitmap: Option<&Bitmap>,
) -> Result<Vec<f32>, Grib2Error> {
    let bitmap = bitmap.filter(|b| b.is_present());
    if let Some(bm) = bitmap {
        if bm.data.len() * 8 < num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "bitmap covers {} points, grid has {}",
                bm.data.len() * 8,
                num_points
            )));
        }
    }

    let bits = repr.bits_per_value as usize;
    let binary_scale = 2.0_f64.powi(repr.binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(repr.decimal_scale_factor as i32));
    let reference = repr.reference_value as f64;

    let mut values = Vec::with_capacity(num_points);
    let mut bit_position = 0;

    for i in 0..num_points {
        if let Some(bm) = bitmap {
            if (bm.data[i / 8] >> (7 - (i % 8))) & 1 == 0 {
                values.push(f32::NAN);
                continue;
            }
        }

        let packed = if bits == 0 {
            0
        } else {
            let v = extract_bits(packed_data, bit_position, bits)
                .map_err(|e| Grib2Error::UnpackingError(format!("Failed to extract bits: {}", e)))?;
            bit_position += bits;
            v
        };

        values.push(((reference + packed as f64 * binary_scale) * decimal_scale) as f32);
    }

    Ok(values)
}

/// Decode any packing the `grib` crate understands. `message` must hold
/// exactly one GRIB2 message.
pub fn unpack_with_grib_crate(message: &[u8]) -> Result<Vec<f32>, Grib2Error> {
    let file = grib::from_reader(Cursor::new(message))
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?;

    let (_, submessage) = file
        .iter()
        .next()
        .ok_or_else(|| Grib2Error::UnpackingError("grib crate found no submessage".to_string()))?;

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?;
    let values: Vec<f32> = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate: {}", e)))?
        .collect();

    debug!(count = values.len(), "Decoded values via grib crate");
    Ok(values)
}

/// Extract bits from a byte array, MSB first.
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }

    let mut result = 0u32;

    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let byte_idx = absolute_bit / 8;
        let bit_idx = 7 - (absolute_bit % 8);

        if byte_idx >= data.len() {
            return Err("Not enough data to extract bits".to_string());
        }

        let bit = (data[byte_idx] >> bit_idx) & 1;
        result = (result << 1) | (bit as u32);
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn repr(bits: u8, reference: f32, e: i16, d: i16) -> DataRepresentation {
        DataRepresentation {
            num_data_points: 0,
            template: 0,
            reference_value: reference,
            binary_scale_factor: e,
            decimal_scale_factor: d,
            bits_per_value: bits,
            original_data_type: 0,
        }
    }

    #[test]
    fn test_extract_bits() {
        let data = vec![0b10110101];
        assert_eq!(extract_bits(&data, 0, 2).unwrap(), 0b10);
        assert_eq!(extract_bits(&data, 2, 2).unwrap(), 0b11);
        assert_eq!(extract_bits(&data, 0, 8).unwrap(), 0b10110101);
        assert!(extract_bits(&data, 4, 8).is_err());
    }

    #[test]
    fn test_simple_unpacking() {
        let values = unpack_simple(&[100, 200], 2, &repr(8, 0.0, 0, 0), None).unwrap();
        assert_eq!(values, vec![100.0, 200.0]);
    }

    #[test]
    fn test_decimal_scale() {
        let values = unpack_simple(&[25], 1, &repr(8, 0.0, 0, 1), None).unwrap();
        assert!((values[0] - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_zero_bits_is_constant_field() {
        let values = unpack_simple(&[], 4, &repr(0, 288.15, 0, 0), None).unwrap();
        assert_eq!(values, vec![288.15; 4]);
    }

    #[test]
    fn test_bitmap_masks_points() {
        let bitmap = Bitmap {
            indicator: 0,
            data: Bytes::from_static(&[0b1010_0000]),
        };
        // Only points 0 and 2 have packed values
        let values = unpack_simple(&[7, 9], 3, &repr(8, 0.0, 0, 0), Some(&bitmap)).unwrap();
        assert_eq!(values[0], 7.0);
        assert!(values[1].is_nan());
        assert_eq!(values[2], 9.0);
    }

    #[test]
    fn test_short_data_is_error() {
        assert!(unpack_simple(&[1], 2, &repr(8, 0.0, 0, 0), None).is_err());
    }
}
