//! Interval-to-reading decoder.
//!
//! A full buffer holds the two echoes of the request pulse, the three-edge
//! acknowledgment, 40 bit pairs and the trailing release. Each bit pair is a
//! fixed-length bit-start low followed by a high period whose length carries
//! the value. Bits arrive MSB first: two humidity bytes, two temperature bytes
//! (bit 15 is the sign, the rest is the magnitude) and a checksum byte.

use core::fmt;

use crate::TimestampMicros;
use crate::cycle::EdgeTimingBuffer;
use crate::protocol::{
    BIT_ONE_US, BIT_START_US, BIT_THRESHOLD_US, BIT_ZERO_US, BITS_PER_BYTE, DATA_BITS,
    EXPECTED_EDGE_COUNT, FRAME_BYTES, PREAMBLE_EDGE_COUNT, RESPONSE_DELAY_US, RESPONSE_HIGH_US,
    RESPONSE_LOW_US,
};
use crate::protocol::trigger::{TRIGGER_ASSERT, TRIGGER_SETTLE};

const SIGN_BIT: u16 = 0x8000;
const MAGNITUDE_MASK: u16 = 0x7FFF;

/// Reasons a captured buffer could not be turned into a reading.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DecodeError {
    /// Fewer intervals than a complete cycle produces.
    IncompleteCapture { captured: usize },
    /// Trailing checksum byte did not match the payload.
    ChecksumMismatch { expected: u8, received: u8 },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::IncompleteCapture { captured } => write!(
                f,
                "incomplete capture ({captured} of {EXPECTED_EDGE_COUNT} edges)"
            ),
            DecodeError::ChecksumMismatch { expected, received } => write!(
                f,
                "checksum mismatch (expected {expected:#04x}, received {received:#04x})"
            ),
        }
    }
}

/// Five raw bytes as transmitted by the sensor.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SensorFrame {
    bytes: [u8; FRAME_BYTES],
}

impl SensorFrame {
    pub const fn from_bytes(bytes: [u8; FRAME_BYTES]) -> Self {
        Self { bytes }
    }

    /// Builds a frame with a valid checksum from physical values in tenths.
    #[must_use]
    pub fn from_reading(temperature_decis: i16, humidity_decis: u16) -> Self {
        let magnitude = temperature_decis.unsigned_abs() & MAGNITUDE_MASK;
        let temperature_raw = if temperature_decis < 0 {
            magnitude | SIGN_BIT
        } else {
            magnitude
        };
        let [h_hi, h_lo] = humidity_decis.to_be_bytes();
        let [t_hi, t_lo] = temperature_raw.to_be_bytes();
        let payload = [h_hi, h_lo, t_hi, t_lo];
        Self::from_bytes([h_hi, h_lo, t_hi, t_lo, checksum(&payload)])
    }

    pub const fn bytes(&self) -> [u8; FRAME_BYTES] {
        self.bytes
    }

    pub const fn checksum_byte(&self) -> u8 {
        self.bytes[4]
    }

    /// Checksum computed over the four payload bytes.
    pub fn expected_checksum(&self) -> u8 {
        checksum(&[self.bytes[0], self.bytes[1], self.bytes[2], self.bytes[3]])
    }

    pub fn humidity_decis(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    pub fn temperature_decis(&self) -> i16 {
        let raw = u16::from_be_bytes([self.bytes[2], self.bytes[3]]);
        // Masked to 15 bits, so the conversion cannot fail.
        let magnitude = i16::try_from(raw & MAGNITUDE_MASK).unwrap_or(i16::MAX);
        if raw & SIGN_BIT == 0 {
            magnitude
        } else {
            -magnitude
        }
    }

    /// Validates the checksum and returns the physical values.
    pub fn validate(&self) -> Result<(i16, u16), DecodeError> {
        let expected = self.expected_checksum();
        let received = self.checksum_byte();
        if expected != received {
            return Err(DecodeError::ChecksumMismatch { expected, received });
        }
        Ok((self.temperature_decis(), self.humidity_decis()))
    }
}

/// Low 8 bits of the sum of the payload bytes.
#[must_use]
pub fn checksum(payload: &[u8; 4]) -> u8 {
    payload.iter().fold(0u8, |sum, byte| sum.wrapping_add(*byte))
}

/// Successfully decoded reading, in tenths of a unit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RawReading {
    pub temperature_decis: i16,
    pub humidity_decis: u16,
    pub decoded_at: TimestampMicros,
}

impl RawReading {
    pub fn temperature(&self) -> Tenths {
        Tenths(i32::from(self.temperature_decis))
    }

    pub fn humidity(&self) -> Tenths {
        Tenths(i32::from(self.humidity_decis))
    }
}

impl fmt::Display for RawReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "temperature {} C, humidity {}%",
            self.temperature(),
            self.humidity()
        )
    }
}

/// Fixed-point value in tenths, rendered as `D.d`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Tenths(pub i32);

impl fmt::Display for Tenths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        write!(f, "{sign}{}.{}", magnitude / 10, magnitude % 10)
    }
}

/// Recovers the raw frame bits from a complete interval sequence.
///
/// Only the value interval of each bit pair is inspected; a value strictly
/// longer than [`BIT_THRESHOLD_US`] is a one.
pub fn intervals_to_frame(intervals: &[i32]) -> Result<SensorFrame, DecodeError> {
    if intervals.len() < EXPECTED_EDGE_COUNT {
        return Err(DecodeError::IncompleteCapture {
            captured: intervals.len(),
        });
    }

    let mut bytes = [0u8; FRAME_BYTES];
    let data = &intervals[PREAMBLE_EDGE_COUNT..PREAMBLE_EDGE_COUNT + DATA_BITS * 2];
    for (bit, pair) in data.chunks_exact(2).enumerate() {
        if pair[1] > BIT_THRESHOLD_US {
            bytes[bit / BITS_PER_BYTE] |= 0x80 >> (bit % BITS_PER_BYTE);
        }
    }
    Ok(SensorFrame::from_bytes(bytes))
}

/// Decodes a full capture buffer into a reading stamped with `decoded_at`.
pub fn decode(
    buffer: &EdgeTimingBuffer,
    decoded_at: TimestampMicros,
) -> Result<RawReading, DecodeError> {
    let (temperature_decis, humidity_decis) = intervals_to_frame(buffer.as_slice())?.validate()?;
    Ok(RawReading {
        temperature_decis,
        humidity_decis,
        decoded_at,
    })
}

/// Produces the nominal interval sequence a healthy sensor generates for
/// `frame`, including the echoes of the request pulse.
#[must_use]
pub fn frame_to_intervals(frame: &SensorFrame) -> EdgeTimingBuffer {
    let preamble = [
        duration_us(TRIGGER_SETTLE),
        duration_us(TRIGGER_ASSERT),
        RESPONSE_DELAY_US,
        RESPONSE_LOW_US,
        RESPONSE_HIGH_US,
    ];
    let bytes = frame.bytes();
    let bits = (0..DATA_BITS).flat_map(move |bit| {
        let set = bytes[bit / BITS_PER_BYTE] & (0x80 >> (bit % BITS_PER_BYTE)) != 0;
        [BIT_START_US, if set { BIT_ONE_US } else { BIT_ZERO_US }]
    });

    preamble
        .into_iter()
        .chain(bits)
        .chain(core::iter::once(BIT_START_US))
        .collect()
}

fn duration_us(duration: core::time::Duration) -> i32 {
    i32::try_from(duration.as_micros()).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_with_data(data: &[i32]) -> EdgeTimingBuffer {
        let mut buffer = EdgeTimingBuffer::new();
        for _ in 0..PREAMBLE_EDGE_COUNT {
            buffer.push(100).unwrap();
        }
        for interval in data {
            buffer.push(*interval).unwrap();
        }
        while !buffer.is_full() {
            buffer.push(BIT_START_US).unwrap();
        }
        buffer
    }

    #[test]
    fn short_value_intervals_decode_to_zero_bytes() {
        let data: [i32; 80] = core::array::from_fn(|i| if i % 2 == 0 { 50 } else { 30 });
        let frame = intervals_to_frame(buffer_with_data(&data).as_slice()).unwrap();
        assert_eq!(frame.bytes(), [0; 5]);
    }

    #[test]
    fn long_value_intervals_decode_to_set_bits() {
        let mut data = [0i32; 80];
        for (i, slot) in data.iter_mut().enumerate() {
            *slot = match i {
                // First byte: [50, 80] x 8.
                0..16 if i % 2 == 0 => 50,
                0..16 => 80,
                _ if i % 2 == 0 => 50,
                _ => 30,
            };
        }
        let frame = intervals_to_frame(buffer_with_data(&data).as_slice()).unwrap();
        assert_eq!(frame.bytes()[0], 0xFF);
        assert_eq!(&frame.bytes()[1..], &[0, 0, 0, 0]);
    }

    #[test]
    fn threshold_is_strict() {
        let mut data = [30i32; 80];
        data[1] = BIT_THRESHOLD_US;
        data[3] = BIT_THRESHOLD_US + 1;
        let frame = intervals_to_frame(buffer_with_data(&data).as_slice()).unwrap();
        assert_eq!(frame.bytes()[0], 0b0100_0000);
    }

    #[test]
    fn decodes_reference_frame() {
        let frame = SensorFrame::from_bytes([0x01, 0x90, 0x00, 0xC8, 0x59]);
        let reading = decode(&frame_to_intervals(&frame), 42).unwrap();
        assert_eq!(reading.temperature_decis, 200);
        assert_eq!(reading.humidity_decis, 400);
        assert_eq!(reading.decoded_at, 42);
    }

    #[test]
    fn sign_bit_negates_temperature() {
        let payload = [0x01, 0x90, 0x80, 0xC8];
        let frame = SensorFrame::from_bytes([
            payload[0],
            payload[1],
            payload[2],
            payload[3],
            checksum(&payload),
        ]);
        let reading = decode(&frame_to_intervals(&frame), 0).unwrap();
        assert_eq!(reading.temperature_decis, -200);
        assert_eq!(reading.humidity_decis, 400);
    }

    #[test]
    fn checksum_mismatch_is_an_error() {
        let frame = SensorFrame::from_bytes([0x01, 0x90, 0x00, 0xC8, 0x58]);
        assert_eq!(
            decode(&frame_to_intervals(&frame), 0),
            Err(DecodeError::ChecksumMismatch {
                expected: 0x59,
                received: 0x58
            })
        );
    }

    #[test]
    fn partial_buffer_is_incomplete() {
        let buffer: EdgeTimingBuffer = [50; 40].into_iter().collect();
        assert_eq!(
            decode(&buffer, 0),
            Err(DecodeError::IncompleteCapture { captured: 40 })
        );
    }

    #[test]
    fn from_reading_encodes_sign_magnitude() {
        let frame = SensorFrame::from_reading(-200, 400);
        assert_eq!(frame.bytes(), [0x01, 0x90, 0x80, 0xC8, 0xD9]);
        assert_eq!(frame.validate(), Ok((-200, 400)));
    }

    #[test]
    fn tenths_render_with_sign() {
        extern crate std;
        use std::string::ToString;

        assert_eq!(Tenths(200).to_string(), "20.0");
        assert_eq!(Tenths(-200).to_string(), "-20.0");
        assert_eq!(Tenths(-5).to_string(), "-0.5");
        assert_eq!(Tenths(1234).to_string(), "123.4");
    }
}
