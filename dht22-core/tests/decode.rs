use dht22_core::cycle::{CycleContext, EdgeOutcome, EdgeTimingBuffer};
use dht22_core::decode::{
    DecodeError, SensorFrame, checksum, decode, frame_to_intervals, intervals_to_frame,
};
use dht22_core::protocol::{BIT_THRESHOLD_US, EXPECTED_EDGE_COUNT, PREAMBLE_EDGE_COUNT};

fn frame(payload: [u8; 4]) -> SensorFrame {
    SensorFrame::from_bytes([
        payload[0],
        payload[1],
        payload[2],
        payload[3],
        checksum(&payload),
    ])
}

/// Data section where every byte uses the same bit-start/value pair.
fn uniform_capture(start: i32, value: i32) -> EdgeTimingBuffer {
    (0..EXPECTED_EDGE_COUNT)
        .map(|index| {
            if index < PREAMBLE_EDGE_COUNT {
                80
            } else if (index - PREAMBLE_EDGE_COUNT) % 2 == 0 {
                start
            } else {
                value
            }
        })
        .collect()
}

#[test]
fn all_short_values_decode_to_zero() {
    let frame = intervals_to_frame(uniform_capture(50, 30).as_slice()).unwrap();
    assert_eq!(frame.bytes(), [0x00; 5]);
    // Zero payload has a zero checksum, so this is a valid reading.
    let reading = decode(&uniform_capture(50, 30), 1).unwrap();
    assert_eq!((reading.temperature_decis, reading.humidity_decis), (0, 0));
}

#[test]
fn all_long_values_decode_to_ones() {
    let frame = intervals_to_frame(uniform_capture(50, 80).as_slice()).unwrap();
    assert_eq!(frame.bytes(), [0xFF; 5]);
    // 0xFF * 4 = 0x3FC, so the checksum byte 0xFF does not match.
    assert_eq!(
        decode(&uniform_capture(50, 80), 1),
        Err(DecodeError::ChecksumMismatch {
            expected: 0xFC,
            received: 0xFF
        })
    );
}

#[test]
fn reference_frame_reads_twenty_degrees_forty_percent() {
    let reference = SensorFrame::from_bytes([0x01, 0x90, 0x00, 0xC8, 0x59]);
    let reading = decode(&frame_to_intervals(&reference), 7).unwrap();
    assert_eq!(reading.temperature_decis, 200);
    assert_eq!(reading.humidity_decis, 400);
    assert_eq!(reading.to_string(), "temperature 20.0 C, humidity 40.0%");
}

#[test]
fn sign_bit_yields_negative_temperature() {
    let reading = decode(&frame_to_intervals(&frame([0x01, 0x90, 0x80, 0xC8])), 0).unwrap();
    assert_eq!(reading.temperature_decis, -200);
    assert_eq!(reading.temperature().to_string(), "-20.0");
}

#[test]
fn physical_values_round_trip_through_intervals() {
    let fixtures: [(i16, u16); 6] = [
        (0, 0),
        (215, 455),
        (-5, 1000),
        (-400, 0),
        (800, 999),
        (1, 1),
    ];
    for (temperature, humidity) in fixtures {
        let buffer = frame_to_intervals(&SensorFrame::from_reading(temperature, humidity));
        assert_eq!(buffer.len(), EXPECTED_EDGE_COUNT);
        let reading = decode(&buffer, 0).unwrap();
        assert_eq!(
            (reading.temperature_decis, reading.humidity_decis),
            (temperature, humidity)
        );
    }
}

#[test]
fn flipping_any_single_bit_breaks_the_checksum() {
    let good = frame([0x02, 0x8C, 0x01, 0x5F]);
    assert!(good.validate().is_ok());

    for bit in 0..40 {
        let mut bytes = good.bytes();
        bytes[bit / 8] ^= 0x80 >> (bit % 8);
        let corrupted = SensorFrame::from_bytes(bytes);
        assert!(
            matches!(
                corrupted.validate(),
                Err(DecodeError::ChecksumMismatch { .. })
            ),
            "bit {bit} flip was accepted"
        );
    }
}

#[test]
fn values_at_the_threshold_read_as_zero() {
    let at = intervals_to_frame(uniform_capture(50, BIT_THRESHOLD_US).as_slice()).unwrap();
    let above = intervals_to_frame(uniform_capture(50, BIT_THRESHOLD_US + 1).as_slice()).unwrap();
    assert_eq!(at.bytes(), [0x00; 5]);
    assert_eq!(above.bytes(), [0xFF; 5]);
}

#[test]
fn captured_edges_decode_like_the_interval_model() {
    let expected = SensorFrame::from_reading(-123, 567);
    let intervals = frame_to_intervals(&expected);

    let mut ctx = CycleContext::new();
    ctx.begin(1_000).unwrap();
    let mut now = 1_000u64;
    let mut outcomes = Vec::new();
    for interval in intervals.as_slice() {
        now += u64::try_from(*interval).unwrap();
        outcomes.push(ctx.on_edge(now));
    }

    assert_eq!(outcomes.last(), Some(&EdgeOutcome::Completed));
    assert!(
        outcomes[..outcomes.len() - 1]
            .iter()
            .all(|outcome| *outcome == EdgeOutcome::Recorded)
    );
    assert_eq!(ctx.intervals(), intervals.as_slice());
    let reading = decode(ctx.buffer(), now).unwrap();
    assert_eq!(reading.temperature_decis, -123);
    assert_eq!(reading.humidity_decis, 567);
}

#[test]
fn truncated_capture_is_reported_as_incomplete() {
    let intervals = frame_to_intervals(&SensorFrame::from_reading(200, 400));
    let truncated: EdgeTimingBuffer = intervals.as_slice()[..60].iter().copied().collect();
    assert_eq!(
        decode(&truncated, 0),
        Err(DecodeError::IncompleteCapture { captured: 60 })
    );
}
