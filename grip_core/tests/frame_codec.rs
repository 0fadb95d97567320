use grip_core::frame::{DecodeError, FrameCodec, FrameLayout, checksum, encode};
use proptest::prelude::*;
use rstest::rstest;

fn layout() -> FrameLayout {
    FrameLayout::default()
}

#[test]
fn default_layout_is_78_bytes() {
    assert_eq!(layout().frame_size(), 78);
    assert_eq!(layout().header, [0xFF, 0x66]);
}

#[test]
fn decodes_readings_in_stream_order() {
    let readings: Vec<u16> = (1..=36).map(|i| i * 100).collect();
    let bytes = encode(&layout(), 0, &readings).unwrap();
    let mut codec = FrameCodec::new(layout());
    let frame = codec.decode(&bytes).unwrap();
    assert_eq!(frame.len(), 36);
    assert_eq!(frame.reading(1), Some(100));
    assert_eq!(frame.reading(36), Some(3600));
    assert_eq!(frame.reading(0), None);
    assert_eq!(frame.reading(37), None);
    assert_eq!(codec.total_frames(), 1);
    assert_eq!(codec.sync_errors(), 0);
}

#[test]
fn checksum_field_is_big_endian_sum_of_bytes_2_to_76() {
    let readings = vec![0xABCD; 36];
    let bytes = encode(&layout(), 0x1234, &readings).unwrap();
    let sum = checksum(&bytes[2..76]);
    assert_eq!(u16::from_be_bytes([bytes[76], bytes[77]]), sum);
}

#[rstest]
#[case(77)]
#[case(79)]
#[case(0)]
fn wrong_size_is_rejected_without_counting(#[case] len: usize) {
    let mut codec = FrameCodec::new(layout());
    let err = codec.decode(&vec![0u8; len]).unwrap_err();
    assert_eq!(
        err,
        DecodeError::WrongSize {
            expected: 78,
            actual: len
        }
    );
    assert_eq!(codec.total_frames(), 0);
    assert_eq!(codec.sync_errors(), 0);
}

#[test]
fn bad_header_is_not_a_checksum_error() {
    let mut bytes = encode(&layout(), 0, &[7; 36]).unwrap();
    bytes[1] = 0x67;
    let mut codec = FrameCodec::new(layout());
    assert_eq!(
        codec.decode(&bytes),
        Err(DecodeError::BadHeader {
            found: [0xFF, 0x67]
        })
    );
    assert_eq!(codec.total_frames(), 0);
    assert_eq!(codec.sync_errors(), 0);
}

#[test]
fn checksum_failure_counts_both() {
    let mut bytes = encode(&layout(), 0, &[7; 36]).unwrap();
    bytes[77] ^= 0x01;
    let mut codec = FrameCodec::new(layout());
    assert!(matches!(
        codec.decode(&bytes),
        Err(DecodeError::BadChecksum { .. })
    ));
    assert_eq!(codec.total_frames(), 1);
    assert_eq!(codec.sync_errors(), 1);
}

#[test]
fn reserved_bytes_are_covered_by_checksum() {
    let mut bytes = encode(&layout(), 0, &[7; 36]).unwrap();
    bytes[2] = 0x01;
    let mut codec = FrameCodec::new(layout());
    assert!(matches!(
        codec.decode(&bytes),
        Err(DecodeError::BadChecksum { .. })
    ));
}

#[test]
fn custom_layout_sizes_follow_sensor_count() {
    let l = FrameLayout::new([0xAA, 0x55], 4);
    assert_eq!(l.frame_size(), 14);
    let bytes = encode(&l, 0, &[1, 2, 3, 4]).unwrap();
    let f = FrameCodec::new(l).decode(&bytes).unwrap();
    assert_eq!(f.readings(), &[1, 2, 3, 4]);
}

proptest! {
    #[test]
    fn checksum_round_trip(readings in proptest::collection::vec(any::<u16>(), 36), reserved in any::<u16>()) {
        let bytes = encode(&layout(), reserved, &readings).unwrap();
        let mut codec = FrameCodec::new(layout());
        let frame = codec.decode(&bytes).unwrap();
        prop_assert_eq!(frame.readings(), readings.as_slice());
        prop_assert_eq!(frame.reserved, reserved);
    }

    #[test]
    fn single_bit_flip_in_payload_is_detected(
        readings in proptest::collection::vec(any::<u16>(), 36),
        byte in 2usize..76,
        bit in 0u8..8,
    ) {
        let mut bytes = encode(&layout(), 0, &readings).unwrap();
        bytes[byte] ^= 1 << bit;
        let mut codec = FrameCodec::new(layout());
        let is_bad_checksum = matches!(codec.decode(&bytes), Err(DecodeError::BadChecksum { .. }));
        prop_assert!(is_bad_checksum);
        prop_assert_eq!(codec.sync_errors(), 1);
    }
}
