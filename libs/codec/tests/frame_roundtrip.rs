//! Property tests for the frame codec

use codec::{decode_frame, decode_header, encode_frame, Frame, ProtocolError, HEADER_SIZE};
use proptest::prelude::*;

proptest! {
    #[test]
    fn encode_then_decode_preserves_type_and_payload(
        frame_type in any::<u8>(),
        payload in proptest::collection::vec(any::<u8>(), 0..2048),
    ) {
        let encoded = encode_frame(frame_type, &payload).unwrap();
        prop_assert_eq!(encoded.len(), payload.len() + HEADER_SIZE);

        let (frame, used) = decode_frame(&encoded).unwrap();
        prop_assert_eq!(used, encoded.len());
        prop_assert_eq!(frame, Frame::new(frame_type, payload));
    }

    #[test]
    fn header_length_counts_itself(len in 0usize..4096) {
        let encoded = encode_frame(0x55, &vec![0u8; len]).unwrap();
        let (length, frame_type) = decode_header(&[encoded[0], encoded[1], encoded[2]]).unwrap();
        prop_assert_eq!(length as usize, len + 3);
        prop_assert_eq!(frame_type, 0x55);
    }

    #[test]
    fn concatenated_frames_decode_in_order(
        payloads in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 1..8),
    ) {
        let mut stream = Vec::new();
        for (i, payload) in payloads.iter().enumerate() {
            stream.extend_from_slice(&encode_frame(i as u8, payload).unwrap());
        }

        let mut offset = 0;
        for (i, payload) in payloads.iter().enumerate() {
            let (frame, used) = decode_frame(&stream[offset..]).unwrap();
            prop_assert_eq!(frame.frame_type, i as u8);
            prop_assert_eq!(&frame.payload[..], &payload[..]);
            offset += used;
        }
        prop_assert_eq!(offset, stream.len());
    }
}

#[test]
fn error_messages_name_the_problem() {
    let err = decode_header(&[0x00, 0x02, 0x55]).unwrap_err();
    let text = err.to_string();
    assert!(text.contains("Malformed frame"));
    assert!(text.contains("declared length: 2"));

    let err = ProtocolError::unexpected_frame(0x53, 0x55, "start");
    let text = err.to_string();
    assert!(text.contains("CONTROL_PACKAGE_START"));
    assert!(text.contains("DATA_PACKAGE"));
    assert!(text.contains("0x55"));
}
