// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for NV21 conversion

use edgeviewer::backends::camera::RawSensorFrame;
use edgeviewer::media::{chroma_dimensions, convert_frame, convert_planes, converted_len};

#[test]
fn test_luma_is_copied_unchanged() {
    for (w, h) in [(2u32, 2u32), (5, 3), (640, 480), (1, 1)] {
        let (cw, ch) = chroma_dimensions(w, h);
        let y: Vec<u8> = (0..w * h).map(|i| (i % 251) as u8).collect();
        let u = vec![1u8; cw * ch];
        let v = vec![2u8; cw * ch];

        let out = convert_planes(&y, &u, &v);
        assert_eq!(out.len(), converted_len(w, h), "{}x{}", w, h);
        assert_eq!(&out[..y.len()], &y[..]);
        assert!(out[y.len()..].chunks_exact(2).all(|pair| pair == [2, 1]));
    }
}

#[test]
fn test_odd_dimensions_round_chroma_up() {
    assert_eq!(chroma_dimensions(5, 3), (3, 2));
    assert_eq!(converted_len(5, 3), 15 + 2 * 3 * 2);
}

#[test]
fn test_frame_conversion_keeps_sequence_and_size() {
    let raw = RawSensorFrame::from_packed(4, 2, vec![9; 8], vec![3, 4], vec![7, 8]).unwrap();
    let frame = convert_frame(&raw, 12);

    assert_eq!(frame.sequence, 12);
    assert_eq!((frame.width, frame.height), (4, 2));
    assert_eq!(frame.data, vec![9, 9, 9, 9, 9, 9, 9, 9, 7, 3, 8, 4]);
    assert!(frame.validate().is_ok());
}

#[test]
fn test_undersized_plane_is_rejected_at_construction() {
    assert!(RawSensorFrame::from_packed(4, 2, vec![0; 7], vec![0; 2], vec![0; 2]).is_err());
    assert!(RawSensorFrame::from_packed(4, 2, vec![0; 8], vec![0; 1], vec![0; 2]).is_err());
}
