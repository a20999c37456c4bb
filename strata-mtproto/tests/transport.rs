use strata_mtproto::transport::crc32_ieee;
use strata_mtproto::{Abridged, Framing, FramingError, Full, Intermediate, UnpackedOffset};

fn roundtrip<F: Framing>(framing: &mut F, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    framing.pack(payload, &mut out);
    let off = framing.unpack(&out).unwrap().unwrap();
    assert_eq!(off.next_offset, out.len());
    out[off.data_start..off.data_end].to_vec()
}

#[test]
fn init_bytes() {
    assert_eq!(Abridged.init(), &[0xef]);
    assert_eq!(Intermediate.init(), &[0xee; 4]);
    assert!(Full::default().init().is_empty());
}

#[test]
fn abridged_short_and_long_headers() {
    let mut out = Vec::new();
    Abridged.pack(&[1u8; 8], &mut out);
    assert_eq!(out[0], 2);
    assert_eq!(out.len(), 9);

    let long = vec![7u8; 127 * 4];
    let mut out = Vec::new();
    Abridged.pack(&long, &mut out);
    assert_eq!(&out[..4], &[0x7f, 127, 0, 0]);
    assert_eq!(roundtrip(&mut Abridged, &long), long);
}

#[test]
fn partial_input_waits_for_more() {
    let mut out = Vec::new();
    Intermediate.pack(&[3u8; 40], &mut out);
    assert_eq!(Intermediate.unpack(&out[..2]), Ok(None));
    assert_eq!(Intermediate.unpack(&out[..20]), Ok(None));
    assert_eq!(
        Intermediate.unpack(&out),
        Ok(Some(UnpackedOffset { data_start: 4, data_end: 44, next_offset: 44 }))
    );

    let mut out = Vec::new();
    Abridged.pack(&vec![0u8; 600], &mut out);
    assert_eq!(Abridged.unpack(&out[..3]), Ok(None));
}

#[test]
fn back_to_back_packets() {
    let mut framing = Full::default();
    let mut out = Vec::new();
    framing.pack(&[1u8; 16], &mut out);
    framing.pack(&[2u8; 4], &mut out);

    let mut reader = Full::default();
    let first = reader.unpack(&out).unwrap().unwrap();
    assert_eq!(&out[first.data_start..first.data_end], &[1u8; 16]);
    let rest = &out[first.next_offset..];
    let second = reader.unpack(rest).unwrap().unwrap();
    assert_eq!(&rest[second.data_start..second.data_end], &[2u8; 4]);
}

#[test]
fn full_layout_and_crc() {
    let mut out = Vec::new();
    Full::default().pack(b"abcd", &mut out);
    assert_eq!(&out[..4], &16u32.to_le_bytes());
    assert_eq!(&out[4..8], &0u32.to_le_bytes());
    assert_eq!(&out[8..12], b"abcd");
    assert_eq!(&out[12..], &crc32_ieee(&out[..12]).to_le_bytes());
}

#[test]
fn full_rejects_corruption() {
    let mut out = Vec::new();
    Full::default().pack(b"abcdefgh", &mut out);
    out[9] ^= 1;
    assert!(matches!(Full::default().unpack(&out), Err(FramingError::BadCrc { .. })));
}

#[test]
fn full_rejects_out_of_order_sequence() {
    let mut writer = Full::default();
    let mut first = Vec::new();
    writer.pack(b"one!", &mut first);
    let mut second = Vec::new();
    writer.pack(b"two!", &mut second);

    let mut reader = Full::default();
    assert_eq!(reader.unpack(&second), Err(FramingError::BadSeq { expected: 0, got: 1 }));
    assert!(reader.unpack(&first).unwrap().is_some());
    assert!(reader.unpack(&second).unwrap().is_some());
}

#[test]
fn full_reset_restarts_counters() {
    let mut writer = Full::default();
    let mut out = Vec::new();
    writer.pack(b"one!", &mut out);
    writer.reset();
    out.clear();
    writer.pack(b"two!", &mut out);
    assert_eq!(&out[4..8], &0u32.to_le_bytes());
}

#[test]
fn impossible_lengths_are_errors() {
    assert_eq!(Full::default().unpack(&8u32.to_le_bytes()), Err(FramingError::BadLength { len: 8 }));
    assert_eq!(Intermediate.unpack(&1u32.to_le_bytes()), Err(FramingError::BadLength { len: 1 }));
}
