use himg::{ErrorKind, HimgDecodeContext, HimgEncodeContext};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn sample_stream() -> (Vec<u8>, Vec<u8>) {
    let mut rng = StdRng::seed_from_u64(17);
    let pixels = (0..21 * 13)
        .flat_map(|i| {
            let v = (i * 7 % 200) as u8;
            [v, v / 2 + rng.gen_range(0..20), 255 - v]
        })
        .collect::<Vec<u8>>();

    let ctx = HimgEncodeContext::new(60)
        .unwrap()
        .with_block_shift(2)
        .unwrap();
    let mut encoded = Vec::new();
    ctx.encode_to_vec(21, 13, 3, &pixels, &mut encoded).unwrap();

    let (_, decoded) = HimgDecodeContext::new().decode(&encoded).unwrap();
    (encoded, decoded)
}

#[test]
fn every_truncation_fails() {
    let (encoded, _) = sample_stream();
    let ctx = HimgDecodeContext::new();

    for len in 0..encoded.len() {
        let err = ctx.decode(&encoded[..len]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Truncated, "{len}: {err}");
        assert!(HimgDecodeContext::decode_header(&encoded[..len]).is_err());
    }
}

#[test]
fn truncation_behind_a_patched_size_fails() {
    let (encoded, expected) = sample_stream();
    let ctx = HimgDecodeContext::with_threads(2).unwrap();

    for len in 12..encoded.len() {
        let mut truncated = encoded[..len].to_vec();
        let size = (len - 8) as u32;
        truncated[4..8].copy_from_slice(&size.to_le_bytes());

        // Only a missing pad byte at the very end can still decode.
        if let Ok((_, pixels)) = ctx.decode(&truncated) {
            assert_eq!(len, encoded.len() - 1);
            assert_eq!(pixels, expected);
        }
    }
}

#[test]
fn corrupted_bytes_never_panic() {
    let (encoded, _) = sample_stream();
    let ctx = HimgDecodeContext::new();

    for i in 12..encoded.len() {
        for mask in [0x01, 0x80, 0xff] {
            let mut corrupted = encoded.clone();
            corrupted[i] ^= mask;
            let _ = ctx.decode(&corrupted);
        }
    }
}
