use himg::huffman::{
    compress, max_compressed_size, max_uncompressed_size, tokenize, uncompress, HuffmanDecoder, HuffmanError, Token,
    MAX_RUN_LENGTH,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn roundtrip(input: &[u8]) -> Vec<u8> {
    let mut compressed = Vec::new();
    let len = compress(input, &mut compressed);
    assert_eq!(len, compressed.len());
    assert!(len <= max_compressed_size(input.len()));

    let mut output = vec![0xAA; input.len()];
    uncompress(&compressed, &mut output).unwrap();
    assert_eq!(output, input);

    let mut walked = vec![0xAA; input.len()];
    if !compressed.is_empty() {
        HuffmanDecoder::new(&compressed)
            .unwrap()
            .uncompress_tree_walk(&mut walked)
            .unwrap();
        assert_eq!(walked, input);
    }

    compressed
}

#[test]
fn roundtrip_basic_blocks() {
    assert!(roundtrip(&[]).is_empty());
    roundtrip(&[0]);
    roundtrip(&[1]);
    roundtrip(&[0; 1000]);
    roundtrip(&(1..=255).cycle().take(5000).collect::<Vec<u8>>());
    roundtrip(&[0, 0, 5, 0, 0, 0, 7, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9, 0]);
}

#[test]
fn all_zero_blocks_are_tiny() {
    let compressed = roundtrip(&vec![0; 1 << 20]);
    // a few 14-bit run tokens behind a one-leaf tree
    assert!(compressed.len() < 200, "{} bytes", compressed.len());
    assert!(max_uncompressed_size(compressed.len()) >= 1 << 20);
    assert!(max_uncompressed_size(compressed.len() - 10) < 1 << 20);
}

#[test]
fn run_length_boundaries() {
    let expect = |len: usize, tokens: &[Token]| {
        let data = vec![0u8; len];
        assert_eq!(tokenize(&data).collect::<Vec<_>>(), tokens, "run of {len}");
        roundtrip(&data);

        // surrounded by literals
        let mut data = vec![3u8];
        data.extend(core::iter::repeat(0).take(len));
        data.push(4);
        roundtrip(&data);
    };

    expect(1, &[Token::Literal(0)]);
    expect(2, &[Token::ZeroRun(2)]);
    expect(3, &[Token::ZeroRun(3)]);
    expect(6, &[Token::ZeroRun(6)]);
    expect(7, &[Token::ZeroRun(7)]);
    expect(22, &[Token::ZeroRun(22)]);
    expect(23, &[Token::ZeroRun(23)]);
    expect(278, &[Token::ZeroRun(278)]);
    expect(279, &[Token::ZeroRun(279)]);
    expect(MAX_RUN_LENGTH, &[Token::ZeroRun(MAX_RUN_LENGTH)]);
    expect(
        MAX_RUN_LENGTH + 1,
        &[Token::ZeroRun(MAX_RUN_LENGTH), Token::Literal(0)],
    );
    expect(
        MAX_RUN_LENGTH + 2,
        &[Token::ZeroRun(MAX_RUN_LENGTH), Token::ZeroRun(2)],
    );

    let symbols = [2, 3, 6, 7, 22, 23, 278, 279, MAX_RUN_LENGTH]
        .map(|len| Token::ZeroRun(len).symbol());
    assert_eq!(symbols, [256, 257, 257, 258, 258, 259, 259, 260, 260]);
}

#[test]
fn single_symbol_blocks() {
    for byte in [0u8, 1, 128, 255] {
        for len in [1, 2, 3, 100, 4097] {
            let data = vec![byte; len];
            roundtrip(&data);
        }
    }
}

#[test]
fn randomized_blocks() {
    let mut rng = StdRng::seed_from_u64(0x4849_4d47);

    for _ in 0..200 {
        let len = rng.gen_range(0..4000);
        let zero_bias = rng.gen_range(0.0..1.0);
        let alphabet = rng.gen_range(1..=255u8);
        let data = (0..len)
            .map(|_| {
                if rng.gen_bool(zero_bias) {
                    0
                } else {
                    rng.gen_range(0..=alphabet)
                }
            })
            .collect::<Vec<u8>>();
        roundtrip(&data);
    }
}

#[test]
fn skewed_distribution_with_long_codes() {
    // Fibonacci-like counts force codes longer than the 8-bit lookup table.
    let mut data = Vec::new();
    let (mut a, mut b) = (1usize, 1usize);
    for symbol in 1..=20u8 {
        data.extend(core::iter::repeat(symbol).take(a));
        (a, b) = (b, a + b);
    }
    let mut rng = StdRng::seed_from_u64(7);
    for i in (1..data.len()).rev() {
        data.swap(i, rng.gen_range(0..=i));
    }

    roundtrip(&data);
}

#[test]
fn corrupt_blocks_fail_cleanly() {
    let mut rng = StdRng::seed_from_u64(99);
    let data = (0..3000)
        .map(|i| if i % 5 == 0 { rng.gen() } else { 0 })
        .collect::<Vec<u8>>();

    let mut compressed = Vec::new();
    compress(&data, &mut compressed);

    // every truncation is detected
    let mut output = vec![0; data.len()];
    for len in 0..compressed.len() {
        assert!(uncompress(&compressed[..len], &mut output).is_err(), "{len}");
    }

    // trailing garbage is detected
    let mut long = compressed.clone();
    long.push(0xff);
    assert!(matches!(
        uncompress(&long, &mut output),
        Err(HuffmanError::TrailingData { .. })
    ));

    // output too short for the final run
    let mut short = vec![0; data.len() - 1];
    assert!(matches!(
        uncompress(&compressed, &mut short),
        Err(HuffmanError::RunOverflow { .. })
    ));

    // bit flips never panic
    for i in 0..compressed.len() * 8 {
        let mut flipped = compressed.clone();
        flipped[i / 8] ^= 1 << (i % 8);
        let _ = uncompress(&flipped, &mut output);
    }
}
