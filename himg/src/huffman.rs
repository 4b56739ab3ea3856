//! Block Huffman coder with run-length tokens for zero bytes.
//!
//! Every block is self-contained: the tree is stored in front of the coded data, so blocks can
//! be decoded independently (and in parallel).
//!
//! # Alphabet
//!
//! 261 nine-bit symbols: the literal bytes `0..=255` and five tokens for runs of zero bytes.
//!
//! | symbol | run length     | extra bits |
//! |--------|----------------|------------|
//! | 256    | 2              | 0          |
//! | 257    | 3..=6          | 2          |
//! | 258    | 7..=22         | 4          |
//! | 259    | 23..=278       | 8          |
//! | 260    | 279..=16662    | 14         |
//!
//! The extra bits hold `length - base`. A single zero byte is coded as the literal `0`, and
//! runs longer than [`MAX_RUN_LENGTH`] are split greedily.
//!
//! # Tree
//!
//! The tree is stored depth first: `1` followed by the 9-bit symbol for a leaf, `0` followed by
//! both subtrees for a branch. Taking the first subtree appends a `0` bit to the code, the
//! second a `1` bit. A tree consisting of a single leaf gets the one-bit code `0`.

mod decode;
mod encode;

pub use decode::{uncompress, HuffmanDecoder, HuffmanError};
pub use encode::{compress, histogram, max_compressed_size};

/// Number of bits per symbol in the serialized tree.
pub const SYMBOL_SIZE: u32 = 9;

/// Size of the alphabet (256 literals and 5 run tokens).
pub const NUM_SYMBOLS: usize = 261;

/// Branch and leaf nodes of a tree over the full alphabet.
pub const MAX_TREE_NODES: usize = NUM_SYMBOLS * 2 - 1;

/// Upper bound of the serialized tree size, in bytes.
pub const MAX_TREE_DATA_SIZE: usize = ((2 + SYMBOL_SIZE as usize) * NUM_SYMBOLS + 7) / 8;

/// Longest run of zero bytes a single token can express.
pub const MAX_RUN_LENGTH: usize = 16662;

/// Upper bound of the bytes a block of `compressed_size` bytes can expand to.
///
/// The densest token is a maximal run: one code bit plus 14 extra bits for
/// [`MAX_RUN_LENGTH`] bytes.
pub const fn max_uncompressed_size(compressed_size: usize) -> usize {
    compressed_size
        .saturating_mul(8)
        .saturating_mul(MAX_RUN_LENGTH)
        / (1 + 14)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunBucket {
    pub symbol: u16,
    pub base: usize,
    pub extra_bits: u32,
}

impl RunBucket {
    pub const fn max_len(&self) -> usize {
        self.base + (1 << self.extra_bits) - 1
    }
}

pub const RUN_BUCKETS: [RunBucket; 5] = [
    RunBucket {
        symbol: 256,
        base: 2,
        extra_bits: 0,
    },
    RunBucket {
        symbol: 257,
        base: 3,
        extra_bits: 2,
    },
    RunBucket {
        symbol: 258,
        base: 7,
        extra_bits: 4,
    },
    RunBucket {
        symbol: 259,
        base: 23,
        extra_bits: 8,
    },
    RunBucket {
        symbol: 260,
        base: 279,
        extra_bits: 14,
    },
];

/// Looks up the run bucket of a token symbol.
#[inline]
pub fn run_bucket(symbol: u16) -> Option<&'static RunBucket> {
    RUN_BUCKETS.get(usize::from(symbol.checked_sub(256)?))
}

/// One coded unit: a literal byte or a run of zero bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    /// A run of 2..=[`MAX_RUN_LENGTH`] zero bytes.
    ZeroRun(usize),
}

impl Token {
    fn bucket(len: usize) -> &'static RunBucket {
        RUN_BUCKETS
            .iter()
            .find(|bucket| len <= bucket.max_len())
            .unwrap_or(&RUN_BUCKETS[RUN_BUCKETS.len() - 1])
    }

    pub fn symbol(self) -> u16 {
        match self {
            Token::Literal(byte) => u16::from(byte),
            Token::ZeroRun(len) => Self::bucket(len).symbol,
        }
    }

    /// The extra count bits following the symbol: `(value, bit count)`.
    pub fn extra_bits(self) -> (u32, u32) {
        match self {
            Token::Literal(_) => (0, 0),
            Token::ZeroRun(len) => {
                let bucket = Self::bucket(len);
                ((len - bucket.base) as u32, bucket.extra_bits)
            }
        }
    }

    /// Number of bytes this token expands to.
    pub fn expanded_len(self) -> usize {
        match self {
            Token::Literal(_) => 1,
            Token::ZeroRun(len) => len,
        }
    }
}

/// Splits a block into tokens, see [`tokenize`].
#[derive(Debug, Clone)]
pub struct Tokens<'a> {
    rest: &'a [u8],
}

/// Splits a block into the literals and zero runs the encoder emits.
pub fn tokenize(data: &[u8]) -> Tokens<'_> {
    Tokens { rest: data }
}

impl Iterator for Tokens<'_> {
    type Item = Token;

    #[inline]
    fn next(&mut self) -> Option<Token> {
        let (&first, tail) = self.rest.split_first()?;
        if first != 0 {
            self.rest = tail;
            return Some(Token::Literal(first));
        }

        let zeros = 1 + tail
            .iter()
            .take(MAX_RUN_LENGTH - 1)
            .take_while(|&&b| b == 0)
            .count();
        self.rest = &self.rest[zeros..];

        Some(if zeros == 1 {
            Token::Literal(0)
        } else {
            Token::ZeroRun(zeros)
        })
    }
}
