use super::{run_bucket, MAX_TREE_NODES, NUM_SYMBOLS, SYMBOL_SIZE};
use crate::bits::{BitCursor, BitstreamError};
use snafu::{ensure, OptionExt, ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum HuffmanError {
    #[snafu(display("Huffman block is truncated"))]
    Truncated { source: BitstreamError },
    #[snafu(display("Huffman tree has more than {} nodes", MAX_TREE_NODES))]
    TreeTooLarge,
    #[snafu(display("unknown Huffman symbol {symbol}"))]
    UnknownSymbol { symbol: u16 },
    #[snafu(display("bit sequence does not match any Huffman code"))]
    InvalidCode,
    #[snafu(display("run of {run} zeros overflows the output ({remaining} bytes left)"))]
    RunOverflow { run: usize, remaining: usize },
    #[snafu(display(
        "Huffman block has trailing data: {consumed_bits} of {total_bits} bits consumed"
    ))]
    TrailingData {
        consumed_bits: usize,
        total_bits: usize,
    },
    #[snafu(display("empty Huffman block, expected {expected} bytes"))]
    EmptyBlock { expected: usize },
}

impl HuffmanError {
    /// Whether the block ended before the decoder was done with it.
    pub fn is_truncation(&self) -> bool {
        matches!(self, HuffmanError::Truncated { .. })
    }
}

#[derive(Debug, Clone, Copy)]
enum DecodeNode {
    Leaf(u16),
    Branch { a: u16, b: u16 },
}

/// Entry of the 8-bit lookup table, keyed by the next 8 pending bits.
#[derive(Debug, Clone, Copy, Default)]
enum LutEntry {
    /// No code starts with these bits.
    #[default]
    Invalid,
    /// A code of at most 8 bits.
    Terminal { symbol: u16, bits: u8 },
    /// The code is longer than 8 bits; continue walking the tree from `node`.
    NonTerminal { node: u16 },
}

/// Decoder for one Huffman block, built from the tree stored at its start.
#[derive(Debug, Clone)]
pub struct HuffmanDecoder<'a> {
    stream: BitCursor<'a>,
    nodes: Vec<DecodeNode>,
    lut: [LutEntry; 256],
}

/// Decompresses one block into `out`, which must be exactly the uncompressed size.
pub fn uncompress(data: &[u8], out: &mut [u8]) -> Result<(), HuffmanError> {
    if data.is_empty() {
        ensure!(out.is_empty(), EmptyBlockSnafu { expected: out.len() });
        return Ok(());
    }

    HuffmanDecoder::new(data)?.uncompress(out)
}

impl<'a> HuffmanDecoder<'a> {
    /// Reads the tree and builds the lookup table.
    pub fn new(data: &'a [u8]) -> Result<Self, HuffmanError> {
        let mut decoder = Self {
            stream: BitCursor::new(data),
            nodes: Vec::with_capacity(MAX_TREE_NODES),
            lut: [LutEntry::Invalid; 256],
        };
        decoder.recover_tree(0, 0)?;
        Ok(decoder)
    }

    fn recover_tree(&mut self, code: u32, bits: u32) -> Result<u16, HuffmanError> {
        ensure!(self.nodes.len() < MAX_TREE_NODES, TreeTooLargeSnafu);

        let index = self.nodes.len() as u16;
        self.nodes.push(DecodeNode::Leaf(0));

        if self.stream.read_bit().context(TruncatedSnafu)? == 1 {
            let symbol = self.stream.read_bits(SYMBOL_SIZE).context(TruncatedSnafu)? as u16;
            ensure!(usize::from(symbol) < NUM_SYMBOLS, UnknownSymbolSnafu { symbol });
            self.nodes[usize::from(index)] = DecodeNode::Leaf(symbol);

            if bits <= 8 {
                // A root leaf is coded with the single bit `0`.
                let bits = bits.max(1);
                for high in 0..(256 >> bits) {
                    self.lut[((high << bits) | code) as usize] = LutEntry::Terminal {
                        symbol,
                        bits: bits as u8,
                    };
                }
            }

            return Ok(index);
        }

        if bits == 8 {
            self.lut[code as usize] = LutEntry::NonTerminal { node: index };
        }

        let code_b = if bits < 8 { code | (1 << bits) } else { code };
        let a = self.recover_tree(code, bits + 1)?;
        let b = self.recover_tree(code_b, bits + 1)?;
        self.nodes[usize::from(index)] = DecodeNode::Branch { a, b };

        Ok(index)
    }

    /// Walks the tree bit by bit, starting at `node`, until a leaf is reached.
    #[inline]
    fn walk(&mut self, mut node: u16) -> Result<u16, HuffmanError> {
        loop {
            let current = self.nodes[usize::from(node)];
            match current {
                DecodeNode::Leaf(symbol) => return Ok(symbol),
                DecodeNode::Branch { a, b } => {
                    node = if self.stream.read_bit().context(TruncatedSnafu)? == 1 {
                        b
                    } else {
                        a
                    };
                }
            }
        }
    }

    /// Writes the expansion of `symbol` at `out[pos..]`, returns the new position.
    #[inline]
    fn emit(&mut self, symbol: u16, out: &mut [u8], pos: usize) -> Result<usize, HuffmanError> {
        if let Ok(byte) = u8::try_from(symbol) {
            out[pos] = byte;
            return Ok(pos + 1);
        }

        let bucket = run_bucket(symbol).context(UnknownSymbolSnafu { symbol })?;
        let extra = self
            .stream
            .read_bits(bucket.extra_bits)
            .context(TruncatedSnafu)?;
        let run = bucket.base + extra as usize;

        let remaining = out.len() - pos;
        ensure!(run <= remaining, RunOverflowSnafu { run, remaining });
        out[pos..pos + run].fill(0);

        Ok(pos + run)
    }

    fn finish(&self) -> Result<(), HuffmanError> {
        ensure!(
            self.stream.at_end(),
            TrailingDataSnafu {
                consumed_bits: self.stream.bit_position(),
                total_bits: self.stream.total_bits(),
            }
        );
        Ok(())
    }

    /// Decodes the block into `out`, using the lookup table for codes of up to 8 bits.
    pub fn uncompress(mut self, out: &mut [u8]) -> Result<(), HuffmanError> {
        let mut pos = 0;
        while pos < out.len() {
            let entry = self.lut[usize::from(self.stream.peek_byte())];
            let symbol = match entry {
                LutEntry::Terminal { symbol, bits } => {
                    self.stream
                        .advance(usize::from(bits))
                        .context(TruncatedSnafu)?;
                    symbol
                }
                LutEntry::NonTerminal { node } => {
                    self.stream.advance(8).context(TruncatedSnafu)?;
                    self.walk(node)?
                }
                LutEntry::Invalid => return InvalidCodeSnafu.fail(),
            };

            pos = self.emit(symbol, out, pos)?;
        }

        self.finish()
    }

    /// Decodes the block into `out` by walking the tree one bit at a time.
    ///
    /// Produces the same output as [`uncompress`](Self::uncompress); it exists to cross-check
    /// the lookup table.
    pub fn uncompress_tree_walk(mut self, out: &mut [u8]) -> Result<(), HuffmanError> {
        let mut pos = 0;
        while pos < out.len() {
            let root = self.nodes[0];
            let symbol = match root {
                DecodeNode::Leaf(symbol) => {
                    let bit = self.stream.read_bit().context(TruncatedSnafu)?;
                    ensure!(bit == 0, InvalidCodeSnafu);
                    symbol
                }
                DecodeNode::Branch { .. } => self.walk(0)?,
            };

            pos = self.emit(symbol, out, pos)?;
        }

        self.finish()
    }
}
