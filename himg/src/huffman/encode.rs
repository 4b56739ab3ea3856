use super::{tokenize, MAX_TREE_DATA_SIZE, MAX_TREE_NODES, NUM_SYMBOLS, SYMBOL_SIZE};
use crate::bits::BitWriter;
use core::cmp::Reverse;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
enum EncodeNode {
    Leaf(u16),
    Branch { a: usize, b: usize },
}

#[derive(Debug, Clone, Copy, Default)]
struct SymbolCode {
    code: u64,
    bits: u32,
}

/// Worst-case size of a compressed block for `uncompressed_size` input bytes.
pub const fn max_compressed_size(uncompressed_size: usize) -> usize {
    uncompressed_size + MAX_TREE_DATA_SIZE
}

/// Counts how often each symbol is emitted for `data`, run tokens included.
pub fn histogram(data: &[u8]) -> [usize; NUM_SYMBOLS] {
    let mut counts = [0; NUM_SYMBOLS];
    for token in tokenize(data) {
        counts[usize::from(token.symbol())] += 1;
    }
    counts
}

/// Builds the tree by repeatedly joining the two lightest nodes.
///
/// Returns the node arena and the index of the root, which is a leaf when only one symbol
/// occurs. Equal weights are resolved by node index.
fn build_tree(counts: &[usize; NUM_SYMBOLS]) -> (Vec<EncodeNode>, Option<usize>) {
    let mut nodes = Vec::with_capacity(MAX_TREE_NODES);
    let mut heap = BinaryHeap::with_capacity(NUM_SYMBOLS);

    for (symbol, &count) in counts.iter().enumerate() {
        if count > 0 {
            heap.push(Reverse((count, nodes.len())));
            nodes.push(EncodeNode::Leaf(symbol as u16));
        }
    }

    while let Some(Reverse((count_a, a))) = heap.pop() {
        let Some(Reverse((count_b, b))) = heap.pop() else {
            return (nodes, Some(a));
        };

        heap.push(Reverse((count_a + count_b, nodes.len())));
        nodes.push(EncodeNode::Branch { a, b });
    }

    (nodes, None)
}

/// Writes the tree depth first and records the code of every leaf.
fn store_tree(
    nodes: &[EncodeNode],
    node: usize,
    codes: &mut [SymbolCode; NUM_SYMBOLS],
    w: &mut BitWriter,
    code: u64,
    bits: u32,
) {
    match nodes[node] {
        EncodeNode::Leaf(symbol) => {
            w.write_bits(1, 1);
            w.write_bits(u32::from(symbol), SYMBOL_SIZE);
            codes[usize::from(symbol)] = SymbolCode { code, bits };
        }
        EncodeNode::Branch { a, b } => {
            debug_assert!(bits < 64, "Huffman code longer than 64 bits");

            w.write_bits(0, 1);
            store_tree(nodes, a, codes, w, code, bits + 1);
            store_tree(nodes, b, codes, w, code | (1 << bits), bits + 1);
        }
    }
}

/// Compresses `input` as one self-contained block appended to `out`.
///
/// Returns the number of bytes written. An empty input produces an empty block.
pub fn compress(input: &[u8], out: &mut Vec<u8>) -> usize {
    if input.is_empty() {
        return 0;
    }

    let counts = histogram(input);
    let (nodes, root) = build_tree(&counts);
    let Some(root) = root else {
        return 0;
    };

    let mut w = BitWriter::new(out);
    let mut codes = [SymbolCode::default(); NUM_SYMBOLS];
    match nodes[root] {
        // A lone leaf still needs one bit per symbol to be decodable.
        EncodeNode::Leaf(_) => store_tree(&nodes, root, &mut codes, &mut w, 0, 1),
        EncodeNode::Branch { .. } => store_tree(&nodes, root, &mut codes, &mut w, 0, 0),
    }

    for token in tokenize(input) {
        let SymbolCode { code, bits } = codes[usize::from(token.symbol())];
        w.write_bits_u64(code, bits);

        let (extra, extra_bits) = token.extra_bits();
        w.write_bits(extra, extra_bits);
    }

    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_counts_tokens() {
        let data = [1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 2];
        let counts = histogram(&data);
        assert_eq!(counts[1], 2);
        assert_eq!(counts[2], 1);
        assert_eq!(counts[0], 1);
        // seven zeros
        assert_eq!(counts[258], 1);
        assert_eq!(counts.iter().sum::<usize>(), 5);
    }

    #[test]
    fn tree_is_prefix_free() {
        let mut counts = [0; NUM_SYMBOLS];
        for (i, c) in counts.iter_mut().enumerate() {
            *c = i % 7 + (i % 3) * 100;
        }
        let (nodes, root) = build_tree(&counts);
        let root = root.unwrap();

        let mut out = Vec::new();
        let mut w = BitWriter::new(&mut out);
        let mut codes = [SymbolCode::default(); NUM_SYMBOLS];
        store_tree(&nodes, root, &mut codes, &mut w, 0, 0);
        w.finish();

        let used = codes
            .iter()
            .enumerate()
            .filter(|(i, _)| counts[*i] > 0)
            .map(|(_, c)| *c)
            .collect::<Vec<_>>();
        for (i, x) in used.iter().enumerate() {
            for y in &used[i + 1..] {
                let bits = x.bits.min(y.bits);
                let mask = (1u64 << bits) - 1;
                assert_ne!(x.code & mask, y.code & mask, "{x:?} is a prefix of {y:?}");
            }
        }

        // Kraft equality for a full binary tree
        let kraft: f64 = used.iter().map(|c| 0.5f64.powi(c.bits as i32)).sum();
        assert!((kraft - 1.0).abs() < 1e-9);
    }

    #[test]
    fn single_symbol_gets_one_bit() {
        let mut out = Vec::new();
        let len = compress(&[42; 16], &mut out);
        // 10 bits of tree plus 16 one-bit codes
        assert_eq!(len, 4);
        assert_eq!(out.len(), 4);
    }
}
