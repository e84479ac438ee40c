//! Cross-stream ordering analysis.
//!
//! Instructions carrying a stream id form a DAG: program order chains each
//! stream, and a `WAIT_EVENT` instruction is ordered after the `RECORD_EVENT`
//! instructions it synchronizes with. Synchronization edges come from data
//! dependencies (a waiting instruction pairs with each cross-stream recording
//! input); a wait with no such input falls back to the nearest prior
//! cross-stream record. Reachability over this DAG gives happens-before;
//! everything else on another stream is concurrent. Dominators are computed
//! over the same DAG.

use std::collections::HashMap;

use crate::instruction::{InsRef, RECORD_EVENT, WAIT_EVENT};
use crate::program::Program;

#[derive(Clone, Debug, PartialEq)]
struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn new(len: usize) -> Self {
        BitSet {
            words: vec![0; len.div_ceil(64)],
        }
    }

    fn full(len: usize) -> Self {
        let mut set = BitSet::new(len);
        for (i, word) in set.words.iter_mut().enumerate() {
            let remaining = len - i * 64;
            *word = if remaining >= 64 {
                u64::MAX
            } else {
                (1u64 << remaining) - 1
            };
        }
        set
    }

    fn insert(&mut self, bit: usize) {
        self.words[bit / 64] |= 1 << (bit % 64);
    }

    fn contains(&self, bit: usize) -> bool {
        self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    fn union_with(&mut self, other: &BitSet) {
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= o;
        }
    }

    fn intersect_with(&mut self, other: &BitSet) {
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w &= o;
        }
    }
}

/// Happens-before and dominance over the stream-assigned instructions of a
/// program.
pub struct StreamGraph {
    nodes: Vec<InsRef>,
    streams: Vec<u32>,
    index: HashMap<InsRef, usize>,
    ancestors: Vec<BitSet>,
    dominators: Vec<BitSet>,
}

impl StreamGraph {
    pub fn analyze(prog: &Program) -> Self {
        let mut nodes = Vec::new();
        let mut streams = Vec::new();
        for (r, ins) in prog.iter() {
            if let Some(stream) = ins.stream() {
                nodes.push(r);
                streams.push(stream);
            }
        }
        let index: HashMap<InsRef, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, &r)| (r, i))
            .collect();

        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        let mut last_on_stream: HashMap<u32, usize> = HashMap::new();
        for (i, &stream) in streams.iter().enumerate() {
            if let Some(&prev) = last_on_stream.get(&stream) {
                preds[i].push(prev);
            }
            last_on_stream.insert(stream, i);
        }

        for (i, &r) in nodes.iter().enumerate() {
            let ins = prog.instruction(r).expect("stream graph ref must be live");
            if !ins.has_mask(WAIT_EVENT) {
                continue;
            }
            let mut paired = false;
            for &input in ins.inputs() {
                let Some(&src) = index.get(&input) else {
                    continue;
                };
                let producer = prog.instruction(input).expect("stream graph ref must be live");
                if streams[src] != streams[i] && producer.has_mask(RECORD_EVENT) {
                    preds[i].push(src);
                    paired = true;
                }
            }
            if !paired {
                // No recording input; pair with the nearest prior record on
                // another stream.
                for j in (0..i).rev() {
                    let candidate = prog
                        .instruction(nodes[j])
                        .expect("stream graph ref must be live");
                    if streams[j] != streams[i] && candidate.has_mask(RECORD_EVENT) {
                        preds[i].push(j);
                        break;
                    }
                }
            }
        }

        // Predecessors always precede their node in program order, so one
        // forward sweep settles both relations.
        let mut ancestors = Vec::with_capacity(nodes.len());
        let mut dominators: Vec<BitSet> = Vec::with_capacity(nodes.len());
        for i in 0..nodes.len() {
            let mut reach = BitSet::new(nodes.len());
            let mut dom = if preds[i].is_empty() {
                BitSet::new(nodes.len())
            } else {
                BitSet::full(nodes.len())
            };
            for &p in &preds[i] {
                reach.union_with(&ancestors[p]);
                reach.insert(p);
                dom.intersect_with(&dominators[p]);
            }
            dom.insert(i);
            ancestors.push(reach);
            dominators.push(dom);
        }

        StreamGraph {
            nodes,
            streams,
            index,
            ancestors,
            dominators,
        }
    }

    pub fn is_streamed(&self, ins: InsRef) -> bool {
        self.index.contains_key(&ins)
    }

    /// True when `a` happens before (or is) `b`.
    pub fn ordered(&self, a: InsRef, b: InsRef) -> bool {
        if a == b {
            return true;
        }
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&ia), Some(&ib)) => self.ancestors[ib].contains(ia),
            _ => false,
        }
    }

    /// True when neither instruction is ordered relative to the other.
    pub fn concurrent(&self, a: InsRef, b: InsRef) -> bool {
        if !self.is_streamed(a) || !self.is_streamed(b) {
            return false;
        }
        !self.ordered(a, b) && !self.ordered(b, a)
    }

    /// True when every path to `b` passes through `a`.
    pub fn dominates(&self, a: InsRef, b: InsRef) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&ia), Some(&ib)) => self.dominators[ib].contains(ia),
            _ => false,
        }
    }

    /// The streamed instructions concurrent with `ins`, in program order.
    pub fn concurrent_set(&self, ins: InsRef) -> Vec<InsRef> {
        self.nodes
            .iter()
            .filter(|&&other| other != ins && self.concurrent(ins, other))
            .copied()
            .collect()
    }

    /// The stream carried by a node of this graph.
    pub fn stream_of(&self, ins: InsRef) -> Option<u32> {
        self.index.get(&ins).map(|&i| self.streams[i])
    }
}
