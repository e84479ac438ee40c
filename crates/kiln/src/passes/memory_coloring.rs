//! Live-range memory planning.
//!
//! Every `allocate` becomes a `load` view into one `scratch` parameter. An
//! allocation's live range runs from its allocator to the last reader of any
//! instruction in its alias chain (consumers whose output aliases an input
//! write into that input's buffer, so they extend the range). Two
//! allocations interfere when their ranges overlap, or when their streamed
//! writers are concurrently reachable across streams. Placement is lowest
//! aligned offset first, largest allocation first.

use std::collections::HashMap;

use crate::context::Context;
use crate::dom::StreamGraph;
use crate::error::Result;
use crate::instruction::InsRef;
use crate::ops::Load;
use crate::pass::Pass;
use crate::program::Program;
use crate::shape::{DType, Shape};

/// The live-range planner; the default memory pass.
#[derive(Debug)]
pub struct MemoryColoring {
    allocation_op: String,
    alignment: usize,
    enable_concurrency: bool,
}

impl MemoryColoring {
    pub fn new(allocation_op: &str, alignment: usize) -> Self {
        MemoryColoring {
            allocation_op: allocation_op.to_string(),
            alignment: alignment.max(1),
            enable_concurrency: true,
        }
    }

    pub fn sequential_only(mut self) -> Self {
        self.enable_concurrency = false;
        self
    }
}

impl Default for MemoryColoring {
    fn default() -> Self {
        MemoryColoring::new("allocate", 32)
    }
}

#[derive(Debug)]
struct Allocation {
    ins: InsRef,
    shape: Shape,
    begin: usize,
    end: usize,
    /// Alias-chain members carrying a stream id.
    writers: Vec<InsRef>,
}

impl Allocation {
    fn bytes(&self) -> usize {
        self.shape.bytes()
    }
}

impl Pass for MemoryColoring {
    fn name(&self) -> &'static str {
        "memory_coloring"
    }

    fn apply(&self, prog: &mut Program, _ctx: &mut Context) -> Result<()> {
        self.absorb_output_parameter(prog)?;

        let allocs = self.collect(prog);
        if allocs.is_empty() {
            return Ok(());
        }
        let graph = if self.enable_concurrency {
            Some(StreamGraph::analyze(prog))
        } else {
            None
        };

        // Largest first; ties open earliest-first so the layout is stable.
        let mut order: Vec<usize> = (0..allocs.len()).collect();
        order.sort_by(|&a, &b| {
            allocs[b]
                .bytes()
                .cmp(&allocs[a].bytes())
                .then(allocs[a].begin.cmp(&allocs[b].begin))
                .then(allocs[a].ins.cmp(&allocs[b].ins))
        });

        let mut offsets: Vec<usize> = vec![0; allocs.len()];
        let mut placed: Vec<usize> = Vec::with_capacity(allocs.len());
        let mut scratch_bytes = 0usize;
        for &i in &order {
            if allocs[i].bytes() == 0 {
                placed.push(i);
                continue;
            }
            let mut taken: Vec<(usize, usize)> = placed
                .iter()
                .filter(|&&j| allocs[j].bytes() > 0 && self.interfere(&allocs[i], &allocs[j], &graph))
                .map(|&j| (offsets[j], offsets[j] + allocs[j].bytes()))
                .collect();
            taken.sort_unstable();
            let size = allocs[i].bytes();
            let mut offset = 0usize;
            for (start, end) in taken {
                if start < offset + size && end > offset {
                    offset = end.next_multiple_of(self.alignment);
                }
            }
            offsets[i] = offset;
            placed.push(i);
            let aligned = size.next_multiple_of(self.alignment);
            scratch_bytes = scratch_bytes.max(offset + aligned);
        }

        let first = prog.refs()[0];
        let scratch =
            prog.insert_parameter(first, "scratch", Shape::new(DType::Uint8, [scratch_bytes]))?;
        for (i, alloc) in allocs.iter().enumerate() {
            prog.replace_instruction(
                alloc.ins,
                Load {
                    shape: alloc.shape.clone(),
                    offset: offsets[i],
                },
                &[scratch],
            )?;
        }
        Ok(())
    }
}

impl MemoryColoring {
    /// Maps each instruction to the allocation whose buffer it writes, by
    /// following declared output aliases, and derives live ranges.
    fn collect(&self, prog: &Program) -> Vec<Allocation> {
        let positions: HashMap<InsRef, usize> = prog
            .refs()
            .into_iter()
            .enumerate()
            .map(|(i, r)| (r, i))
            .collect();
        let mut roots: HashMap<InsRef, InsRef> = HashMap::new();
        let mut allocs: Vec<Allocation> = Vec::new();
        let mut index: HashMap<InsRef, usize> = HashMap::new();

        for (r, ins) in prog.iter() {
            if ins.name() == self.allocation_op {
                roots.insert(r, r);
                index.insert(r, allocs.len());
                allocs.push(Allocation {
                    ins: r,
                    shape: ins.shape().clone(),
                    begin: positions[&r],
                    end: positions[&r],
                    writers: if ins.stream().is_some() { vec![r] } else { Vec::new() },
                });
                continue;
            }
            let input_shapes: Vec<Shape> = ins
                .inputs()
                .iter()
                .map(|&i| prog.instruction(i).expect("input must be live").shape().clone())
                .collect();
            if let Some(k) = ins.op().output_alias(&input_shapes) {
                let root = ins.inputs().get(k).and_then(|i| roots.get(i)).copied();
                if let Some(root) = root {
                    roots.insert(r, root);
                    let alloc = &mut allocs[index[&root]];
                    alloc.end = alloc.end.max(positions[&r]);
                    if ins.stream().is_some() {
                        alloc.writers.push(r);
                    }
                }
            }
        }

        // A chain member's readers keep the buffer live through their
        // position.
        for (r, ins) in prog.iter() {
            let Some(&root) = roots.get(&r) else { continue };
            let alloc = &mut allocs[index[&root]];
            for &user in ins.outputs() {
                alloc.end = alloc.end.max(positions[&user]);
            }
        }
        allocs
    }

    fn interfere(&self, a: &Allocation, b: &Allocation, graph: &Option<StreamGraph>) -> bool {
        if a.begin <= b.end && b.begin <= a.end {
            return true;
        }
        if let Some(graph) = graph {
            for &wa in &a.writers {
                for &wb in &b.writers {
                    if graph.concurrent(wa, wb) {
                        return true;
                    }
                }
            }
        }
        false
    }

    /// When a parameter named `output` is otherwise unused and the terminal
    /// instruction writes into an allocation of matching lens, the terminal
    /// chain writes into the output parameter directly and that allocation
    /// disappears.
    fn absorb_output_parameter(&self, prog: &mut Program) -> Result<()> {
        let Some(param) = prog.get_parameter("output") else {
            return Ok(());
        };
        if !prog
            .instruction(param)
            .expect("parameter must be live")
            .outputs()
            .is_empty()
        {
            return Ok(());
        }
        let Some(last) = prog.last() else {
            return Ok(());
        };
        // Walk the terminal's alias chain up to its allocation.
        let mut at = last;
        let root = loop {
            let ins = prog.instruction(at).expect("ref must be live");
            if ins.name() == self.allocation_op {
                break Some(at);
            }
            let input_shapes: Vec<Shape> = ins
                .inputs()
                .iter()
                .map(|&i| prog.instruction(i).expect("input must be live").shape().clone())
                .collect();
            match ins.op().output_alias(&input_shapes) {
                Some(k) => match ins.inputs().get(k) {
                    Some(&next) => at = next,
                    None => break None,
                },
                None => break None,
            }
        };
        let Some(root) = root else {
            return Ok(());
        };
        let root_lens = prog
            .instruction(root)
            .expect("ref must be live")
            .shape()
            .lens()
            .to_vec();
        let param_shape = prog
            .instruction(param)
            .expect("parameter must be live")
            .shape()
            .clone();
        if root_lens != param_shape.lens() {
            return Ok(());
        }
        prog.move_instruction(param, root)?;
        prog.replace_with(root, param)
    }
}
