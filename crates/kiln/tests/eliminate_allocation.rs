mod common;

use kiln::context::Context;
use kiln::ops::Allocate;
use kiln::pass::{Pass, Target};
use kiln::passes::{DeadCodeElimination, EliminateAllocation};
use kiln::program::Program;

use common::{f32_shape, no_allocate, PassOp};

struct EliminateAllocationTarget {
    alignment: usize,
}

impl Target for EliminateAllocationTarget {
    fn name(&self) -> &str {
        "eliminate_allocation_test"
    }

    fn get_passes(&self, _ctx: &mut Context) -> Vec<Box<dyn Pass>> {
        vec![
            Box::new(EliminateAllocation::new("allocate", self.alignment)),
            Box::new(DeadCodeElimination),
        ]
    }
}

fn chain_of_three(lens: [usize; 3]) -> Program {
    let mut p = Program::new();
    let a1 = p
        .add_instruction(Allocate::new(f32_shape([lens[0]])), &[])
        .unwrap();
    let p1 = p.add_instruction(PassOp, &[a1]).unwrap();
    let a2 = p
        .add_instruction(Allocate::new(f32_shape([lens[1]])), &[])
        .unwrap();
    let p2 = p.add_instruction(PassOp, &[a2, p1]).unwrap();
    let a3 = p
        .add_instruction(Allocate::new(f32_shape([lens[2]])), &[])
        .unwrap();
    p.add_instruction(PassOp, &[a3, p2]).unwrap();
    p
}

#[test]
fn packs_sequentially() {
    let mut p = chain_of_three([8, 40, 200]);
    p.compile(&EliminateAllocationTarget { alignment: 32 }).unwrap();
    assert_eq!(p.get_shape().unwrap(), f32_shape([200usize; 1]));
    assert_eq!(
        p.get_parameter_shape("memory").unwrap().bytes(),
        8 * 4 + 40 * 4 + 200 * 4
    );
    assert!(no_allocate(&p));
}

#[test]
fn rounds_each_offset_up_to_the_alignment() {
    let mut p = chain_of_three([1, 2, 200]);
    p.compile(&EliminateAllocationTarget { alignment: 32 }).unwrap();
    assert_eq!(p.get_shape().unwrap(), f32_shape([200usize; 1]));
    assert_eq!(p.get_parameter_shape("memory").unwrap().bytes(), 32 + 32 + 800);
}

#[test]
fn byte_alignment_packs_exactly() {
    let mut p = chain_of_three([1, 2, 200]);
    p.compile(&EliminateAllocationTarget { alignment: 1 }).unwrap();
    assert_eq!(p.get_shape().unwrap(), f32_shape([200usize; 1]));
    assert_eq!(
        p.get_parameter_shape("memory").unwrap().bytes(),
        1 * 4 + 2 * 4 + 200 * 4
    );
}

#[test]
fn element_alignment_packs_exactly() {
    let mut p = chain_of_three([1, 2, 200]);
    p.compile(&EliminateAllocationTarget { alignment: 4 }).unwrap();
    assert_eq!(p.get_shape().unwrap(), f32_shape([200usize; 1]));
    assert_eq!(
        p.get_parameter_shape("memory").unwrap().bytes(),
        1 * 4 + 2 * 4 + 200 * 4
    );
}

#[test]
fn loads_view_into_the_memory_parameter() {
    let mut p = chain_of_three([8, 40, 200]);
    p.compile(&EliminateAllocationTarget { alignment: 32 }).unwrap();
    let memory = p.get_parameter("memory").unwrap();
    for (_, ins) in p.iter() {
        if ins.name() == "load" {
            assert_eq!(ins.inputs(), &[memory]);
        }
    }
    assert_eq!(common::count_named(&p, "load"), 3);
}
