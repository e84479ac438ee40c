//! The owning instruction graph and its editing primitives.
//!
//! All invariant maintenance lives here: every edit re-runs shape inference
//! where needed, keeps input/output edges symmetric, and preserves
//! topological order. Failed edits return an error without publishing
//! partial state.

use std::collections::HashMap;
use std::fmt;

use crate::argument::Argument;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::instruction::{InsRef, Instruction};
use crate::literal::Literal;
use crate::op::Operation;
use crate::ops::{LiteralOp, Outline, Param};
use crate::pass::Target;
use crate::shape::Shape;

/// A directed acyclic graph of tensor instructions in execution order.
pub struct Program {
    nodes: Vec<Option<Instruction>>,
    order: Vec<InsRef>,
    context: Option<Context>,
}

impl Program {
    pub fn new() -> Self {
        Program {
            nodes: Vec::new(),
            order: Vec::new(),
            context: None,
        }
    }

    // ---- queries ------------------------------------------------------

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has_instruction(&self, ins: InsRef) -> bool {
        self.nodes
            .get(ins.0 as usize)
            .map_or(false, |slot| slot.is_some())
    }

    pub fn instruction(&self, ins: InsRef) -> Option<&Instruction> {
        self.nodes.get(ins.0 as usize)?.as_ref()
    }

    /// Program-order snapshot of the live instruction refs.
    pub fn refs(&self) -> Vec<InsRef> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = (InsRef, &Instruction)> + '_ {
        self.order.iter().map(move |&r| (r, self.node(r)))
    }

    /// Position of an instruction in program order.
    pub fn position(&self, ins: InsRef) -> Option<usize> {
        self.order.iter().position(|&r| r == ins)
    }

    pub fn last(&self) -> Option<InsRef> {
        self.order.last().copied()
    }

    /// Shape of the final instruction.
    pub fn get_shape(&self) -> Option<Shape> {
        self.last().map(|r| self.node(r).shape.clone())
    }

    pub fn get_parameter(&self, name: &str) -> Option<InsRef> {
        self.iter()
            .find(|(_, ins)| {
                ins.op()
                    .downcast_ref::<Param>()
                    .map_or(false, |p| p.name == name)
            })
            .map(|(r, _)| r)
    }

    pub fn get_parameter_shape(&self, name: &str) -> Option<Shape> {
        self.get_parameter(name)
            .map(|r| self.node(r).shape.clone())
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.iter()
            .filter_map(|(_, ins)| ins.op().downcast_ref::<Param>().map(|p| p.name.clone()))
            .collect()
    }

    fn node(&self, ins: InsRef) -> &Instruction {
        self.nodes[ins.0 as usize]
            .as_ref()
            .expect("instruction ref must be live")
    }

    fn node_mut(&mut self, ins: InsRef) -> &mut Instruction {
        self.nodes[ins.0 as usize]
            .as_mut()
            .expect("instruction ref must be live")
    }

    fn check_live(&self, ins: InsRef) -> Result<()> {
        if !self.has_instruction(ins) {
            return Err(Error::edge(format!("unknown instruction ref {ins}")));
        }
        Ok(())
    }

    // ---- construction -------------------------------------------------

    /// Appends an instruction, running shape inference and wiring edges.
    pub fn add_instruction<O: Into<Operation>>(&mut self, op: O, inputs: &[InsRef]) -> Result<InsRef> {
        let at = self.order.len();
        self.insert_at(at, op.into(), inputs.to_vec())
    }

    /// Inserts an instruction before `before`.
    pub fn insert_instruction<O: Into<Operation>>(
        &mut self,
        before: InsRef,
        op: O,
        inputs: &[InsRef],
    ) -> Result<InsRef> {
        self.check_live(before)?;
        let at = self.position(before).expect("live ref must have a position");
        self.insert_at(at, op.into(), inputs.to_vec())
    }

    /// Appends a named input with the given shape.
    pub fn add_parameter(&mut self, name: &str, shape: Shape) -> Result<InsRef> {
        let at = self.order.len();
        self.insert_parameter_at(at, name, shape)
    }

    /// Inserts a named input before `before`; memory planners use this to
    /// put `scratch`/`memory` ahead of the first view into it.
    pub fn insert_parameter(&mut self, before: InsRef, name: &str, shape: Shape) -> Result<InsRef> {
        self.check_live(before)?;
        let at = self.position(before).expect("live ref must have a position");
        self.insert_parameter_at(at, name, shape)
    }

    pub fn add_literal(&mut self, literal: Literal) -> Result<InsRef> {
        self.add_instruction(LiteralOp { literal }, &[])
    }

    /// Appends a shape-only placeholder (no storage).
    pub fn add_outline(&mut self, shape: Shape) -> Result<InsRef> {
        self.add_instruction(Outline { shape }, &[])
    }

    fn insert_parameter_at(&mut self, at: usize, name: &str, shape: Shape) -> Result<InsRef> {
        if self.get_parameter(name).is_some() {
            return Err(Error::edge(format!("duplicate parameter \"{name}\"")));
        }
        let op = Param {
            name: name.to_string(),
            shape,
        };
        self.insert_at(at, Operation::new(op), Vec::new())
    }

    fn insert_at(&mut self, at: usize, op: Operation, inputs: Vec<InsRef>) -> Result<InsRef> {
        for &input in &inputs {
            self.check_live(input)?;
            let pos = self.position(input).expect("live ref must have a position");
            if pos >= at {
                return Err(Error::edge(format!(
                    "input {input} does not precede the insertion point"
                )));
            }
        }
        let input_shapes: Vec<Shape> = inputs.iter().map(|&r| self.node(r).shape.clone()).collect();
        let shape = op.compute_shape(&input_shapes)?;
        let ins = InsRef(self.nodes.len() as u32);
        self.nodes.push(Some(Instruction::new(op, shape, inputs)));
        self.order.insert(at, ins);
        self.attach(ins);
        Ok(ins)
    }

    // ---- editing ------------------------------------------------------

    /// Rewrites `ins` in place with a new operator and inputs, re-running
    /// shape inference here and on every downstream user whose input shape
    /// changes. Nothing is mutated if any inference fails.
    pub fn replace_instruction<O: Into<Operation>>(
        &mut self,
        ins: InsRef,
        op: O,
        inputs: &[InsRef],
    ) -> Result<InsRef> {
        let op = op.into();
        self.check_live(ins)?;
        let at = self.position(ins).expect("live ref must have a position");
        for &input in inputs {
            self.check_live(input)?;
            let pos = self.position(input).expect("live ref must have a position");
            if pos >= at {
                return Err(Error::edge(format!(
                    "input {input} would not precede {ins} after the rewrite"
                )));
            }
        }
        let input_shapes: Vec<Shape> =
            inputs.iter().map(|&r| self.node(r).shape.clone()).collect();
        let shape = op.compute_shape(&input_shapes)?;
        let updates = self.plan_shape_updates(ins, shape.clone())?;

        self.detach(ins);
        {
            let node = self.node_mut(ins);
            node.op = op;
            node.inputs = inputs.to_vec();
            node.shape = shape;
        }
        self.attach(ins);
        self.commit_shape_updates(updates);
        Ok(ins)
    }

    /// Redirects every user of `ins` to `rep`, then removes `ins` if dead.
    ///
    /// The two instructions must agree on lens; stride changes are allowed
    /// and trigger downstream shape re-inference. Replacing the terminal
    /// instruction instead rewrites it to `identity(rep)` so the program
    /// keeps producing a value.
    pub fn replace_with(&mut self, ins: InsRef, rep: InsRef) -> Result<()> {
        self.check_live(ins)?;
        self.check_live(rep)?;
        if ins == rep {
            return Ok(());
        }
        if self.node(ins).shape.lens() != self.node(rep).shape.lens() {
            return Err(Error::edge(format!(
                "cannot replace {ins} ({}) with {rep} ({}): lens differ",
                self.node(ins).shape,
                self.node(rep).shape
            )));
        }
        if self.last() == Some(ins) {
            self.replace_instruction(ins, crate::ops::Identity, &[rep])?;
            return Ok(());
        }
        let rep_pos = self.position(rep).expect("live ref must have a position");
        let users = self.node(ins).outputs.clone();
        for &user in &users {
            let user_pos = self.position(user).expect("live ref must have a position");
            if user_pos <= rep_pos {
                return Err(Error::edge(format!(
                    "user {user} of {ins} would precede its new input {rep}"
                )));
            }
        }

        let rep_shape = self.node(rep).shape.clone();
        let updates = if self.node(ins).shape == rep_shape {
            Vec::new()
        } else {
            self.plan_user_shape_updates(ins, &rep_shape)?
        };

        for &user in &users {
            let node = self.node_mut(user);
            for input in node.inputs.iter_mut() {
                if *input == ins {
                    *input = rep;
                }
            }
        }
        self.node_mut(ins).outputs.clear();
        for &user in &users {
            let outputs = &mut self.node_mut(rep).outputs;
            if !outputs.contains(&user) {
                outputs.push(user);
            }
        }
        self.commit_shape_updates(updates);
        self.remove_instruction(ins)
    }

    /// Repositions `ins` before `before` without touching edges.
    pub fn move_instruction(&mut self, ins: InsRef, before: InsRef) -> Result<()> {
        self.check_live(ins)?;
        self.check_live(before)?;
        if ins == before {
            return Ok(());
        }
        let from = self.position(ins).expect("live ref must have a position");
        self.order.remove(from);
        let to = self.position(before).expect("live ref must have a position");
        self.order.insert(to, ins);

        let node = self.node(ins);
        let pos = to;
        let inputs_ok = node
            .inputs
            .iter()
            .all(|&i| self.position(i).expect("live ref") < pos);
        let outputs_ok = node
            .outputs
            .iter()
            .all(|&o| self.position(o).expect("live ref") > pos);
        if !inputs_ok || !outputs_ok {
            // Roll the move back before reporting.
            self.order.remove(to);
            self.order.insert(from, ins);
            return Err(Error::edge(format!(
                "moving {ins} before {before} violates topological order"
            )));
        }
        Ok(())
    }

    /// Removes a dead instruction; fails while it still has users.
    pub fn remove_instruction(&mut self, ins: InsRef) -> Result<()> {
        self.check_live(ins)?;
        if !self.node(ins).outputs.is_empty() {
            return Err(Error::edge(format!("{ins} still has live outputs")));
        }
        self.detach(ins);
        let at = self.position(ins).expect("live ref must have a position");
        self.order.remove(at);
        self.nodes[ins.0 as usize] = None;
        Ok(())
    }

    /// Assigns the execution stream of an instruction.
    pub fn set_stream(&mut self, ins: InsRef, stream: u32) -> Result<()> {
        self.check_live(ins)?;
        self.node_mut(ins).stream = Some(stream);
        Ok(())
    }

    /// Adds event bits (`RECORD_EVENT` / `WAIT_EVENT`) to an instruction.
    pub fn add_mask(&mut self, ins: InsRef, mask: u8) -> Result<()> {
        self.check_live(ins)?;
        self.node_mut(ins).mask |= mask;
        Ok(())
    }

    fn attach(&mut self, ins: InsRef) {
        let inputs = self.node(ins).inputs.clone();
        for input in inputs {
            let outputs = &mut self.node_mut(input).outputs;
            if !outputs.contains(&ins) {
                outputs.push(ins);
            }
        }
    }

    fn detach(&mut self, ins: InsRef) {
        let inputs = self.node(ins).inputs.clone();
        for input in inputs {
            self.node_mut(input).outputs.retain(|&o| o != ins);
        }
    }

    /// Simulates downstream shape inference assuming `ins` takes `shape`,
    /// returning the full set of cache updates or the first failure.
    fn plan_shape_updates(&self, ins: InsRef, shape: Shape) -> Result<Vec<(InsRef, Shape)>> {
        let mut updated: HashMap<InsRef, Shape> = HashMap::new();
        let start = self.position(ins).expect("live ref must have a position");
        if self.node(ins).shape != shape {
            updated.insert(ins, shape);
        }
        for &r in &self.order[start + 1..] {
            let node = self.node(r);
            if !node.inputs.iter().any(|i| updated.contains_key(i)) {
                continue;
            }
            let input_shapes: Vec<Shape> = node
                .inputs
                .iter()
                .map(|i| {
                    updated
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| self.node(*i).shape.clone())
                })
                .collect();
            let new_shape = node.op.compute_shape(&input_shapes)?;
            if new_shape != node.shape {
                updated.insert(r, new_shape);
            }
        }
        Ok(updated.into_iter().collect())
    }

    /// Like `plan_shape_updates`, but for rewiring the users of `ins` to an
    /// instruction with shape `rep_shape` while `ins` itself goes away.
    fn plan_user_shape_updates(&self, ins: InsRef, rep_shape: &Shape) -> Result<Vec<(InsRef, Shape)>> {
        let mut updated: HashMap<InsRef, Shape> = HashMap::new();
        updated.insert(ins, rep_shape.clone());
        let start = self.position(ins).expect("live ref must have a position");
        for &r in &self.order[start + 1..] {
            let node = self.node(r);
            if !node.inputs.iter().any(|i| updated.contains_key(i)) {
                continue;
            }
            let input_shapes: Vec<Shape> = node
                .inputs
                .iter()
                .map(|i| {
                    updated
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| self.node(*i).shape.clone())
                })
                .collect();
            let new_shape = node.op.compute_shape(&input_shapes)?;
            if new_shape != node.shape {
                updated.insert(r, new_shape);
            }
        }
        updated.remove(&ins);
        Ok(updated.into_iter().collect())
    }

    fn commit_shape_updates(&mut self, updates: Vec<(InsRef, Shape)>) {
        for (r, shape) in updates {
            self.node_mut(r).shape = shape;
        }
    }

    // ---- validation ---------------------------------------------------

    /// Re-checks topological order, edge symmetry, and the shape cache.
    pub fn validate(&self) -> Result<()> {
        let mut seen: HashMap<InsRef, usize> = HashMap::new();
        for (pos, &r) in self.order.iter().enumerate() {
            if !self.has_instruction(r) {
                return Err(Error::edge(format!("dangling ref {r} in program order")));
            }
            seen.insert(r, pos);
        }
        for (pos, &r) in self.order.iter().enumerate() {
            let node = self.node(r);
            for &input in &node.inputs {
                let Some(&ipos) = seen.get(&input) else {
                    return Err(Error::edge(format!("{r} reads removed instruction {input}")));
                };
                if ipos >= pos {
                    return Err(Error::edge(format!("{r} reads {input} before it runs")));
                }
                if !self.node(input).outputs.contains(&r) {
                    return Err(Error::edge(format!("edge {input} -> {r} missing back-edge")));
                }
            }
            for &output in &node.outputs {
                if !seen.contains_key(&output)
                    || !self.node(output).inputs.contains(&r)
                {
                    return Err(Error::edge(format!("stale back-edge {r} -> {output}")));
                }
            }
            let input_shapes: Vec<Shape> = node
                .inputs
                .iter()
                .map(|&i| self.node(i).shape.clone())
                .collect();
            let expected = node.op.compute_shape(&input_shapes)?;
            if expected != node.shape {
                return Err(Error::edge(format!(
                    "{r} caches shape {} but its operator infers {}",
                    node.shape, expected
                )));
            }
        }
        Ok(())
    }

    // ---- compilation & evaluation ------------------------------------

    /// Runs the target's passes in order, then finalizes operators.
    pub fn compile(&mut self, target: &dyn Target) -> Result<()> {
        let mut ctx = target.get_context();
        let stats = crate::env::pass_stats_enabled();
        for pass in target.get_passes(&mut ctx) {
            let started = std::time::Instant::now();
            pass.apply(self, &mut ctx).map_err(|e| Error::Pass {
                pass: pass.name(),
                source: Box::new(e),
            })?;
            if cfg!(debug_assertions) {
                self.validate().map_err(|e| Error::Pass {
                    pass: pass.name(),
                    source: Box::new(e),
                })?;
            }
            if stats {
                println!(
                    "[kiln] pass {:<24} instructions={:<5} elapsed={:?}",
                    pass.name(),
                    self.len(),
                    started.elapsed()
                );
            }
        }
        for r in self.refs() {
            if !self.has_instruction(r) {
                continue;
            }
            let node = self.node(r);
            if !node.op.has_finalize() {
                continue;
            }
            let shape = node.shape.clone();
            let input_shapes: Vec<Shape> = node
                .inputs
                .iter()
                .map(|&i| self.node(i).shape.clone())
                .collect();
            let mut op = node.op.clone();
            op.finalize(&mut ctx, &shape, &input_shapes)?;
            self.node_mut(r).op = op;
        }
        self.context = Some(ctx);
        Ok(())
    }

    /// Executes the program over the given parameter bindings, returning the
    /// terminal instruction's argument.
    pub fn eval(&mut self, params: &HashMap<String, Argument>) -> Result<Argument> {
        let mut ctx = self.context.take().unwrap_or_default();
        let result = self.eval_with(&mut ctx, params);
        self.context = Some(ctx);
        result
    }

    fn eval_with(
        &self,
        ctx: &mut Context,
        params: &HashMap<String, Argument>,
    ) -> Result<Argument> {
        let mut results: HashMap<InsRef, Argument> = HashMap::new();
        let mut last = None;
        for &r in &self.order {
            let node = self.node(r);
            let arg = if let Some(param) = node.op.downcast_ref::<Param>() {
                let bound = params.get(&param.name).ok_or_else(|| {
                    Error::runtime("@param", format!("missing parameter \"{}\"", param.name))
                })?;
                if bound.shape().lens() != node.shape.lens() {
                    return Err(Error::runtime(
                        "@param",
                        format!(
                            "parameter \"{}\" expects {}, got {}",
                            param.name,
                            node.shape,
                            bound.shape()
                        ),
                    ));
                }
                bound.clone()
            } else {
                let args: Vec<Argument> = node
                    .inputs
                    .iter()
                    .map(|i| results[i].clone())
                    .collect();
                node.op.compute_with_context(ctx, &node.shape, &args)?
            };
            results.insert(r, arg.clone());
            last = Some(arg);
        }
        last.ok_or_else(|| Error::runtime("eval", "cannot evaluate an empty program"))
    }
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

impl Clone for Program {
    fn clone(&self) -> Self {
        Program {
            nodes: self.nodes.clone(),
            order: self.order.clone(),
            context: None,
        }
    }
}

impl PartialEq for Program {
    /// Structural equality over the instruction sequence: operators, shapes,
    /// and input positions. Contexts are ignored.
    fn eq(&self, other: &Program) -> bool {
        if self.order.len() != other.order.len() {
            return false;
        }
        let pos_a: HashMap<InsRef, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &r)| (r, i))
            .collect();
        let pos_b: HashMap<InsRef, usize> = other
            .order
            .iter()
            .enumerate()
            .map(|(i, &r)| (r, i))
            .collect();
        self.iter().zip(other.iter()).all(|((_, a), (_, b))| {
            a.op() == b.op()
                && a.shape() == b.shape()
                && a.inputs().len() == b.inputs().len()
                && a.inputs()
                    .iter()
                    .zip(b.inputs())
                    .all(|(x, y)| pos_a[x] == pos_b[y])
        })
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let positions: HashMap<InsRef, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &r)| (r, i))
            .collect();
        for (pos, (_, ins)) in self.iter().enumerate() {
            write!(f, "%{pos} = {}", ins.op())?;
            if !ins.inputs().is_empty() {
                write!(f, "(")?;
                for (i, input) in ins.inputs().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "%{}", positions[input])?;
                }
                write!(f, ")")?;
            }
            writeln!(f, " -> {}", ins.shape())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}
