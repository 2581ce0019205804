//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::rc::Rc;

use log::{debug, error};
use smallvec::SmallVec;

use crate::alloc::Allocator;
use crate::device::Device;
use crate::dtype::DType;
use crate::error::{GraphError, ShapeError};
use crate::ops::{BinaryKind, MatMul, OpKind, OutputShapes, Transpose, UnaryKind};
use crate::util::cold_path;
use crate::util::index_vec::IndexVec;
use crate::{ErrExtra, ErrPack};

pub mod memory;
pub mod operator;
pub mod optimize;
pub mod shape_infer;
pub mod sort;
pub mod tensor;

#[cfg(test)]
mod tests;

pub use operator::{OpData, OpIndex};
pub use tensor::{Blob, Fuid, Guid, TensorData, TensorIndex};

//--------------------------------------------------------------------------------------------------

type TensorVec = IndexVec<TensorIndex, TensorData>;
type OpVec = IndexVec<OpIndex, OpData>;

/// Dataflow graph of tensor operators.
///
/// Tensors and operators live in index-stable arenas. Removing a node only marks its slot
/// dead, so indexes held elsewhere never dangle. `tensor_list` and `op_list` hold the live
/// nodes in order; memory is planned in `tensor_list` order and, unless outputs are marked
/// explicitly, the last tensor in it is the graph output.
pub struct Graph {
	tensors: TensorVec,
	ops: OpVec,
	tensor_list: Vec<TensorIndex>,
	op_list: Vec<OpIndex>,
	outputs: Vec<TensorIndex>,
	next_guid: usize,
	next_fuid: usize,
	sorted: bool,
	allocator: Allocator,
}

impl Graph {
	pub fn new(device: Rc<dyn Device>) -> Self {
		Self::from_allocator(Allocator::with_default_alignment(device))
	}

	pub fn with_alignment(device: Rc<dyn Device>, alignment: usize) -> Self {
		Self::from_allocator(Allocator::new(device, alignment))
	}

	fn from_allocator(allocator: Allocator) -> Self {
		Self {
			tensors: TensorVec::with_capacity(32),
			ops: OpVec::with_capacity(32),
			tensor_list: Vec::new(),
			op_list: Vec::new(),
			outputs: Vec::new(),
			next_guid: 0,
			next_fuid: 0,
			sorted: false,
			allocator,
		}
	}

	fn new_guid(&mut self) -> Guid {
		let guid = Guid(self.next_guid);
		self.next_guid += 1;
		guid
	}

	fn new_fuid(&mut self) -> Fuid {
		let fuid = Fuid(self.next_fuid);
		self.next_fuid += 1;
		fuid
	}

	//-- queries

	pub fn tensor(&self, tensor: TensorIndex) -> &TensorData {
		&self.tensors[tensor]
	}

	pub fn operator(&self, op: OpIndex) -> &OpData {
		&self.ops[op]
	}

	/// Live tensors in order.
	pub fn tensors(&self) -> &[TensorIndex] {
		&self.tensor_list
	}

	/// Live operators in order. Topological once `sort()` succeeded.
	pub fn operators(&self) -> &[OpIndex] {
		&self.op_list
	}

	pub fn is_sorted(&self) -> bool {
		self.sorted
	}

	pub fn allocator(&self) -> &Allocator {
		&self.allocator
	}

	pub fn is_live_tensor(&self, tensor: TensorIndex) -> bool {
		self.tensors.get(tensor).is_some_and(|t| !t.is_dead)
	}

	pub fn is_live_operator(&self, op: OpIndex) -> bool {
		self.ops.get(op).is_some_and(|o| !o.is_dead)
	}

	/// First live tensor carrying the friendly id.
	pub fn tensor_by_fuid(&self, fuid: Fuid) -> Option<TensorIndex> {
		self.tensor_list.iter().copied().find(|&t| self.tensors[t].fuid == fuid)
	}

	/// Tensors the optimizer must keep alive even if nothing consumes them.
	pub fn is_output(&self, tensor: TensorIndex) -> bool {
		if self.outputs.is_empty() {
			self.tensor_list.last() == Some(&tensor)
		} else {
			self.outputs.contains(&tensor)
		}
	}

	pub fn mark_output(&mut self, tensor: TensorIndex) {
		assert!(self.is_live_tensor(tensor), "mark_output(): {tensor:?} is not in the graph");
		if !self.outputs.contains(&tensor) {
			self.outputs.push(tensor);
		}
	}

	//-- construction

	pub fn add_tensor(&mut self, shape: &[usize], dtype: DType) -> TensorIndex {
		let guid = self.new_guid();
		let fuid = self.new_fuid();
		let index = self.tensors.push(TensorData::new(guid, fuid, shape, dtype));
		self.tensor_list.push(index);
		index
	}

	/// New tensor object for the same logical value: fresh guid, same fuid, no edges.
	pub fn clone_tensor(&mut self, tensor: TensorIndex) -> TensorIndex {
		assert!(self.is_live_tensor(tensor), "clone_tensor(): {tensor:?} is not in the graph");
		let guid = self.new_guid();
		let src = &self.tensors[tensor];
		let data = TensorData::new(guid, src.fuid, &src.shape, src.dtype);
		let index = self.tensors.push(data);
		self.tensor_list.push(index);
		index
	}

	pub fn add_operator(
		&mut self,
		kind: OpKind,
		inputs: &[TensorIndex],
		outputs: &[TensorIndex],
	) -> Result<OpIndex, ErrPack<GraphError>> {
		self.check_new_operator(&kind, inputs, outputs)?;

		let guid = self.new_guid();
		let op = self.ops.push(OpData::new(guid, kind, inputs, outputs));
		self.op_list.push(op);
		self.connect(op);
		debug!(
			"add_operator(): {:?} {:?}, inputs {:?}, outputs {:?}",
			self.ops[op].op_type(),
			guid,
			inputs,
			outputs
		);
		Ok(op)
	}

	fn check_new_operator(
		&self,
		kind: &OpKind,
		inputs: &[TensorIndex],
		outputs: &[TensorIndex],
	) -> Result<(), ErrPack<GraphError>> {
		if inputs.len() != kind.num_inputs() || outputs.len() != kind.num_outputs() {
			cold_path();
			return Err(ErrPack::new(
				GraphError::InvalidOperator,
				format!(
					"{:?} expects {} inputs and {} outputs, got {} and {}",
					kind.op_type(),
					kind.num_inputs(),
					kind.num_outputs(),
					inputs.len(),
					outputs.len()
				),
			));
		}
		if let Some(t) = inputs.iter().chain(outputs).find(|&&t| !self.is_live_tensor(t)) {
			cold_path();
			return Err(ErrPack::new(
				GraphError::InvalidOperator,
				format!("tensor {t:?} is not in the graph"),
			));
		}
		if let OpKind::Transpose(transpose) = kind {
			if !transpose.is_valid_permutation() {
				cold_path();
				return Err(ErrPack::new(
					GraphError::InvalidOperator,
					format!("invalid permutation {:?}", transpose.permute),
				));
			}
		}
		for (i, &output) in outputs.iter().enumerate() {
			if let Some(producer) = self.tensors[output].producer {
				cold_path();
				return Err(ErrPack::new(
					GraphError::InvalidOperator,
					format!("tensor {output:?} is already produced by {:?}", self.ops[producer].guid),
				));
			}
			if inputs.contains(&output) || outputs[..i].contains(&output) {
				cold_path();
				return Err(ErrPack::new(
					GraphError::InvalidOperator,
					format!("tensor {output:?} is used twice by the same operator"),
				));
			}
		}
		Ok(())
	}

	/// Creates the output tensor with its inferred shape and adds the operator.
	/// The output has the dtype of the first input.
	fn add_operator_with_output(
		&mut self,
		kind: OpKind,
		inputs: &[TensorIndex],
	) -> Result<TensorIndex, ErrPack<GraphError>> {
		if let Some(t) = inputs.iter().find(|&&t| !self.is_live_tensor(t)) {
			cold_path();
			return Err(ErrPack::new(
				GraphError::InvalidOperator,
				format!("tensor {t:?} is not in the graph"),
			));
		}
		let mut shapes = self.output_shapes(&kind, inputs)?;
		let Some(shape) = shapes.pop() else {
			cold_path();
			return Err(ErrPack::new(GraphError::InvalidOperator, "operator has no outputs"));
		};
		let dtype = match inputs.first() {
			Some(&t) => self.tensors[t].dtype,
			None => DType::F32,
		};
		let output = self.add_tensor(&shape, dtype);
		self.add_operator(kind, inputs, &[output])?;
		Ok(output)
	}

	pub fn add_matmul(
		&mut self,
		a: TensorIndex,
		b: TensorIndex,
		trans_a: bool,
		trans_b: bool,
	) -> Result<TensorIndex, ErrPack<GraphError>> {
		self.add_operator_with_output(OpKind::MatMul(MatMul::new(trans_a, trans_b)), &[a, b])
	}

	pub fn add_transpose(
		&mut self,
		input: TensorIndex,
		permute: &[usize],
	) -> Result<TensorIndex, ErrPack<GraphError>> {
		self.add_operator_with_output(OpKind::Transpose(Transpose::new(permute)), &[input])
	}

	pub fn add_unary(
		&mut self,
		kind: UnaryKind,
		input: TensorIndex,
	) -> Result<TensorIndex, ErrPack<GraphError>> {
		self.add_operator_with_output(OpKind::Unary(kind), &[input])
	}

	pub fn add_binary(
		&mut self,
		kind: BinaryKind,
		a: TensorIndex,
		b: TensorIndex,
	) -> Result<TensorIndex, ErrPack<GraphError>> {
		self.add_operator_with_output(OpKind::Binary(kind), &[a, b])
	}

	//-- edges

	fn link(&mut self, from: OpIndex, to: OpIndex) {
		self.ops[from].add_successor(to);
		self.ops[to].add_predecessor(from);
	}

	fn unlink(&mut self, from: OpIndex, to: OpIndex) {
		self.ops[from].remove_successor(to);
		self.ops[to].remove_predecessor(from);
	}

	/// Registers the tensor-level edges of `op` and derives the operator-level ones.
	fn connect(&mut self, op: OpIndex) {
		self.sorted = false;
		let inputs = self.ops[op].inputs.clone();
		let outputs = self.ops[op].outputs.clone();
		for input in inputs {
			self.tensors[input].add_consumer(op);
			if let Some(pred) = self.tensors[input].producer {
				self.link(pred, op);
			}
		}
		for output in outputs {
			self.tensors[output].producer = Some(op);
			let consumers = self.tensors[output].consumers.clone();
			for succ in consumers {
				self.link(op, succ);
			}
		}
	}

	/// Makes `op` read `new` wherever it reads `old`, keeping all edges consistent.
	pub fn rewire_input(&mut self, op: OpIndex, old: TensorIndex, new: TensorIndex) {
		assert!(self.is_live_tensor(new), "rewire_input(): {new:?} is not in the graph");
		if self.ops[op].replace_input(old, new) > 0 {
			self.relink_input(op, old, new);
		}
	}

	/// Makes input `slot` of `op` read `new`. Other slots keep their tensors.
	pub fn rewire_input_at(&mut self, op: OpIndex, slot: usize, new: TensorIndex) {
		assert!(self.is_live_tensor(new), "rewire_input_at(): {new:?} is not in the graph");
		let old = std::mem::replace(&mut self.ops[op].inputs[slot], new);
		if old != new {
			self.relink_input(op, old, new);
		}
	}

	fn relink_input(&mut self, op: OpIndex, old: TensorIndex, new: TensorIndex) {
		self.sorted = false;

		if !self.ops[op].reads(old) {
			self.tensors[old].remove_consumer(op);
			if let Some(old_pred) = self.tensors[old].producer {
				let still_reads =
					self.ops[old_pred].outputs.iter().any(|&out| self.ops[op].reads(out));
				if !still_reads {
					self.unlink(old_pred, op);
				}
			}
		}

		self.tensors[new].add_consumer(op);
		if let Some(new_pred) = self.tensors[new].producer {
			self.link(new_pred, op);
		}
	}

	/// Detaches `op` from every edge and marks its slot dead.
	/// The caller compacts `op_list`.
	fn detach_operator(&mut self, op: OpIndex) {
		self.sorted = false;
		let inputs = self.ops[op].inputs.clone();
		let outputs = self.ops[op].outputs.clone();
		for input in inputs {
			self.tensors[input].remove_consumer(op);
		}
		for output in outputs {
			if self.tensors[output].producer == Some(op) {
				self.tensors[output].producer = None;
			}
		}
		let preds = std::mem::take(&mut self.ops[op].predecessors);
		for pred in preds {
			self.ops[pred].remove_successor(op);
		}
		let succs = std::mem::take(&mut self.ops[op].successors);
		for succ in succs {
			self.ops[succ].remove_predecessor(op);
		}
		self.ops[op].is_dead = true;
	}

	/// Removes dead slots from the ordered lists.
	fn compact(&mut self) {
		self.op_list.retain(|&op| !self.ops[op].is_dead);
		self.tensor_list.retain(|&t| !self.tensors[t].is_dead);
		self.outputs.retain(|&t| !self.tensors[t].is_dead);
	}

	//-- validation

	/// Checks the edge invariants. Every violation is logged.
	pub fn check_valid(&self) -> bool {
		let mut valid = true;
		let mut fail = |message: String| {
			cold_path();
			error!("check_valid(): {message}");
			valid = false;
		};

		let live_tensors = self.tensors.iter().filter(|t| !t.is_dead).count();
		let live_ops = self.ops.iter().filter(|o| !o.is_dead).count();
		if live_tensors != self.tensor_list.len() || live_ops != self.op_list.len() {
			fail("live node lists are out of sync with the arenas".to_string());
		}

		for &t in &self.tensor_list {
			let tensor = &self.tensors[t];
			if tensor.is_dead {
				fail(format!("dead tensor {t:?} is listed"));
			}
			if let Some(producer) = tensor.producer {
				if !(self.is_live_operator(producer) && self.ops[producer].outputs.contains(&t)) {
					fail(format!("tensor {t:?} has a stale producer {producer:?}"));
				}
			}
			for &consumer in &tensor.consumers {
				if !(self.is_live_operator(consumer) && self.ops[consumer].reads(t)) {
					fail(format!("tensor {t:?} has a stale consumer {consumer:?}"));
				}
			}
			if tensor.is_orphan() && !self.is_output(t) {
				fail(format!("tensor {t:?} is neither produced nor consumed"));
			}
		}

		for &op in &self.op_list {
			let data = &self.ops[op];
			if data.is_dead {
				fail(format!("dead operator {op:?} is listed"));
			}
			for &input in &data.inputs {
				if !self.is_live_tensor(input) || !self.tensors[input].consumers.contains(&op) {
					fail(format!("operator {op:?} has an unregistered input {input:?}"));
				}
			}
			for &output in &data.outputs {
				if !self.is_live_tensor(output) || self.tensors[output].producer != Some(op) {
					fail(format!("operator {op:?} has an unregistered output {output:?}"));
				}
			}

			let mut preds: Vec<OpIndex> =
				data.inputs.iter().filter_map(|&t| self.tensors[t].producer).collect();
			let mut succs: Vec<OpIndex> = data
				.outputs
				.iter()
				.flat_map(|&t| self.tensors[t].consumers.iter().copied())
				.collect();
			if !same_set(&mut preds, &data.predecessors) {
				fail(format!("operator {op:?} has predecessors {:?}", data.predecessors));
			}
			if !same_set(&mut succs, &data.successors) {
				fail(format!("operator {op:?} has successors {:?}", data.successors));
			}
		}

		valid
	}

	/// Output shapes of `kind` applied to the current shapes of `inputs`.
	fn output_shapes(
		&self,
		kind: &OpKind,
		inputs: &[TensorIndex],
	) -> Result<OutputShapes, ShapeError> {
		let input_shapes: SmallVec<[&[usize]; 2]> =
			inputs.iter().map(|&t| self.tensors[t].shape()).collect();
		kind.infer_shape(&input_shapes)
	}

	fn shape_error(&self, op: OpIndex, err: ErrPack<GraphError>) -> ErrPack<GraphError> {
		let data = &self.ops[op];
		let reason = err.message().to_string();
		ErrPack {
			code: err.code,
			extra: Some(Box::new(ErrExtra {
				message: format!("{:?} operator {:?}: {reason}", data.op_type(), data.guid).into(),
				nested: Some(Box::new(err)),
			})),
		}
	}
}

fn same_set(expected: &mut Vec<OpIndex>, actual: &[OpIndex]) -> bool {
	expected.sort_unstable();
	expected.dedup();
	let mut actual = actual.to_vec();
	actual.sort_unstable();
	actual.len() == expected.len() && actual == *expected
}

//--------------------------------------------------------------------------------------------------
