//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use smallvec::SmallVec;
use thin_vec::ThinVec;

use super::TensorIndex;
use super::tensor::Guid;
use crate::define_index_type;
use crate::ops::{OpKind, OpType};

//--------------------------------------------------------------------------------------------------

define_index_type!(OpIndex);

#[derive(Debug)]
pub struct OpData {
	pub(super) guid: Guid,
	pub(super) kind: OpKind,
	pub(super) inputs: SmallVec<[TensorIndex; 2]>,
	pub(super) outputs: SmallVec<[TensorIndex; 1]>,

	/// Always the operator-level projection of the tensor edges:
	/// `a` precedes `b` iff some output of `a` is an input of `b`.
	pub(super) predecessors: ThinVec<OpIndex>,
	pub(super) successors: ThinVec<OpIndex>,

	pub(super) is_dead: bool,
}

impl OpData {
	pub(super) fn new(
		guid: Guid,
		kind: OpKind,
		inputs: &[TensorIndex],
		outputs: &[TensorIndex],
	) -> Self {
		Self {
			guid,
			kind,
			inputs: SmallVec::from_slice(inputs),
			outputs: SmallVec::from_slice(outputs),
			predecessors: ThinVec::new(),
			successors: ThinVec::new(),
			is_dead: false,
		}
	}

	pub fn guid(&self) -> Guid {
		self.guid
	}

	pub fn kind(&self) -> &OpKind {
		&self.kind
	}

	pub fn op_type(&self) -> OpType {
		self.kind.op_type()
	}

	pub fn inputs(&self) -> &[TensorIndex] {
		&self.inputs
	}

	pub fn outputs(&self) -> &[TensorIndex] {
		&self.outputs
	}

	pub fn predecessors(&self) -> &[OpIndex] {
		&self.predecessors
	}

	pub fn successors(&self) -> &[OpIndex] {
		&self.successors
	}

	pub fn is_dead(&self) -> bool {
		self.is_dead
	}

	pub fn reads(&self, tensor: TensorIndex) -> bool {
		self.inputs.contains(&tensor)
	}

	/// Swaps every input reference to `old` for `new`. Touches no other edges;
	/// `Graph::rewire_input()` is the variant that keeps the graph consistent.
	///
	/// Returns the number of replaced references.
	pub fn replace_input(&mut self, old: TensorIndex, new: TensorIndex) -> usize {
		let mut count = 0;
		for input in &mut self.inputs {
			if *input == old {
				*input = new;
				count += 1;
			}
		}
		count
	}

	pub(super) fn add_predecessor(&mut self, op: OpIndex) {
		if !self.predecessors.contains(&op) {
			self.predecessors.push(op);
		}
	}

	pub(super) fn add_successor(&mut self, op: OpIndex) {
		if !self.successors.contains(&op) {
			self.successors.push(op);
		}
	}

	pub(super) fn remove_predecessor(&mut self, op: OpIndex) {
		self.predecessors.retain(|&p| p != op);
	}

	pub(super) fn remove_successor(&mut self, op: OpIndex) {
		self.successors.retain(|&s| s != op);
	}
}

//--------------------------------------------------------------------------------------------------
