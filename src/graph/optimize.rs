//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use log::{debug, info};

use super::{Graph, OpIndex, TensorIndex};
use crate::ops::Transpose;

//--------------------------------------------------------------------------------------------------

impl Graph {
	/// Rewrites the graph until nothing changes:
	/// - a Transpose of the last two axes feeding a MatMul becomes a MatMul transpose flag,
	/// - two Transposes that cancel out are bypassed,
	/// - operators whose results are never used are removed, and so are tensors
	///   that nothing produces or consumes.
	///
	/// Graph outputs and everything they depend on are kept.
	pub fn optimize(&mut self) {
		let mut sweeps = 1;
		while self.optimize_sweep() {
			sweeps += 1;
		}
		info!(
			"optimize(): done after {sweeps} sweeps, {} operators, {} tensors",
			self.op_list.len(),
			self.tensor_list.len()
		);
	}

	/// Returns true if anything changed.
	fn optimize_sweep(&mut self) -> bool {
		let mut changed = false;

		// removals only mark slots dead, so iterating a copy is safe
		let ops = self.op_list.clone();
		for op in ops {
			if self.ops[op].is_dead {
				continue;
			}
			if self.fuse_transpose_into_matmul(op) {
				changed = true;
			}
			if !changed && self.cancel_transpose_pair(op) {
				changed = true;
			}
			if self.is_unused_operator(op) {
				debug!("optimize(): removing unused {:?} {:?}", self.ops[op].op_type(), self.ops[op].guid);
				self.detach_operator(op);
				changed = true;
			}
		}

		let unused: Vec<TensorIndex> = self
			.tensor_list
			.iter()
			.copied()
			.filter(|&t| self.tensors[t].is_orphan() && !self.is_output(t))
			.collect();
		for &t in &unused {
			debug!("optimize(): removing unused tensor {:?}", self.tensors[t].guid);
			self.tensors[t].is_dead = true;
		}
		if !unused.is_empty() {
			self.sorted = false;
			changed = true;
		}

		self.compact();
		changed
	}

	/// MatMul(Transpose(X), B) -> MatMul(X, B) with the transpose flag flipped.
	/// Works for both inputs.
	fn fuse_transpose_into_matmul(&mut self, op: OpIndex) -> bool {
		if self.ops[op].kind.as_matmul().is_none() {
			return false;
		}

		let mut changed = false;
		for slot in 0..self.ops[op].inputs.len() {
			let input = self.ops[op].inputs[slot];
			let Some(producer) = self.tensors[input].producer else {
				continue;
			};
			let fusable = self.ops[producer].kind.as_transpose().is_some_and(Transpose::is_last_two_swap);
			if !fusable {
				continue;
			}

			let source = self.ops[producer].inputs[0];
			if let Some(matmul) = self.ops[op].kind.as_matmul_mut() {
				matmul.flip_trans(slot);
			}
			self.rewire_input_at(op, slot, source);
			debug!(
				"optimize(): fused {:?} into MatMul {:?} input {slot}",
				self.ops[producer].guid, self.ops[op].guid
			);
			changed = true;
		}
		changed
	}

	/// Transpose(Transpose(X, p), inverse(p)) -> X for every consumer.
	fn cancel_transpose_pair(&mut self, op: OpIndex) -> bool {
		let Some(second) = self.ops[op].kind.as_transpose() else {
			return false;
		};
		let input = self.ops[op].inputs[0];
		let Some(first_op) = self.tensors[input].producer else {
			return false;
		};
		let Some(first) = self.ops[first_op].kind.as_transpose() else {
			return false;
		};
		if !first.cancels_with(second) {
			return false;
		}

		let source = self.ops[first_op].inputs[0];
		let output = self.ops[op].outputs[0];
		let consumers = self.tensors[output].consumers.to_vec();
		if consumers.is_empty() {
			return false;
		}
		for &consumer in &consumers {
			self.rewire_input(consumer, output, source);
		}
		debug!(
			"optimize(): {:?} and {:?} cancel out, {} consumers now read {:?}",
			self.ops[first_op].guid,
			self.ops[op].guid,
			consumers.len(),
			self.tensors[source].guid
		);
		true
	}

	fn is_unused_operator(&self, op: OpIndex) -> bool {
		let outputs = &self.ops[op].outputs;
		!outputs.is_empty()
			&& outputs
				.iter()
				.all(|&t| self.tensors[t].consumers.is_empty() && !self.is_output(t))
	}
}

//--------------------------------------------------------------------------------------------------
