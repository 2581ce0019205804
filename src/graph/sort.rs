//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use bit_set::BitSet;
use log::{debug, warn};

use super::{Graph, Guid};
use crate::ErrPack;
use crate::error::GraphError;
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

impl Graph {
	/// Orders operators so that each one comes after the producers of its inputs.
	///
	/// Repeatedly sweeps the operator list and places every operator whose inputs are ready.
	/// Quadratic in the worst case, which is fine for graphs of a few hundred operators.
	///
	/// On a cycle, the operator list is left untouched.
	pub fn sort(&mut self) -> Result<(), ErrPack<GraphError>> {
		if self.sorted {
			return Ok(());
		}

		let mut placed = BitSet::with_capacity(self.ops.len());
		let mut sorted = Vec::with_capacity(self.op_list.len());
		while sorted.len() < self.op_list.len() {
			let mut modified = false;
			for &op in &self.op_list {
				if placed.contains(op.raw) {
					continue;
				}
				let ready = self.ops[op].inputs.iter().all(|&input| {
					self.tensors[input].producer.is_none_or(|producer| placed.contains(producer.raw))
				});
				if ready {
					placed.insert(op.raw);
					sorted.push(op);
					modified = true;
				}
			}
			if !modified {
				cold_path();
				let stuck: Vec<Guid> = self
					.op_list
					.iter()
					.filter(|op| !placed.contains(op.raw))
					.map(|&op| self.ops[op].guid)
					.collect();
				warn!("sort(): cycle among operators {stuck:?}");
				return Err(ErrPack::new(
					GraphError::Cycle,
					format!("cannot sort, operators {stuck:?} form a cycle"),
				));
			}
		}

		debug!("sort(): {} operators", sorted.len());
		self.op_list = sorted;
		self.sorted = true;
		Ok(())
	}
}

//--------------------------------------------------------------------------------------------------
