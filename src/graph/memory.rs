//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use log::{info, warn};

use super::{Blob, Graph};
use crate::ErrPack;
use crate::error::GraphError;
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

impl Graph {
	/// Gives every live tensor a place in one device buffer.
	///
	/// Offsets are assigned in tensor order and nothing is freed, so every tensor keeps
	/// its own range. The result depends only on the sizes and the order of tensors.
	///
	/// Once the buffer exists, calling this again does nothing.
	pub fn plan_memory(&mut self) -> Result<(), ErrPack<GraphError>> {
		self.sort()?;

		if self.allocator.is_materialized() {
			assert!(
				self.tensor_list.iter().all(|&t| self.tensors[t].blob.is_some()),
				"plan_memory(): tensors were added after the buffer was materialized"
			);
			return Ok(());
		}

		let mut planned = Vec::with_capacity(self.tensor_list.len());
		for &t in &self.tensor_list {
			let bytes = self.tensors[t].bytes();
			planned.push((t, self.allocator.alloc(bytes), bytes));
		}

		let buffer = match self.allocator.materialize() {
			Ok(buffer) => buffer,
			Err(err) => {
				cold_path();
				warn!("plan_memory(): cannot allocate {} bytes", self.allocator.peak());
				for &(_, offset, bytes) in planned.iter().rev() {
					self.allocator.free(offset, bytes);
				}
				return Err(err.into());
			},
		};

		for (t, offset, _) in planned {
			self.tensors[t].blob = Some(Blob { buffer, offset });
		}
		info!("plan_memory(): {} tensors", self.tensor_list.len());
		self.allocator.info();
		Ok(())
	}
}

//--------------------------------------------------------------------------------------------------
