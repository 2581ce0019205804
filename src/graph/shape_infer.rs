//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use log::debug;

use super::{Fuid, Graph};
use crate::ErrPack;
use crate::error::GraphError;
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

impl Graph {
	/// Recomputes every operator's output shapes from its inputs, in topological order.
	///
	/// A new shape is written to all live tensors with the same fuid, so copies of one
	/// logical value always agree. Fails on the first operator whose inputs don't fit.
	pub fn infer_shapes(&mut self) -> Result<(), ErrPack<GraphError>> {
		self.sort()?;

		for i in 0..self.op_list.len() {
			let op = self.op_list[i];
			let data = &self.ops[op];
			let shapes = match self.output_shapes(&data.kind, &data.inputs) {
				Ok(shapes) => shapes,
				Err(err) => {
					cold_path();
					return Err(self.shape_error(op, err.into()));
				},
			};
			assert_eq!(
				shapes.len(),
				data.outputs.len(),
				"infer_shapes(): {:?} produced the wrong number of shapes",
				data.guid
			);

			for (slot, shape) in shapes.iter().enumerate() {
				let output = self.ops[op].outputs[slot];
				if self.tensors[output].shape() != shape.as_slice() {
					let fuid = self.tensors[output].fuid;
					self.update_shape(fuid, shape);
				}
			}
		}
		Ok(())
	}

	fn update_shape(&mut self, fuid: Fuid, shape: &[usize]) {
		for &t in &self.tensor_list {
			let tensor = &mut self.tensors[t];
			if tensor.fuid == fuid && tensor.shape.as_slice() != shape {
				debug!("infer_shapes(): {:?} {:?} -> {:?}", tensor.guid, tensor.shape, shape);
				tensor.shape = shape.into();
			}
		}
	}
}

//--------------------------------------------------------------------------------------------------
