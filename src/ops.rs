//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use smallvec::SmallVec;

use crate::error::ShapeError;
use crate::shape::Shape;
use crate::util::cold_path;

pub mod elementwise;
pub mod matmul;
pub mod transpose;


pub use elementwise::{BinaryKind, UnaryKind};
pub use matmul::MatMul;
pub use transpose::Transpose;

//--------------------------------------------------------------------------------------------------

/// Stable tag of an operator kind, used for pattern matching in the optimizer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum OpType {
	MatMul,
	Transpose,
	Unary,
	Binary,
}

pub type OutputShapes = SmallVec<[Shape; 1]>;

/// Operator kind together with its kind-specific attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpKind {
	MatMul(MatMul),
	Transpose(Transpose),
	Unary(UnaryKind),
	Binary(BinaryKind),
}

impl OpKind {
	pub fn op_type(&self) -> OpType {
		match self {
			Self::MatMul(_) => OpType::MatMul,
			Self::Transpose(_) => OpType::Transpose,
			Self::Unary(_) => OpType::Unary,
			Self::Binary(_) => OpType::Binary,
		}
	}

	pub fn num_inputs(&self) -> usize {
		match self {
			Self::Transpose(_) | Self::Unary(_) => 1,
			Self::MatMul(_) | Self::Binary(_) => 2,
		}
	}

	pub fn num_outputs(&self) -> usize {
		1
	}

	/// Computes one shape per output from the current input shapes.
	pub fn infer_shape(&self, inputs: &[&[usize]]) -> Result<OutputShapes, ShapeError> {
		if inputs.len() != self.num_inputs() {
			cold_path();
			return Err(ShapeError::WrongInputCount);
		}
		let out = match self {
			Self::MatMul(matmul) => matmul.infer_shape(inputs[0], inputs[1])?,
			Self::Transpose(transpose) => transpose.infer_shape(inputs[0])?,
			Self::Unary(_) => Shape::from_slice(inputs[0]),
			Self::Binary(_) => elementwise::infer_binary_shape(inputs[0], inputs[1])?,
		};
		Ok(smallvec::smallvec![out])
	}

	pub fn as_matmul(&self) -> Option<&MatMul> {
		match self {
			Self::MatMul(matmul) => Some(matmul),
			_ => None,
		}
	}

	pub fn as_matmul_mut(&mut self) -> Option<&mut MatMul> {
		match self {
			Self::MatMul(matmul) => Some(matmul),
			_ => None,
		}
	}

	pub fn as_transpose(&self) -> Option<&Transpose> {
		match self {
			Self::Transpose(transpose) => Some(transpose),
			_ => None,
		}
	}
}

//--------------------------------------------------------------------------------------------------
