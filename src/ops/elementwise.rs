//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::error::ShapeError;
use crate::shape::{self, Shape};

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryKind {
	Identity,
	Neg,
	Exp,
	Relu,
	Sqrt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryKind {
	Add,
	Sub,
	Mul,
}

pub fn infer_binary_shape(a: &[usize], b: &[usize]) -> Result<Shape, ShapeError> {
	shape::broadcast(a, b)
}

//--------------------------------------------------------------------------------------------------
