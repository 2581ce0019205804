//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::error::ShapeError;
use crate::shape::{self, Shape};
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

/// `C = op(A) * op(B)`, where `op` transposes the last two axes when the flag is set.
/// Leading (batch) dimensions are broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatMul {
	pub trans_a: bool,
	pub trans_b: bool,
}

impl MatMul {
	pub fn new(trans_a: bool, trans_b: bool) -> Self {
		Self { trans_a, trans_b }
	}

	/// Flips the transpose flag for input `slot` (0 = A, 1 = B).
	pub fn flip_trans(&mut self, slot: usize) {
		if slot == 0 {
			self.trans_a = !self.trans_a;
		} else {
			self.trans_b = !self.trans_b;
		}
	}

	pub fn infer_shape(&self, a: &[usize], b: &[usize]) -> Result<Shape, ShapeError> {
		let (rank_a, rank_b) = (a.len(), b.len());
		if rank_a < 2 || rank_b < 2 {
			cold_path();
			return Err(ShapeError::RankTooSmall);
		}

		let (m, k_a) = if self.trans_a {
			(a[rank_a - 1], a[rank_a - 2])
		} else {
			(a[rank_a - 2], a[rank_a - 1])
		};
		let (k_b, n) = if self.trans_b {
			(b[rank_b - 1], b[rank_b - 2])
		} else {
			(b[rank_b - 2], b[rank_b - 1])
		};
		if k_a != k_b {
			cold_path();
			return Err(ShapeError::ContractionMismatch);
		}

		let mut out = shape::broadcast(&a[..rank_a - 2], &b[..rank_b - 2])?;
		out.push(m);
		out.push(n);
		Ok(out)
	}
}

//--------------------------------------------------------------------------------------------------
