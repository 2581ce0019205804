//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use smallvec::SmallVec;

use crate::error::ShapeError;
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

pub const INLINE_DIMS: usize = 5;

pub type Shape = SmallVec<[usize; INLINE_DIMS]>;

/// Number of elements. Returns `None` on overflow.
pub fn elems(shape: &[usize]) -> Option<usize> {
	shape.iter().try_fold(1_usize, |acc, &dim| acc.checked_mul(dim))
}

/// Right-aligned broadcast of two shapes. Missing leading dimensions count as 1.
/// Each pair of dimensions must be equal, or one of them must be 1.
pub fn broadcast(a: &[usize], b: &[usize]) -> Result<Shape, ShapeError> {
	let rank = a.len().max(b.len());
	let mut result = Shape::with_capacity(rank);
	for i in (1..=rank).rev() {
		let d1 = if i <= a.len() { a[a.len() - i] } else { 1 };
		let d2 = if i <= b.len() { b[b.len() - i] } else { 1 };
		let dim = if d1 == d2 || d2 == 1 {
			d1
		} else if d1 == 1 {
			d2
		} else {
			cold_path();
			return Err(ShapeError::BroadcastMismatch);
		};
		result.push(dim);
	}
	Ok(result)
}

//--------------------------------------------------------------------------------------------------
