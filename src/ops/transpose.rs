//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use smallvec::SmallVec;

use crate::error::ShapeError;
use crate::shape::{INLINE_DIMS, Shape};
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

/// Output dimension `j` is input dimension `permute[j]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transpose {
	pub permute: SmallVec<[usize; INLINE_DIMS]>,
}

impl Transpose {
	pub fn new(permute: &[usize]) -> Self {
		Self { permute: SmallVec::from_slice(permute) }
	}

	/// Permutation that swaps the last two of `rank` axes.
	pub fn swap_last_two(rank: usize) -> Self {
		let mut permute: SmallVec<[usize; INLINE_DIMS]> = (0..rank).collect();
		if rank >= 2 {
			permute.swap(rank - 2, rank - 1);
		}
		Self { permute }
	}

	/// Every axis in `0..rank` appears exactly once.
	pub fn is_valid_permutation(&self) -> bool {
		let rank = self.permute.len();
		let mut seen: SmallVec<[bool; 8]> = smallvec::smallvec![false; rank];
		for &p in &self.permute {
			if p >= rank || seen[p] {
				return false;
			}
			seen[p] = true;
		}
		true
	}

	/// Identity on all leading axes and a swap of the last two.
	/// This is exactly what a MatMul transpose flag can absorb.
	pub fn is_last_two_swap(&self) -> bool {
		let r = self.permute.len();
		if r < 2 || self.permute[r - 1] != r - 2 || self.permute[r - 2] != r - 1 {
			return false;
		}
		self.permute[..r - 2].iter().enumerate().all(|(i, &p)| p == i)
	}

	/// True if applying `self` and then `next` gives back the input layout.
	pub fn cancels_with(&self, next: &Self) -> bool {
		let (p1, p2) = (&self.permute, &next.permute);
		p1.len() == p2.len()
			&& p2.iter().enumerate().all(|(j, &p)| p < p1.len() && p1[p] == j)
	}

	pub fn infer_shape(&self, input: &[usize]) -> Result<Shape, ShapeError> {
		if input.len() != self.permute.len() || !self.is_valid_permutation() {
			cold_path();
			return Err(ShapeError::InvalidPermutation);
		}
		Ok(self.permute.iter().map(|&p| input[p]).collect())
	}
}

//--------------------------------------------------------------------------------------------------
