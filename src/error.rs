//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use crate::ErrPack;
use crate::device::DeviceAllocError;

//--------------------------------------------------------------------------------------------------

/// Reason an operator could not compute its output shapes.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ShapeError {
	WrongInputCount,
	RankTooSmall,
	ContractionMismatch,
	BroadcastMismatch,
	InvalidPermutation,
}

impl std::fmt::Display for ShapeError {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		let msg = match self {
			Self::WrongInputCount => "wrong number of inputs",
			Self::RankTooSmall => "input rank is too small",
			Self::ContractionMismatch => "contraction dimensions don't match",
			Self::BroadcastMismatch => "dimensions cannot be broadcast",
			Self::InvalidPermutation => "permutation doesn't match the input rank",
		};
		f.write_str(msg)
	}
}

impl std::error::Error for ShapeError {
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum GraphError {
	InvalidOperator,
	Cycle,
	ShapeInconsistency,
	DeviceAllocFailed,
}

impl From<ShapeError> for ErrPack<GraphError> {
	#[cold]
	#[inline(never)]
	fn from(err: ShapeError) -> Self {
		Self {
			code: GraphError::ShapeInconsistency,
			extra: Some(Box::new(crate::ErrExtra {
				message: err.to_string().into(),
				nested: Some(Box::new(err)),
			})),
		}
	}
}

impl From<DeviceAllocError> for ErrPack<GraphError> {
	#[cold]
	#[inline(never)]
	fn from(_: DeviceAllocError) -> Self {
		Self {
			code: GraphError::DeviceAllocFailed,
			extra: None,
		}
	}
}

//--------------------------------------------------------------------------------------------------
