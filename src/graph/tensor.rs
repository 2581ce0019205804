//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use thin_vec::ThinVec;

use super::OpIndex;
use crate::define_index_type;
use crate::device::DevicePtr;
use crate::dtype::DType;
use crate::shape::{self, Shape};

//--------------------------------------------------------------------------------------------------

define_index_type!(TensorIndex);

/// Structural identity. Unique per tensor object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Guid(pub usize);

/// Friendly identity. Shared by all tensor objects that hold the same logical value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Fuid(pub usize);

/// Where the tensor lives after memory planning.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Blob {
	pub buffer: DevicePtr,
	pub offset: usize,
}

#[derive(Debug)]
pub struct TensorData {
	pub(super) guid: Guid,
	pub(super) fuid: Fuid,
	pub(super) shape: Shape,
	pub(super) dtype: DType,

	/// Non-owning. The operator owns the edge.
	pub(super) producer: Option<OpIndex>,

	/// No duplicates.
	pub(super) consumers: ThinVec<OpIndex>,

	pub(super) blob: Option<Blob>,
	pub(super) is_dead: bool,
}

impl TensorData {
	pub(super) fn new(guid: Guid, fuid: Fuid, shape: &[usize], dtype: DType) -> Self {
		Self {
			guid,
			fuid,
			shape: Shape::from_slice(shape),
			dtype,
			producer: None,
			consumers: ThinVec::new(),
			blob: None,
			is_dead: false,
		}
	}

	pub fn guid(&self) -> Guid {
		self.guid
	}

	pub fn fuid(&self) -> Fuid {
		self.fuid
	}

	pub fn shape(&self) -> &[usize] {
		&self.shape
	}

	pub fn rank(&self) -> usize {
		self.shape.len()
	}

	pub fn dtype(&self) -> DType {
		self.dtype
	}

	pub fn producer(&self) -> Option<OpIndex> {
		self.producer
	}

	pub fn consumers(&self) -> &[OpIndex] {
		&self.consumers
	}

	pub fn blob(&self) -> Option<Blob> {
		self.blob
	}

	pub fn is_dead(&self) -> bool {
		self.is_dead
	}

	/// Neither produced nor consumed by any operator.
	pub fn is_orphan(&self) -> bool {
		self.producer.is_none() && self.consumers.is_empty()
	}

	/// # Panics
	/// Panics if the size overflows `usize`.
	#[allow(clippy::panic)]
	pub fn bytes(&self) -> usize {
		match shape::elems(&self.shape).and_then(|elems| self.dtype.array_bytes(elems)) {
			Some(bytes) => bytes,
			None => panic!("tensor {:?} is too large", self.guid),
		}
	}

	pub(super) fn add_consumer(&mut self, op: OpIndex) {
		if !self.consumers.contains(&op) {
			self.consumers.push(op);
		}
	}

	pub(super) fn remove_consumer(&mut self, op: OpIndex) {
		self.consumers.retain(|&c| c != op);
	}
}

//--------------------------------------------------------------------------------------------------
