//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::rc::Rc;

use log::info;

use crate::device::{Device, DeviceAllocError, DevicePtr};
use crate::dtype::MAX_DTYPE_ALIGN;


//--------------------------------------------------------------------------------------------------

/// Plans byte ranges inside one arena before any memory exists.
///
/// While planning, offsets are purely logical. `materialize()` then asks the device for
/// a single buffer of `peak()` bytes, after which the layout is frozen and any further
/// `alloc()` or `free()` is a bug.
pub struct Allocator {
	device: Rc<dyn Device>,
	used: usize,
	peak: usize,
	alignment: usize,

	/// start offset -> size. Never contains two overlapping or adjacent blocks.
	free_blocks: BTreeMap<usize, usize>,

	buffer: Option<DevicePtr>,
}

impl Allocator {
	pub fn new(device: Rc<dyn Device>, alignment: usize) -> Self {
		assert!(alignment.is_power_of_two(), "alignment must be a power of two");
		Self {
			device,
			used: 0,
			peak: 0,
			alignment,
			free_blocks: BTreeMap::new(),
			buffer: None,
		}
	}

	/// Alignment defaults to the size of the widest scalar `DType`.
	pub fn with_default_alignment(device: Rc<dyn Device>) -> Self {
		Self::new(device, MAX_DTYPE_ALIGN)
	}

	pub fn used(&self) -> usize {
		self.used
	}

	pub fn peak(&self) -> usize {
		self.peak
	}

	pub fn alignment(&self) -> usize {
		self.alignment
	}

	pub fn is_materialized(&self) -> bool {
		self.buffer.is_some()
	}

	/// Iterates `(offset, size)` of free blocks in ascending address order.
	pub fn free_blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
		self.free_blocks.iter().map(|(&offset, &size)| (offset, size))
	}

	/// Rounds `size` up to a multiple of the alignment.
	/// A zero-byte request still occupies one aligned unit.
	pub fn aligned_size(&self, size: usize) -> usize {
		let size = size.max(1);
		let Some(padded) = size.checked_add(self.alignment - 1) else {
			panic!("Allocator: size {size} overflows when aligned to {}", self.alignment);
		};
		padded & !(self.alignment - 1)
	}

	pub fn alloc(&mut self, size: usize) -> usize {
		assert!(self.buffer.is_none(), "Allocator::alloc() after the buffer was materialized");
		let size = self.aligned_size(size);

		// first fit
		let found = self
			.free_blocks
			.iter()
			.find(|&(_, &block_size)| block_size >= size)
			.map(|(&block_offset, &block_size)| (block_offset, block_size));
		let offset = if let Some((block_offset, block_size)) = found {
			self.free_blocks.remove(&block_offset);
			if block_size > size {
				self.free_blocks.insert(block_offset + size, block_size - size);
			}
			block_offset
		} else {
			let offset = self.peak;
			let Some(peak) = self.peak.checked_add(size) else {
				panic!("Allocator::alloc(): arena of {offset} bytes cannot grow by {size}");
			};
			self.peak = peak;
			offset
		};

		self.used += size;
		offset
	}

	pub fn free(&mut self, offset: usize, size: usize) {
		assert!(self.buffer.is_none(), "Allocator::free() after the buffer was materialized");
		let size = self.aligned_size(size);
		assert!(offset % self.alignment == 0, "Allocator::free(): misaligned offset {offset}");
		assert!(offset + size <= self.peak, "Allocator::free(): range beyond the arena");
		assert!(size <= self.used, "Allocator::free(): freeing more than is in use");

		let mut start = offset;
		let mut len = size;

		if let Some((&next_start, &next_len)) = self.free_blocks.range(start..).next() {
			assert!(start + len <= next_start, "Allocator::free(): range is already free");
			if start + len == next_start {
				self.free_blocks.remove(&next_start);
				len += next_len;
			}
		}
		if let Some((&prev_start, &prev_len)) = self.free_blocks.range(..start).next_back() {
			assert!(prev_start + prev_len <= start, "Allocator::free(): range is already free");
			if prev_start + prev_len == start {
				self.free_blocks.remove(&prev_start);
				start = prev_start;
				len += prev_len;
			}
		}
		self.free_blocks.insert(start, len);

		// give trailing free space back to the arena
		while let Some((&last_start, &last_len)) = self.free_blocks.last_key_value() {
			if last_start + last_len != self.peak {
				break;
			}
			self.peak = last_start;
			self.free_blocks.remove(&last_start);
		}

		self.used -= size;
	}

	/// Returns the real buffer, allocating it on the first call.
	pub fn materialize(&mut self) -> Result<DevicePtr, DeviceAllocError> {
		if let Some(buffer) = self.buffer {
			return Ok(buffer);
		}
		let buffer = self.device.new_buffer(self.peak)?;
		info!(
			"Allocator really alloc: {:?} {} bytes on {}",
			buffer,
			self.peak,
			self.device.name()
		);
		self.buffer = Some(buffer);
		Ok(buffer)
	}

	pub fn info(&self) {
		info!("Used memory: {}, peak memory: {}", self.used, self.peak);
	}
}

impl Drop for Allocator {
	fn drop(&mut self) {
		if let Some(buffer) = self.buffer.take() {
			unsafe { self.device.drop_buffer(buffer) };
		}
	}
}

//--------------------------------------------------------------------------------------------------
