//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::alloc::Layout;
use std::ptr::NonNull;
use std::rc::Rc;

use super::{Device, DeviceAllocError, DevicePtr};
use crate::dtype::MAX_DTYPE_ALIGN;
use crate::util::cold_path;

//--------------------------------------------------------------------------------------------------

/// Host memory device.
///
/// A buffer is one heap block: a `usize` holding the byte count, then the data,
/// aligned to `MAX_DTYPE_ALIGN`. The `DevicePtr` points at the byte count.
pub struct CPUDevice {
	name: String,
}

/// Layout of the whole block and the offset of the data inside it.
fn block_layout(bytes: usize) -> Option<(Layout, usize)> {
	let data = Layout::from_size_align(bytes, MAX_DTYPE_ALIGN).ok()?;
	Layout::new::<usize>().extend(data).ok()
}

impl CPUDevice {
	pub fn new() -> Rc<Self> {
		Self::new_named("CPU".to_string())
	}

	pub fn new_named(name: String) -> Rc<Self> {
		Rc::new(Self { name })
	}

	/// Host address of the first data byte.
	///
	/// # Safety
	/// `device_ptr` must be a live buffer allocated by this device.
	pub unsafe fn data_ptr(&self, device_ptr: DevicePtr) -> *mut u8 {
		unsafe {
			let size_ptr = device_ptr.as_ptr::<usize>();
			let Some((_, offset)) = block_layout(*size_ptr) else {
				unreachable!("CPUDevice::data_ptr(): corrupted buffer header");
			};
			size_ptr.cast::<u8>().add(offset)
		}
	}
}

impl Device for CPUDevice {
	fn name(&self) -> &str {
		&self.name
	}

	fn new_buffer(&self, bytes: usize) -> Result<DevicePtr, DeviceAllocError> {
		let Some((layout, _)) = block_layout(bytes) else {
			cold_path();
			return Err(DeviceAllocError);
		};
		// SAFETY: `layout` is never zero-sized, it always holds the byte count
		let Some(block) = NonNull::new(unsafe { std::alloc::alloc(layout) }) else {
			cold_path();
			return Err(DeviceAllocError);
		};
		let size_ptr = block.cast::<usize>();
		unsafe { size_ptr.write(bytes) };
		Ok(DevicePtr::new(size_ptr.as_ptr().cast()))
	}

	unsafe fn drop_buffer(&self, device_ptr: DevicePtr) {
		unsafe {
			let size_ptr = device_ptr.as_ptr::<usize>();
			let Some((layout, _)) = block_layout(*size_ptr) else {
				unreachable!("CPUDevice::drop_buffer(): corrupted buffer header");
			};
			std::alloc::dealloc(size_ptr.cast::<u8>(), layout);
		}
	}
}

//--------------------------------------------------------------------------------------------------
