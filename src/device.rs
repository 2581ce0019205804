//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod cpu;

#[cfg(test)]
pub(crate) mod counting;

pub use cpu::CPUDevice;

//--------------------------------------------------------------------------------------------------

#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct DevicePtr {
	ptr: *mut (),
}

impl DevicePtr {
	#[inline]
	pub fn new(ptr: *mut ()) -> Self {
		Self { ptr }
	}

	/// # Safety
	/// Only the device that issued the pointer knows what it points to.
	/// Outside of that device, treat it as an opaque handle.
	#[inline]
	pub unsafe fn as_ptr<T>(&self) -> *mut T {
		self.ptr.cast::<T>()
	}
}

//--------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct DeviceAllocError;

//--------------------------------------------------------------------------------------------------

/// Provider of physical memory.
///
/// The graph asks for exactly one buffer, after all offsets are planned,
/// and returns it exactly once when it is dropped.
pub trait Device {
	fn name(&self) -> &str;

	fn new_buffer(&self, bytes: usize) -> Result<DevicePtr, DeviceAllocError>;

	/// # Safety
	/// `device_ptr` must come from `new_buffer()` on the same device and must not be used
	/// after this call.
	unsafe fn drop_buffer(&self, device_ptr: DevicePtr);
}

//--------------------------------------------------------------------------------------------------
