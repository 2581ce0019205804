//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::cell::Cell;
use std::rc::Rc;

use super::{CPUDevice, Device, DeviceAllocError, DevicePtr};

//--------------------------------------------------------------------------------------------------

/// CPU device that records how it was used. Tests only.
pub struct CountingDevice {
	inner: Rc<CPUDevice>,
	pub allocs: Cell<usize>,
	pub deallocs: Cell<usize>,
	pub last_bytes: Cell<Option<usize>>,
	pub fail: bool,
}

impl CountingDevice {
	pub fn new() -> Rc<Self> {
		Rc::new(Self {
			inner: CPUDevice::new(),
			allocs: Cell::new(0),
			deallocs: Cell::new(0),
			last_bytes: Cell::new(None),
			fail: false,
		})
	}

	pub fn new_failing() -> Rc<Self> {
		Rc::new(Self {
			inner: CPUDevice::new(),
			allocs: Cell::new(0),
			deallocs: Cell::new(0),
			last_bytes: Cell::new(None),
			fail: true,
		})
	}
}

impl Device for CountingDevice {
	fn name(&self) -> &str {
		"counting"
	}

	fn new_buffer(&self, bytes: usize) -> Result<DevicePtr, DeviceAllocError> {
		self.allocs.set(self.allocs.get() + 1);
		self.last_bytes.set(Some(bytes));
		if self.fail {
			return Err(DeviceAllocError);
		}
		self.inner.new_buffer(bytes)
	}

	unsafe fn drop_buffer(&self, device_ptr: DevicePtr) {
		self.deallocs.set(self.deallocs.get() + 1);
		unsafe { self.inner.drop_buffer(device_ptr) };
	}
}

//--------------------------------------------------------------------------------------------------
