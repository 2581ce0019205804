//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

use std::fmt;

//--------------------------------------------------------------------------------------------------

pub const MAX_DTYPE_ALIGN: usize = 8; // 64-bit

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum DType {
	Bool,
	U8,
	I32,
	I64,
	F16,
	F32,
	F64,
}

impl DType {
	pub fn bytes(self) -> usize {
		match self {
			Self::Bool | Self::U8 => 1,
			Self::F16 => 2,
			Self::I32 | Self::F32 => 4,
			Self::I64 | Self::F64 => 8,
		}
	}

	/// Returns `None` if the byte count overflows `usize`.
	pub fn array_bytes(self, elems: usize) -> Option<usize> {
		elems.checked_mul(self.bytes())
	}
}

impl fmt::Display for DType {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let name = match self {
			Self::Bool => "bool",
			Self::U8 => "u8",
			Self::I32 => "i32",
			Self::I64 => "i64",
			Self::F16 => "f16",
			Self::F32 => "f32",
			Self::F64 => "f64",
		};
		f.write_str(name)
	}
}

//--------------------------------------------------------------------------------------------------
