//------------------------------------------------------------------------------
//
// Copyright 2025 Jiri Bobek. All rights reserved.
// License: GPL 3.0 or later. See LICENSE.txt for details.
//
//------------------------------------------------------------------------------

pub mod index_vec;

/// Marks the enclosing branch as unlikely.
#[cold]
#[inline(always)]
pub fn cold_path() {}
