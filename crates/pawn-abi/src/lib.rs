// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Shared ABI definitions between the Pawn toolchain and the abstract machine.
//!
//! This crate defines the contract that compiled `.amx` modules and the
//! machine that executes them agree on:
//! - The cell type (the uniform machine word) and its build-time width
//! - The module header layout and its validation rules
//! - The module/instance flag set
//! - The stable error-code enumeration
//!
//! # Design Principles
//!
//! - **Pure data**: no execution logic, 100% host-testable
//! - **Byte-level layout**: on-disk structures are decoded field by field
//!   from little-endian bytes, never overlaid onto host records
//! - **Build-time cell width**: 16, 32 or 64 bits via cargo features,
//!   mirroring the toolchain's own compile-time selection
//!
//! # Modules
//!
//! - [`cell`]: cell/ucell aliases, packing constants, reinterpret helpers
//! - [`header`]: module header layout, magic numbers, version window
//! - [`flags`]: the module/instance flag bits
//! - [`error`]: the stable error codes

#![no_std]

pub mod cell;
pub mod error;
pub mod flags;
pub mod header;

// Re-export commonly used types at crate root
pub use cell::{Cell, Ucell};
pub use error::AmxError;
pub use flags::AmxFlags;
pub use header::AmxHeader;

/// `exec` index selecting the module's `main` entry point.
pub const EXEC_MAIN: i32 = -1;

/// `exec` index resuming a sleeping instance from its saved state.
pub const EXEC_CONT: i32 = -2;
