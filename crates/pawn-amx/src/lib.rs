// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! # Pawn Abstract Machine
//!
//! Execution runtime for compiled Pawn modules.
//!
//! This crate provides:
//! - Module loader: header validation, compact-code expansion, and a
//!   browse pass that verifies every instruction before execution
//! - Bytecode interpreter: a cell-based register/stack machine covering
//!   the full file-version-9 opcode set, including the macro-fused forms
//! - Native registry: name-to-function binding for imported natives
//! - Embedding surface: invoke publics, marshal arrays and strings,
//!   allot heap cells, raise errors, clone instances, sleep and resume
//!
//! All state lives in the [`Amx`] instance; the interpreter in [`vm`] is
//! stateless over it. Instances are strictly single-threaded and
//! cooperative: execution leaves the machine only at a sleep, a native
//! returning with an error raised, or a debug-hook veto.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(any(test, feature = "std"))]
extern crate std;

extern crate alloc;

pub mod bytecode;
pub mod loader;
pub mod machine;
pub mod natives;
pub mod strings;
pub mod utf8;
pub mod vm;

#[cfg(test)]
pub(crate) mod testimg;

// Re-export commonly used types at crate root
pub use machine::{Amx, USER_NUM, UserData};
pub use natives::{AmxCallback, AmxDebug, AmxNative, NativeEntry};
pub use pawn_abi::{AmxError, AmxFlags, Cell, EXEC_CONT, EXEC_MAIN, Ucell};
