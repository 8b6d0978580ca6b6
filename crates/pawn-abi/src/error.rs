// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The stable error-code enumeration.
//!
//! Codes 1..15 are reserved for exit codes of the abstract machine
//! itself; codes from 16 up are loader and API errors. The numeric
//! values are part of the external contract and never change.
//!
//! "No error" is not a variant: APIs return `Result<_, AmxError>` and
//! the instance stores `Option<AmxError>` for its sticky error slot.


use core::fmt;

/// Error raised by the abstract machine or its embedding API.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmxError {
    /// Forced exit.
    Exit = 1,
    /// Assertion failed.
    Assert = 2,
    /// Stack/heap collision.
    StackErr = 3,
    /// Array index out of bounds.
    Bounds = 4,
    /// Invalid memory access.
    MemAccess = 5,
    /// Invalid instruction.
    InvInstr = 6,
    /// Stack underflow.
    StackLow = 7,
    /// Heap underflow.
    HeapLow = 8,
    /// No callback, or invalid callback.
    Callback = 9,
    /// Native function failed.
    Native = 10,
    /// Divide by zero.
    Divide = 11,
    /// Entered sleep mode; execution can be resumed.
    Sleep = 12,
    /// Invalid state for this access.
    InvState = 13,

    /// Out of memory.
    Memory = 16,
    /// Invalid module format.
    Format = 17,
    /// Module requires a newer abstract machine version.
    Version = 18,
    /// Function not found.
    NotFound = 19,
    /// Invalid index parameter (bad entry point).
    Index = 20,
    /// Debugger cannot run.
    Debug = 21,
    /// Instance not initialized, or doubly initialized.
    Init = 22,
    /// Unable to set user data field (table full).
    UserData = 23,
    /// Cannot initialize the JIT.
    InitJit = 24,
    /// Parameter error.
    Params = 25,
    /// Domain error, expression result does not fit in range.
    Domain = 26,
    /// General error (unknown or unspecific).
    General = 27,
}

impl AmxError {
    /// The stable numeric code of this error.
    #[inline]
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Look up an error by its stable numeric code.
    ///
    /// Returns `None` for zero ("no error") and for unassigned codes.
    #[must_use]
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            1 => Self::Exit,
            2 => Self::Assert,
            3 => Self::StackErr,
            4 => Self::Bounds,
            5 => Self::MemAccess,
            6 => Self::InvInstr,
            7 => Self::StackLow,
            8 => Self::HeapLow,
            9 => Self::Callback,
            10 => Self::Native,
            11 => Self::Divide,
            12 => Self::Sleep,
            13 => Self::InvState,
            16 => Self::Memory,
            17 => Self::Format,
            18 => Self::Version,
            19 => Self::NotFound,
            20 => Self::Index,
            21 => Self::Debug,
            22 => Self::Init,
            23 => Self::UserData,
            24 => Self::InitJit,
            25 => Self::Params,
            26 => Self::Domain,
            27 => Self::General,
            _ => return None,
        })
    }

    /// Short description, matching the classic diagnostic strings.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Exit => "forced exit",
            Self::Assert => "assertion failed",
            Self::StackErr => "stack/heap collision",
            Self::Bounds => "index out of bounds",
            Self::MemAccess => "invalid memory access",
            Self::InvInstr => "invalid instruction",
            Self::StackLow => "stack underflow",
            Self::HeapLow => "heap underflow",
            Self::Callback => "no callback, or invalid callback",
            Self::Native => "native function failed",
            Self::Divide => "divide by zero",
            Self::Sleep => "(sleep mode)",
            Self::InvState => "invalid state for this access",
            Self::Memory => "out of memory",
            Self::Format => "invalid file format",
            Self::Version => "file is for a newer version of the AMX",
            Self::NotFound => "function not found",
            Self::Index => "invalid index parameter (bad entry point)",
            Self::Debug => "debugger cannot run",
            Self::Init => "AMX not initialized (or doubly initialized)",
            Self::UserData => "unable to set user data field (table full)",
            Self::InitJit => "cannot initialize the JIT",
            Self::Params => "parameter error",
            Self::Domain => "domain error, expression result does not fit in range",
            Self::General => "general error (unknown or unspecific error)",
        }
    }
}

impl fmt::Display for AmxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (error {})", self.description(), self.code())
    }
}

impl core::error::Error for AmxError {}
