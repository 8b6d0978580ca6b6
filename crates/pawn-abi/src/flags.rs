// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Module and instance flag bits.
//!
//! The low bits come from the module header and describe how the module
//! was compiled; the high bits are maintained by the machine at run time.

use bitflags::bitflags;

bitflags! {
    /// Flags describing a module and the state of its instance.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct AmxFlags: u16 {
        /// Symbolic debug information is available.
        const DEBUG = 0x02;
        /// The code section uses the compact variable-length encoding.
        const COMPACT = 0x04;
        /// The script uses sleep (possible re-entry or power-down mode).
        const SLEEP = 0x08;
        /// No array bounds checking; no BREAK opcodes.
        const NOCHECKS = 0x10;
        /// Address operands must stay module-relative.
        const NO_RELOC = 0x200;
        /// The direct system-request form is not used.
        const NO_SYSREQD = 0x400;
        /// The script uses the optimized system-request form.
        const SYSREQN = 0x800;
        /// All native functions required by the module are registered.
        const NTVREG = 0x1000;
        /// The instance runs JIT-compiled native code.
        const JITC = 0x2000;
        /// Busy browsing the code section.
        const BROWSE = 0x4000;
        /// Address operands have been verified and relocated.
        const RELOC = 0x8000;
    }
}
