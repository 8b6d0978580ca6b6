// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! The abstract machine instance.
//!
//! An [`Amx`] owns all execution state: the shared module image (header,
//! definition tables, code, and the pristine initial data), a private
//! data+heap+stack region, the register file, native bindings, and the
//! host hooks. The interpreter in [`crate::vm`] is stateless and
//! operates on an instance by reference.
//!
//! Memory layout of the data region (addresses are data-relative bytes):
//!
//! ```text
//! 0                hlw      hea          stk              stp
//! │   globals (DAT) │  heap  │   free gap  │     stack     │
//! │                 │ grows ─►             ◄─ grows        │
//! ```
//!
//! The free gap is never addressable; `hlw ≤ hea ≤ stk ≤ stp` holds in
//! every reachable state.

mod heap;
mod tables;
mod userdata;

#[cfg(test)]
mod machine_test;

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::ffi::c_void;
use core::ptr;

use pawn_abi::cell::{CELL_SIZE, cell_from_le, cell_to_le};
use pawn_abi::{AmxError, AmxFlags, AmxHeader, Cell};

use crate::natives::{AmxCallback, AmxDebug, AmxNative};

/// Number of user-data slots per instance.
pub const USER_NUM: usize = 4;

/// Opaque host pointer stored in a user-data slot.
pub type UserData = *mut c_void;

/// The immutable half of a loaded module, shared between clones.
///
/// Everything here is read-only after the loader finishes; the only
/// exception is the system-request call-site rewrite, which requires
/// exclusive ownership and therefore cannot observe a clone.
pub(crate) struct SharedImage {
    /// The decoded and validated header.
    pub header: AmxHeader,
    /// Raw image bytes below the code section: header, definition
    /// tables, and the name table.
    pub prefix: Vec<u8>,
    /// The code section, decoded to cells.
    pub code: Vec<Cell>,
    /// Pristine initial bytes of the data section; seeds every data
    /// region, including those of clones.
    pub init_data: Vec<u8>,
}

/// An abstract machine instance.
pub struct Amx {
    /// Shared module image; `None` while uninitialized.
    pub(crate) image: Option<Arc<SharedImage>>,
    /// Private data+heap+stack region, `stp` bytes.
    pub(crate) data: Vec<u8>,

    /// Code instruction pointer, code-relative bytes.
    pub(crate) cip: Cell,
    /// Frame base, data-relative.
    pub(crate) frm: Cell,
    /// Heap bump pointer.
    pub(crate) hea: Cell,
    /// Heap floor.
    pub(crate) hlw: Cell,
    /// Stack pointer.
    pub(crate) stk: Cell,
    /// Stack ceiling.
    pub(crate) stp: Cell,
    /// Primary accumulator, preserved only across sleep.
    pub(crate) pri: Cell,
    /// Alternate accumulator, preserved only across sleep.
    pub(crate) alt: Cell,
    /// Stack mark captured at top-level entry.
    pub(crate) reset_stk: Cell,
    /// Heap mark captured at top-level entry.
    pub(crate) reset_hea: Cell,

    /// Module and instance flags.
    pub(crate) flags: AmxFlags,
    /// Sticky error, consumed at the next `exec` entry.
    pub(crate) error: Option<AmxError>,
    /// Cells pushed by the host since the last top-level call.
    pub(crate) paramcount: usize,
    /// Cached native index of the last direct system request.
    pub(crate) sysreq_d: Cell,

    /// Native bindings, parallel to the module's native table.
    pub(crate) natives: Vec<Option<AmxNative>>,
    /// System-request callback.
    pub(crate) callback: Option<AmxCallback>,
    /// Per-statement debug hook.
    pub(crate) debug: Option<AmxDebug>,

    usertags: [u32; USER_NUM],
    userdata: [UserData; USER_NUM],
}

impl Amx {
    /// Create an uninitialized instance.
    ///
    /// Load a module into it with [`Amx::init`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            image: None,
            data: Vec::new(),
            cip: 0,
            frm: 0,
            hea: 0,
            hlw: 0,
            stk: 0,
            stp: 0,
            pri: 0,
            alt: 0,
            reset_stk: 0,
            reset_hea: 0,
            flags: AmxFlags::empty(),
            error: None,
            paramcount: 0,
            sysreq_d: 0,
            natives: Vec::new(),
            callback: None,
            debug: None,
            usertags: [0; USER_NUM],
            userdata: [ptr::null_mut(); USER_NUM],
        }
    }

    /// Whether the instance has a module loaded and verified.
    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.flags.contains(AmxFlags::RELOC)
    }

    /// Detach the module and return the instance to the uninitialized
    /// state. Hooks are cleared and registers zeroed.
    ///
    /// # Errors
    ///
    /// [`AmxError::InvState`] while the instance is busy browsing.
    pub fn cleanup(&mut self) -> Result<(), AmxError> {
        if self.flags.contains(AmxFlags::BROWSE) {
            return Err(AmxError::InvState);
        }
        *self = Self::new();
        Ok(())
    }

    /// The instance flags.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> AmxFlags {
        self.flags
    }

    /// The sticky error, if any.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<AmxError> {
        self.error
    }

    /// Record an error on the instance.
    ///
    /// A native that returns after raising an error aborts the current
    /// `exec` with that error.
    #[inline]
    pub fn raise_error(&mut self, error: AmxError) {
        self.error = Some(error);
    }

    /// The primary accumulator.
    #[inline]
    #[must_use]
    pub fn pri(&self) -> Cell {
        self.pri
    }

    /// The alternate accumulator.
    #[inline]
    #[must_use]
    pub fn alt(&self) -> Cell {
        self.alt
    }

    /// Native index of the last direct system request, zero before any.
    #[inline]
    #[must_use]
    pub fn sysreq_d(&self) -> Cell {
        self.sysreq_d
    }

    /// Install the system-request callback.
    pub fn set_callback(&mut self, callback: AmxCallback) {
        self.callback = Some(callback);
    }

    /// Remove the system-request callback.
    ///
    /// Without a callback, any system request fails with
    /// [`AmxError::Callback`].
    pub fn clear_callback(&mut self) {
        self.callback = None;
    }

    /// Install the per-statement debug hook.
    pub fn set_debug_hook(&mut self, debug: AmxDebug) {
        self.debug = Some(debug);
    }

    /// Remove the debug hook.
    pub fn clear_debug_hook(&mut self) {
        self.debug = None;
    }

    /// Code, data, and combined stack+heap sizes in bytes.
    ///
    /// # Errors
    ///
    /// [`AmxError::Init`] when no module is loaded.
    pub fn mem_info(&self) -> Result<(usize, usize, usize), AmxError> {
        let header = self.header()?;
        let code = (header.dat - header.cod) as usize;
        let data = (header.hea - header.dat) as usize;
        let stack_heap = (header.stp - header.hea) as usize;
        Ok((code, data, stack_heap))
    }

    /// Longest symbol name of the loaded module, excluding the NUL.
    ///
    /// # Errors
    ///
    /// [`AmxError::Init`] when no module is loaded.
    pub fn name_length(&self) -> Result<usize, AmxError> {
        Ok(self.header()?.name_length())
    }

    // -------------------------------------------------------------------------
    // Crate-internal access
    // -------------------------------------------------------------------------

    pub(crate) fn shared(&self) -> Result<&Arc<SharedImage>, AmxError> {
        self.image.as_ref().ok_or(AmxError::Init)
    }

    pub(crate) fn header(&self) -> Result<&AmxHeader, AmxError> {
        Ok(&self.shared()?.header)
    }

    /// Validate a data-relative byte range.
    #[inline]
    pub(crate) fn chk_range(&self, addr: Cell, len: usize) -> Result<usize, AmxError> {
        let offset = usize::try_from(addr).map_err(|_| AmxError::MemAccess)?;
        let end = offset.checked_add(len).ok_or(AmxError::MemAccess)?;
        if end > self.stp as usize {
            return Err(AmxError::MemAccess);
        }
        Ok(offset)
    }

    /// Validate a data-relative cell address for indirect access: in
    /// range and not inside the free gap between heap and stack.
    #[inline]
    pub(crate) fn chk_mem(&self, addr: Cell) -> Result<usize, AmxError> {
        let offset = self.chk_range(addr, CELL_SIZE)?;
        if addr >= self.hea && addr < self.stk {
            return Err(AmxError::MemAccess);
        }
        Ok(offset)
    }

    /// Read a cell at a validated byte offset.
    #[inline]
    pub(crate) fn cell_at(&self, offset: usize) -> Cell {
        cell_from_le(&self.data[offset..])
    }

    /// Write a cell at a validated byte offset.
    #[inline]
    pub(crate) fn set_cell_at(&mut self, offset: usize, value: Cell) {
        cell_to_le(value, &mut self.data[offset..]);
    }

    /// Read a byte at a validated offset.
    #[inline]
    pub(crate) fn data_byte(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    /// Write a byte at a validated offset.
    #[inline]
    pub(crate) fn set_data_byte(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    /// Copy bytes between validated data offsets; the ranges may overlap.
    pub(crate) fn copy_data(&mut self, src: usize, dst: usize, len: usize) {
        self.data.copy_within(src..src + len, dst);
    }

    /// Compare two validated byte ranges, returning the difference of
    /// the first unequal pair.
    pub(crate) fn compare_data(&self, lhs: usize, rhs: usize, len: usize) -> Cell {
        for i in 0..len {
            let a = self.data[lhs + i];
            let b = self.data[rhs + i];
            if a != b {
                return Cell::from(a) - Cell::from(b);
            }
        }
        0
    }

    /// Read a cell at a data-relative address, range-checked.
    #[inline]
    pub(crate) fn read_cell(&self, addr: Cell) -> Result<Cell, AmxError> {
        let offset = self.chk_range(addr, CELL_SIZE)?;
        Ok(self.cell_at(offset))
    }

    /// Write a cell at a data-relative address, range-checked.
    #[inline]
    pub(crate) fn write_cell(&mut self, addr: Cell, value: Cell) -> Result<(), AmxError> {
        let offset = self.chk_range(addr, CELL_SIZE)?;
        self.set_cell_at(offset, value);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Host access to script memory
    // -------------------------------------------------------------------------

    /// Validate a data-relative cell address for host access, returning
    /// its byte offset within the data region.
    ///
    /// The offset is the host-side handle to the cell; reads and writes
    /// go through [`Amx::get_cell`] and [`Amx::set_cell`].
    ///
    /// # Errors
    ///
    /// [`AmxError::MemAccess`] when the address lies outside
    /// `[0, stp)` or inside the free gap between heap and stack.
    pub fn get_addr(&self, amx_addr: Cell) -> Result<usize, AmxError> {
        self.chk_mem(amx_addr)
    }

    /// Read a cell from script memory.
    ///
    /// The address must not point into the free gap between heap and
    /// stack.
    ///
    /// # Errors
    ///
    /// [`AmxError::MemAccess`] on an invalid address.
    pub fn get_cell(&self, amx_addr: Cell) -> Result<Cell, AmxError> {
        let offset = self.chk_mem(amx_addr)?;
        Ok(self.cell_at(offset))
    }

    /// Write a cell into script memory.
    ///
    /// # Errors
    ///
    /// [`AmxError::MemAccess`] on an invalid address.
    pub fn set_cell(&mut self, amx_addr: Cell, value: Cell) -> Result<(), AmxError> {
        let offset = self.chk_mem(amx_addr)?;
        self.set_cell_at(offset, value);
        Ok(())
    }

    /// Read consecutive cells from script memory.
    ///
    /// # Errors
    ///
    /// [`AmxError::MemAccess`] when any part of the range is invalid.
    pub fn get_cells(&self, amx_addr: Cell, count: usize) -> Result<Vec<Cell>, AmxError> {
        let offset = self.chk_range(amx_addr, count * CELL_SIZE)?;
        Ok((0..count)
            .map(|i| self.cell_at(offset + i * CELL_SIZE))
            .collect())
    }

    /// Write consecutive cells into script memory.
    ///
    /// # Errors
    ///
    /// [`AmxError::MemAccess`] when any part of the range is invalid.
    pub fn set_cells(&mut self, amx_addr: Cell, cells: &[Cell]) -> Result<(), AmxError> {
        let offset = self.chk_range(amx_addr, cells.len() * CELL_SIZE)?;
        for (i, &cell) in cells.iter().enumerate() {
            self.set_cell_at(offset + i * CELL_SIZE, cell);
        }
        Ok(())
    }
}

impl Default for Amx {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Amx {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Amx")
            .field("initialized", &self.is_initialized())
            .field("cip", &self.cip)
            .field("frm", &self.frm)
            .field("stk", &self.stk)
            .field("hea", &self.hea)
            .field("flags", &self.flags)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

// The user-data slots hold raw host pointers, so the compiler refuses to
// derive Send/Sync; that refusal is correct. An instance belongs to the
// thread that created it.
