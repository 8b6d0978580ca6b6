// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Heap allotment and host-side stack pushes.
//!
//! The heap is a stack-like arena: `allot` bumps `hea` upward and
//! returns a mark; `release` rewinds to a previously returned mark,
//! invalidating everything allotted after it. Pushes move `stk`
//! downward. Both sides keep the safety margin to the other intact.

use pawn_abi::cell::{CELL_SIZE, CHARS_PER_CELL, STK_MARGIN};
use pawn_abi::{AmxError, Cell};

use super::Amx;

impl Amx {
    /// Allocate cells on the heap.
    ///
    /// Returns the data-relative address of the first cell. The caller
    /// keeps the returned mark and rewinds with [`Amx::release`] once
    /// the memory is no longer referenced by a pending call.
    ///
    /// # Errors
    ///
    /// [`AmxError::HeapLow`] when the allocation would cross into the
    /// safety margin below the stack; the heap is left unchanged.
    pub fn allot(&mut self, cells: usize) -> Result<Cell, AmxError> {
        let bytes = cells * CELL_SIZE;
        let new_hea = (self.hea as i64) + bytes as i64;
        if new_hea + i64::from(STK_MARGIN) > i64::from(self.stk) {
            return Err(AmxError::HeapLow);
        }
        let amx_addr = self.hea;
        self.hea = new_hea as Cell;
        Ok(amx_addr)
    }

    /// Rewind the heap to a mark returned by [`Amx::allot`].
    ///
    /// All cells allotted at or above the mark become invalid.
    ///
    /// # Errors
    ///
    /// [`AmxError::Params`] when the mark lies outside the live heap or
    /// is not cell-aligned.
    pub fn release(&mut self, amx_addr: Cell) -> Result<(), AmxError> {
        if amx_addr < self.hlw
            || amx_addr > self.hea
            || amx_addr.rem_euclid(CELL_SIZE as Cell) != 0
        {
            return Err(AmxError::Params);
        }
        self.hea = amx_addr;
        Ok(())
    }

    /// Push one cell onto the stack for the next call.
    ///
    /// # Errors
    ///
    /// [`AmxError::StackErr`] when the push would cross into the safety
    /// margin above the heap.
    pub fn push(&mut self, value: Cell) -> Result<(), AmxError> {
        let new_stk = i64::from(self.stk) - CELL_SIZE as i64;
        if new_stk < i64::from(self.hea) + i64::from(STK_MARGIN) {
            return Err(AmxError::StackErr);
        }
        self.stk = new_stk as Cell;
        self.write_cell(self.stk, value)?;
        self.paramcount += 1;
        Ok(())
    }

    /// Materialize an array on the heap and push its address.
    ///
    /// Returns the heap mark so the caller can [`Amx::release`] after
    /// the call completes.
    ///
    /// # Errors
    ///
    /// [`AmxError::HeapLow`] when the array does not fit,
    /// [`AmxError::StackErr`] when the address push fails.
    pub fn push_array(&mut self, cells: &[Cell]) -> Result<Cell, AmxError> {
        let amx_addr = self.allot(cells.len())?;
        self.set_cells(amx_addr, cells)?;
        self.push(amx_addr)?;
        Ok(amx_addr)
    }

    /// Materialize a string on the heap and push its address.
    ///
    /// `pack` stores the bytes four (or eight) to a cell; `wide` stores
    /// one Unicode scalar per cell instead of one byte. Returns the heap
    /// mark for a later [`Amx::release`].
    ///
    /// # Errors
    ///
    /// [`AmxError::HeapLow`] when the string does not fit,
    /// [`AmxError::StackErr`] when the address push fails.
    pub fn push_string(&mut self, string: &str, pack: bool, wide: bool) -> Result<Cell, AmxError> {
        let cells = string_cells(string, pack, wide);
        let amx_addr = self.allot(cells)?;
        self.set_string(amx_addr, string, pack, wide, cells)?;
        self.push(amx_addr)?;
        Ok(amx_addr)
    }

    /// Like [`Amx::push_string`], but only the first `length` characters
    /// of the string are passed (bytes unless `wide`).
    ///
    /// # Errors
    ///
    /// See [`Amx::push_string`].
    pub fn push_string_len(
        &mut self,
        string: &str,
        length: usize,
        pack: bool,
        wide: bool,
    ) -> Result<Cell, AmxError> {
        let truncated = truncate_chars(string, length, wide);
        self.push_string(truncated, pack, wide)
    }
}

/// Number of cells a marshalled string occupies, terminator included.
fn string_cells(string: &str, pack: bool, wide: bool) -> usize {
    if pack {
        string.len() / CHARS_PER_CELL + 1
    } else if wide {
        string.chars().count() + 1
    } else {
        string.len() + 1
    }
}

/// Truncate to `length` characters: bytes on a byte-per-cell string,
/// Unicode scalars on a wide one. Falls back to the char boundary at or
/// below the cut.
fn truncate_chars(string: &str, length: usize, wide: bool) -> &str {
    if wide {
        match string.char_indices().nth(length) {
            Some((offset, _)) => &string[..offset],
            None => string,
        }
    } else {
        let mut cut = length.min(string.len());
        while !string.is_char_boundary(cut) {
            cut -= 1;
        }
        &string[..cut]
    }
}
