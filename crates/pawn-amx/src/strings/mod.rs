// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! String marshalling between host strings and cell strings.
//!
//! Script strings live in cells in one of two layouts, both terminated:
//!
//! - **unpacked**: one character per cell, terminated by a zero cell;
//! - **packed**: one byte per character, [`CHARS_PER_CELL`] to a cell in
//!   big-endian order within the cell value (the first character in the
//!   most significant byte), terminated by a zero byte.
//!
//! A string is recognized as packed when its first cell exceeds
//! [`UNPACKED_MAX`]. The `wide` flavor stores one Unicode scalar per
//! cell; without it, cells carry raw bytes. Packing always operates on
//! bytes, so `wide` has no effect on packed strings.


use alloc::string::String;
use alloc::vec::Vec;

use pawn_abi::cell::{CELL_BITS, CELL_SIZE, CHAR_BITS, CHARS_PER_CELL, UNPACKED_MAX};
use pawn_abi::{AmxError, Cell, Ucell};

use crate::machine::Amx;

/// Extract the byte at packed position `i` (0 = most significant).
#[inline]
fn packed_byte(cell: Cell, i: usize) -> u8 {
    ((cell as Ucell) >> (CELL_BITS - CHAR_BITS * (i + 1))) as u8
}

/// Pack up to [`CHARS_PER_CELL`] bytes into one cell, first byte in the
/// most significant position.
#[inline]
fn pack_cell(chunk: &[u8]) -> Cell {
    let mut value: Ucell = 0;
    for (i, &byte) in chunk.iter().enumerate() {
        value |= (byte as Ucell) << (CELL_BITS - CHAR_BITS * (i + 1));
    }
    value as Cell
}

impl Amx {
    /// Length of the cell string at `amx_addr`, in characters.
    ///
    /// # Errors
    ///
    /// [`AmxError::MemAccess`] when the string runs past the data region
    /// without a terminator.
    pub fn str_len(&self, amx_addr: Cell) -> Result<usize, AmxError> {
        let first = self.read_cell(amx_addr)?;
        if (first as Ucell) > UNPACKED_MAX {
            // Packed: scan bytes within consecutive cells.
            let mut len = 0;
            let mut addr = amx_addr;
            loop {
                let cell = self.read_cell(addr)?;
                for i in 0..CHARS_PER_CELL {
                    if packed_byte(cell, i) == 0 {
                        return Ok(len);
                    }
                    len += 1;
                }
                addr += CELL_SIZE as Cell;
            }
        } else {
            let mut len = 0;
            loop {
                if self.read_cell(amx_addr + (len * CELL_SIZE) as Cell)? == 0 {
                    return Ok(len);
                }
                len += 1;
            }
        }
    }

    /// Raw character values of the cell string at `amx_addr`, up to
    /// `size` characters including the terminator.
    fn read_chars(&self, amx_addr: Cell, size: usize) -> Result<Vec<Ucell>, AmxError> {
        let mut out = Vec::new();
        if size == 0 {
            return Ok(out);
        }
        let first = self.read_cell(amx_addr)?;
        if (first as Ucell) > UNPACKED_MAX {
            let mut addr = amx_addr;
            'outer: loop {
                let cell = self.read_cell(addr)?;
                for i in 0..CHARS_PER_CELL {
                    let byte = packed_byte(cell, i);
                    if byte == 0 || out.len() + 1 >= size {
                        break 'outer;
                    }
                    out.push(Ucell::from(byte));
                }
                addr += CELL_SIZE as Cell;
            }
        } else {
            loop {
                let cell = self.read_cell(amx_addr + (out.len() * CELL_SIZE) as Cell)?;
                if cell == 0 || out.len() + 1 >= size {
                    break;
                }
                out.push(cell as Ucell);
            }
        }
        Ok(out)
    }

    /// Marshal a cell string into a host string.
    ///
    /// At most `size` characters are consumed, terminator included.
    /// With `wide`, unpacked cells are Unicode scalars; otherwise cells
    /// and packed bytes are taken as UTF-8 data.
    ///
    /// # Errors
    ///
    /// [`AmxError::MemAccess`] on an unterminated string,
    /// [`AmxError::Format`] when the data is not valid text.
    pub fn get_string(&self, amx_addr: Cell, wide: bool, size: usize) -> Result<String, AmxError> {
        let chars = self.read_chars(amx_addr, size)?;
        let first = self.read_cell(amx_addr)?;
        let packed = (first as Ucell) > UNPACKED_MAX;

        if wide && !packed {
            chars
                .iter()
                .map(|&c| {
                    u32::try_from(c)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or(AmxError::Format)
                })
                .collect()
        } else {
            let bytes: Vec<u8> = chars.iter().map(|&c| c as u8).collect();
            String::from_utf8(bytes).map_err(|_| AmxError::Format)
        }
    }

    /// Marshal a host string into a cell string of at most `size` cells,
    /// truncating to fit and always writing a terminator.
    ///
    /// With `pack`, the bytes are packed [`CHARS_PER_CELL`] to a cell;
    /// with `wide`, unpacked cells receive one Unicode scalar each.
    ///
    /// # Errors
    ///
    /// [`AmxError::MemAccess`] when `size` cells do not fit at the
    /// destination, [`AmxError::Params`] for a zero-sized destination.
    pub fn set_string(
        &mut self,
        amx_addr: Cell,
        string: &str,
        pack: bool,
        wide: bool,
        size: usize,
    ) -> Result<(), AmxError> {
        if size == 0 {
            return Err(AmxError::Params);
        }
        self.chk_range(amx_addr, size * CELL_SIZE)?;

        if pack {
            let capacity = size * CHARS_PER_CELL - 1;
            let bytes = &string.as_bytes()[..string.len().min(capacity)];
            // Terminator cell first, covering the padding bytes.
            self.write_cell(
                amx_addr + ((bytes.len() / CHARS_PER_CELL) * CELL_SIZE) as Cell,
                0,
            )?;
            for (i, chunk) in bytes.chunks(CHARS_PER_CELL).enumerate() {
                self.write_cell(amx_addr + (i * CELL_SIZE) as Cell, pack_cell(chunk))?;
            }
        } else if wide {
            let mut addr = amx_addr;
            for c in string.chars().take(size - 1) {
                self.write_cell(addr, c as u32 as Cell)?;
                addr += CELL_SIZE as Cell;
            }
            self.write_cell(addr, 0)?;
        } else {
            let bytes = &string.as_bytes()[..string.len().min(size - 1)];
            for (i, &byte) in bytes.iter().enumerate() {
                self.write_cell(amx_addr + (i * CELL_SIZE) as Cell, Cell::from(byte))?;
            }
            self.write_cell(amx_addr + (bytes.len() * CELL_SIZE) as Cell, 0)?;
        }
        Ok(())
    }

    /// Like [`Amx::set_string`], passing only the first `length`
    /// characters of the string.
    ///
    /// # Errors
    ///
    /// See [`Amx::set_string`].
    pub fn set_string_len(
        &mut self,
        amx_addr: Cell,
        string: &str,
        length: usize,
        pack: bool,
        wide: bool,
        size: usize,
    ) -> Result<(), AmxError> {
        let truncated = if wide {
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
        };
        self.set_string(amx_addr, truncated, pack, wide, size)
    }

    /// Number of UTF-8 code points in the cell string at `amx_addr`.
    ///
    /// The cells are taken as a byte sequence (packed or one byte per
    /// cell) holding UTF-8 data.
    ///
    /// # Errors
    ///
    /// [`AmxError::Format`] on malformed UTF-8,
    /// [`AmxError::MemAccess`] on an unterminated string.
    pub fn utf8_len(&self, amx_addr: Cell) -> Result<usize, AmxError> {
        let len = self.str_len(amx_addr)?;
        let chars = self.read_chars(amx_addr, len + 1)?;
        let bytes: Vec<u8> = chars.iter().map(|&c| c as u8).collect();
        crate::utf8::utf8_check(&bytes)
    }
}
