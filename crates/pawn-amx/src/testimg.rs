// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! In-memory module images for tests.
//!
//! Builds the byte layout the toolchain produces: header, definition
//! tables, code, initial data. Code starts with the conventional
//! `halt 0`, so a top-level return (to the zero return address) stops
//! the machine cleanly.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;

use pawn_abi::cell::{CELL_SIZE, cell_to_le};
use pawn_abi::header::{AMX_MAGIC, CUR_FILE_VERSION, EXP_MAX, MIN_AMX_VERSION, funcstub_size};
use pawn_abi::{Cell, Ucell};

use crate::bytecode::Opcode;

/// Builder for a complete module image.
pub(crate) struct ImageBuilder {
    code: Vec<Cell>,
    data: Vec<Cell>,
    publics: Vec<(String, u32)>,
    natives: Vec<String>,
    pubvars: Vec<(String, u32)>,
    tags: Vec<(String, Cell)>,
    cip: i32,
    stack_heap: usize,
    extra_flags: u16,
}

impl ImageBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            code: Vec::new(),
            data: Vec::new(),
            publics: Vec::new(),
            natives: Vec::new(),
            pubvars: Vec::new(),
            tags: Vec::new(),
            cip: -1,
            stack_heap: 256 * CELL_SIZE,
            extra_flags: 0,
        };
        builder.emit(Opcode::Halt, &[0]);
        builder
    }

    /// Byte offset of the next emitted instruction.
    pub fn here(&self) -> Cell {
        (self.code.len() * CELL_SIZE) as Cell
    }

    /// Append an instruction.
    pub fn emit(&mut self, opcode: Opcode, params: &[Cell]) -> &mut Self {
        assert_eq!(
            opcode.operand_cells(),
            Some(params.len()),
            "operand count mismatch for {opcode:?}"
        );
        self.code.push(opcode as u32 as Cell);
        self.code.extend_from_slice(params);
        self
    }

    /// Append a raw cell to the code stream (case tables).
    pub fn raw(&mut self, cell: Cell) -> &mut Self {
        self.code.push(cell);
        self
    }

    /// Mark the next instruction as the module entry point.
    pub fn main_here(&mut self) -> &mut Self {
        self.cip = self.here() as i32;
        self
    }

    /// Register a public function entered at the next instruction.
    pub fn public_here(&mut self, name: &str) -> &mut Self {
        let offset = self.here() as u32;
        self.publics.push((name.to_string(), offset));
        self
    }

    /// Import a native by name.
    pub fn native(&mut self, name: &str) -> &mut Self {
        self.natives.push(name.to_string());
        self
    }

    /// Append one cell of initial data, returning its address.
    pub fn data_cell(&mut self, value: Cell) -> Cell {
        let addr = (self.data.len() * CELL_SIZE) as Cell;
        self.data.push(value);
        addr
    }

    /// Register a public variable at a previously added data address.
    pub fn pubvar(&mut self, name: &str, addr: Cell) -> &mut Self {
        self.pubvars.push((name.to_string(), addr as u32));
        self
    }

    /// Register a tagname.
    pub fn tag(&mut self, name: &str, tag_id: Cell) -> &mut Self {
        self.tags.push((name.to_string(), tag_id));
        self
    }

    /// Size of the heap+stack arena in bytes.
    pub fn stack_heap(&mut self, bytes: usize) -> &mut Self {
        self.stack_heap = bytes;
        self
    }

    /// Extra header flag bits.
    pub fn flags(&mut self, bits: u16) -> &mut Self {
        self.extra_flags |= bits;
        self
    }

    /// Assemble the image bytes.
    pub fn build(&self) -> Vec<u8> {
        let defsize = funcstub_size();
        let publics = TableSpan::table(56, self.publics.len(), defsize);
        let natives = TableSpan::table(publics.end, self.natives.len(), defsize);
        let libraries = TableSpan::table(natives.end, 0, defsize);
        let pubvars = TableSpan::table(libraries.end, self.pubvars.len(), defsize);
        let tags = TableSpan::table(pubvars.end, self.tags.len(), defsize);

        let cod = tags.end.next_multiple_of(CELL_SIZE as u32);
        let dat = cod + (self.code.len() * CELL_SIZE) as u32;
        let hea = dat + (self.data.len() * CELL_SIZE) as u32;
        let stp = hea + self.stack_heap as u32;
        let size = hea;

        let mut bytes = vec![0u8; size as usize];
        bytes[0..4].copy_from_slice(&size.to_le_bytes());
        bytes[4..6].copy_from_slice(&AMX_MAGIC.to_le_bytes());
        bytes[6] = CUR_FILE_VERSION;
        bytes[7] = MIN_AMX_VERSION;
        bytes[8..10].copy_from_slice(&self.extra_flags.to_le_bytes());
        bytes[10..12].copy_from_slice(&(defsize as u16).to_le_bytes());
        bytes[12..16].copy_from_slice(&cod.to_le_bytes());
        bytes[16..20].copy_from_slice(&dat.to_le_bytes());
        bytes[20..24].copy_from_slice(&hea.to_le_bytes());
        bytes[24..28].copy_from_slice(&stp.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.cip.to_le_bytes());
        bytes[32..36].copy_from_slice(&publics.start.to_le_bytes());
        bytes[36..40].copy_from_slice(&natives.start.to_le_bytes());
        bytes[40..44].copy_from_slice(&libraries.start.to_le_bytes());
        bytes[44..48].copy_from_slice(&pubvars.start.to_le_bytes());
        bytes[48..52].copy_from_slice(&tags.start.to_le_bytes());
        // No name table: inline records.

        for (i, (name, address)) in self.publics.iter().enumerate() {
            write_record(&mut bytes, publics.start, i, defsize, *address as Ucell, name);
        }
        for (i, name) in self.natives.iter().enumerate() {
            write_record(&mut bytes, natives.start, i, defsize, 0, name);
        }
        for (i, (name, address)) in self.pubvars.iter().enumerate() {
            write_record(&mut bytes, pubvars.start, i, defsize, *address as Ucell, name);
        }
        for (i, (name, tag_id)) in self.tags.iter().enumerate() {
            write_record(&mut bytes, tags.start, i, defsize, *tag_id as Ucell, name);
        }

        for (i, &cell) in self.code.iter().enumerate() {
            cell_to_le(cell, &mut bytes[cod as usize + i * CELL_SIZE..]);
        }
        for (i, &cell) in self.data.iter().enumerate() {
            cell_to_le(cell, &mut bytes[dat as usize + i * CELL_SIZE..]);
        }

        bytes
    }
}

struct TableSpan {
    start: u32,
    end: u32,
}

impl TableSpan {
    fn table(start: u32, entries: usize, defsize: usize) -> Self {
        Self {
            start,
            end: start + (entries * defsize) as u32,
        }
    }
}

fn write_record(
    bytes: &mut [u8],
    table: u32,
    index: usize,
    defsize: usize,
    address: Ucell,
    name: &str,
) {
    assert!(name.len() <= EXP_MAX, "name too long for inline record");
    let at = table as usize + index * defsize;
    cell_to_le(address as Cell, &mut bytes[at..]);
    bytes[at + CELL_SIZE..at + CELL_SIZE + name.len()].copy_from_slice(name.as_bytes());
}

/// Encode one cell in the compact scheme: most significant 7-bit group
/// first, continuation bit on every byte but the last, redundant leading
/// groups stripped down to the sign.
pub(crate) fn compress_cell(value: Cell, out: &mut Vec<u8>) {
    let groups = pawn_abi::cell::CELL_BITS.div_ceil(7);
    let mut bytes = Vec::with_capacity(groups);
    let mut v = value;
    for _ in 0..groups {
        bytes.push((v & 0x7F) as u8);
        v >>= 7; // arithmetic shift keeps the sign
    }
    // Strip redundant leading groups, keeping the sign in bit 6.
    while bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let next = bytes[bytes.len() - 2];
        let sign_fill = if value < 0 { 0x7F } else { 0x00 };
        let sign_bit = if value < 0 { 0x40 } else { 0x00 };
        if last == sign_fill && (next & 0x40) == sign_bit {
            bytes.pop();
        } else {
            break;
        }
    }
    for (i, byte) in bytes.iter().rev().enumerate() {
        let cont = if i + 1 == bytes.len() { 0 } else { 0x80 };
        out.push(byte | cont);
    }
}

/// Encode a cell sequence in the compact scheme.
pub(crate) fn compress(cells: &[Cell]) -> Vec<u8> {
    let mut out = Vec::new();
    for &cell in cells {
        compress_cell(cell, &mut out);
    }
    out
}

/// Re-encode a plain image as a compact one: the code+data cells become
/// a compressed stream, the size shrinks, the flag is set.
pub(crate) fn make_compact(image: &[u8]) -> Vec<u8> {
    use pawn_abi::cell::cell_from_le;

    let cod = u32::from_le_bytes(image[12..16].try_into().unwrap()) as usize;
    let hea = u32::from_le_bytes(image[20..24].try_into().unwrap()) as usize;

    let cells: Vec<Cell> = image[cod..hea].chunks_exact(CELL_SIZE).map(cell_from_le).collect();
    let stream = compress(&cells);

    let mut out = image[..cod].to_vec();
    out.extend_from_slice(&stream);

    let size = out.len() as u32;
    out[0..4].copy_from_slice(&size.to_le_bytes());
    let flags = u16::from_le_bytes([out[8], out[9]]) | pawn_abi::AmxFlags::COMPACT.bits();
    out[8..10].copy_from_slice(&flags.to_le_bytes());
    out
}

/// A module whose `main` is just `proc; retn` after the mandatory halt.
pub(crate) fn empty_module() -> Vec<u8> {
    let mut img = ImageBuilder::new();
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::Retn, &[]);
    img.build()
}
