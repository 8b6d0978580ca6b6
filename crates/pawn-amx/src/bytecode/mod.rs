// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Bytecode definitions for the abstract machine.
//!
//! Code is a sequence of cells: one opcode cell followed by that
//! opcode's operand cells. The set is the file-version-9 set: the core
//! machine (1..137), the macro-fused forms (138..157) that bundle two to
//! five primitive steps to cut dispatch overhead, and the direct
//! system-request forms (158..159) produced by call-site rewriting after
//! native registration.
//!
//! Modules compiled with the `COMPACT` flag store the code and data
//! image in a variable-length byte encoding; [`expand`] restores the
//! plain cell form at load time.


use alloc::vec::Vec;
use num_enum::TryFromPrimitive;
use pawn_abi::cell::{CELL_BITS, CELL_SIZE, cell_to_le};
use pawn_abi::{AmxError, Cell};

/// One opcode of the abstract machine.
///
/// The discriminants are the on-disk encoding and never change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum Opcode {
    /// Invalid opcode; never appears in a valid module.
    None = 0,
    LoadPri = 1,
    LoadAlt = 2,
    LoadSPri = 3,
    LoadSAlt = 4,
    LrefPri = 5,
    LrefAlt = 6,
    LrefSPri = 7,
    LrefSAlt = 8,
    LoadI = 9,
    LodbI = 10,
    ConstPri = 11,
    ConstAlt = 12,
    AddrPri = 13,
    AddrAlt = 14,
    StorPri = 15,
    StorAlt = 16,
    StorSPri = 17,
    StorSAlt = 18,
    SrefPri = 19,
    SrefAlt = 20,
    SrefSPri = 21,
    SrefSAlt = 22,
    StorI = 23,
    StrbI = 24,
    Lidx = 25,
    LidxB = 26,
    Idxaddr = 27,
    IdxaddrB = 28,
    AlignPri = 29,
    AlignAlt = 30,
    Lctrl = 31,
    Sctrl = 32,
    MovePri = 33,
    MoveAlt = 34,
    Xchg = 35,
    PushPri = 36,
    PushAlt = 37,
    /// Obsolete.
    PushR = 38,
    PushC = 39,
    Push = 40,
    PushS = 41,
    PopPri = 42,
    PopAlt = 43,
    Stack = 44,
    Heap = 45,
    Proc = 46,
    Ret = 47,
    Retn = 48,
    Call = 49,
    CallPri = 50,
    Jump = 51,
    /// Obsolete.
    Jrel = 52,
    Jzer = 53,
    Jnz = 54,
    Jeq = 55,
    Jneq = 56,
    Jless = 57,
    Jleq = 58,
    Jgrtr = 59,
    Jgeq = 60,
    Jsless = 61,
    Jsleq = 62,
    Jsgrtr = 63,
    Jsgeq = 64,
    Shl = 65,
    Shr = 66,
    Sshr = 67,
    ShlCPri = 68,
    ShlCAlt = 69,
    ShrCPri = 70,
    ShrCAlt = 71,
    Smul = 72,
    Sdiv = 73,
    SdivAlt = 74,
    Umul = 75,
    Udiv = 76,
    UdivAlt = 77,
    Add = 78,
    Sub = 79,
    SubAlt = 80,
    And = 81,
    Or = 82,
    Xor = 83,
    Not = 84,
    Neg = 85,
    Invert = 86,
    AddC = 87,
    SmulC = 88,
    ZeroPri = 89,
    ZeroAlt = 90,
    Zero = 91,
    ZeroS = 92,
    SignPri = 93,
    SignAlt = 94,
    Eq = 95,
    Neq = 96,
    Less = 97,
    Leq = 98,
    Grtr = 99,
    Geq = 100,
    Sless = 101,
    Sleq = 102,
    Sgrtr = 103,
    Sgeq = 104,
    EqCPri = 105,
    EqCAlt = 106,
    IncPri = 107,
    IncAlt = 108,
    Inc = 109,
    IncS = 110,
    IncI = 111,
    DecPri = 112,
    DecAlt = 113,
    Dec = 114,
    DecS = 115,
    DecI = 116,
    Movs = 117,
    Cmps = 118,
    Fill = 119,
    Halt = 120,
    Bounds = 121,
    SysreqPri = 122,
    SysreqC = 123,
    /// Obsolete.
    File = 124,
    /// Obsolete.
    Line = 125,
    /// Obsolete.
    Symbol = 126,
    /// Obsolete.
    Srange = 127,
    JumpPri = 128,
    Switch = 129,
    Casetbl = 130,
    SwapPri = 131,
    SwapAlt = 132,
    PushAdr = 133,
    Nop = 134,
    SysreqN = 135,
    /// Obsolete.
    Symtag = 136,
    Break = 137,

    // Macro-fused forms (file version 9).
    Push2C = 138,
    Push2 = 139,
    Push2S = 140,
    Push2Adr = 141,
    Push3C = 142,
    Push3 = 143,
    Push3S = 144,
    Push3Adr = 145,
    Push4C = 146,
    Push4 = 147,
    Push4S = 148,
    Push4Adr = 149,
    Push5C = 150,
    Push5 = 151,
    Push5S = 152,
    Push5Adr = 153,
    LoadBoth = 154,
    LoadSBoth = 155,
    Const = 156,
    ConstS = 157,

    // Direct system requests, created by call-site rewriting.
    SysreqD = 158,
    SysreqNd = 159,
}

impl Opcode {
    /// Decode an opcode from a code cell.
    ///
    /// # Errors
    ///
    /// [`AmxError::InvInstr`] when the cell is not a known opcode.
    #[inline]
    pub fn from_cell(cell: Cell) -> Result<Self, AmxError> {
        u32::try_from(cell)
            .ok()
            .and_then(|raw| Self::try_from(raw).ok())
            .ok_or(AmxError::InvInstr)
    }

    /// Number of operand cells following the opcode.
    ///
    /// Returns `None` for [`Opcode::Casetbl`], whose length depends on
    /// the number of case records.
    #[must_use]
    pub const fn operand_cells(self) -> Option<usize> {
        Some(match self {
            Self::Casetbl => return None,

            Self::None
            | Self::LoadI
            | Self::StorI
            | Self::MovePri
            | Self::MoveAlt
            | Self::Xchg
            | Self::PushPri
            | Self::PushAlt
            | Self::PopPri
            | Self::PopAlt
            | Self::Proc
            | Self::Ret
            | Self::Retn
            | Self::CallPri
            | Self::JumpPri
            | Self::Shl
            | Self::Shr
            | Self::Sshr
            | Self::Smul
            | Self::Sdiv
            | Self::SdivAlt
            | Self::Umul
            | Self::Udiv
            | Self::UdivAlt
            | Self::Add
            | Self::Sub
            | Self::SubAlt
            | Self::And
            | Self::Or
            | Self::Xor
            | Self::Not
            | Self::Neg
            | Self::Invert
            | Self::ZeroPri
            | Self::ZeroAlt
            | Self::SignPri
            | Self::SignAlt
            | Self::Eq
            | Self::Neq
            | Self::Less
            | Self::Leq
            | Self::Grtr
            | Self::Geq
            | Self::Sless
            | Self::Sleq
            | Self::Sgrtr
            | Self::Sgeq
            | Self::IncPri
            | Self::IncAlt
            | Self::IncI
            | Self::DecPri
            | Self::DecAlt
            | Self::DecI
            | Self::Idxaddr
            | Self::Lidx
            | Self::SwapPri
            | Self::SwapAlt
            | Self::Nop
            | Self::SysreqPri
            | Self::Break => 0,

            Self::LoadPri
            | Self::LoadAlt
            | Self::LoadSPri
            | Self::LoadSAlt
            | Self::LrefPri
            | Self::LrefAlt
            | Self::LrefSPri
            | Self::LrefSAlt
            | Self::LodbI
            | Self::ConstPri
            | Self::ConstAlt
            | Self::AddrPri
            | Self::AddrAlt
            | Self::StorPri
            | Self::StorAlt
            | Self::StorSPri
            | Self::StorSAlt
            | Self::SrefPri
            | Self::SrefAlt
            | Self::SrefSPri
            | Self::SrefSAlt
            | Self::StrbI
            | Self::LidxB
            | Self::IdxaddrB
            | Self::AlignPri
            | Self::AlignAlt
            | Self::Lctrl
            | Self::Sctrl
            | Self::PushR
            | Self::PushC
            | Self::Push
            | Self::PushS
            | Self::Stack
            | Self::Heap
            | Self::Call
            | Self::Jump
            | Self::Jrel
            | Self::Jzer
            | Self::Jnz
            | Self::Jeq
            | Self::Jneq
            | Self::Jless
            | Self::Jleq
            | Self::Jgrtr
            | Self::Jgeq
            | Self::Jsless
            | Self::Jsleq
            | Self::Jsgrtr
            | Self::Jsgeq
            | Self::ShlCPri
            | Self::ShlCAlt
            | Self::ShrCPri
            | Self::ShrCAlt
            | Self::AddC
            | Self::SmulC
            | Self::Zero
            | Self::ZeroS
            | Self::EqCPri
            | Self::EqCAlt
            | Self::Inc
            | Self::IncS
            | Self::Dec
            | Self::DecS
            | Self::Movs
            | Self::Cmps
            | Self::Fill
            | Self::Halt
            | Self::Bounds
            | Self::SysreqC
            | Self::File
            | Self::Line
            | Self::Srange
            | Self::Switch
            | Self::PushAdr
            | Self::Symtag
            | Self::SysreqD => 1,

            Self::Symbol
            | Self::SysreqN
            | Self::Push2C
            | Self::Push2
            | Self::Push2S
            | Self::Push2Adr
            | Self::LoadBoth
            | Self::LoadSBoth
            | Self::Const
            | Self::ConstS
            | Self::SysreqNd => 2,

            Self::Push3C | Self::Push3 | Self::Push3S | Self::Push3Adr => 3,

            Self::Push4C | Self::Push4 | Self::Push4S | Self::Push4Adr => 4,

            Self::Push5C | Self::Push5 | Self::Push5S | Self::Push5Adr => 5,
        })
    }

    /// Whether the single operand is a code-relative branch target.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Call
                | Self::Jump
                | Self::Jzer
                | Self::Jnz
                | Self::Jeq
                | Self::Jneq
                | Self::Jless
                | Self::Jleq
                | Self::Jgrtr
                | Self::Jgeq
                | Self::Jsless
                | Self::Jsleq
                | Self::Jsgrtr
                | Self::Jsgeq
        )
    }

    /// Whether the opcode predates the supported file format and is
    /// rejected at load.
    #[must_use]
    pub const fn is_obsolete(self) -> bool {
        matches!(
            self,
            Self::PushR
                | Self::Jrel
                | Self::File
                | Self::Line
                | Self::Symbol
                | Self::Srange
                | Self::Symtag
        )
    }
}

/// Longest byte sequence one cell may occupy in the compact encoding.
const MAX_SEQUENCE: usize = CELL_BITS.div_ceil(7);

/// Expand a compact-encoded code+data image into plain cells.
///
/// Each cell is stored as a most-significant-group-first sequence of
/// bytes holding seven payload bits each; bit 7 marks continuation and
/// bit 6 of the first byte carries the sign. The expanded cells are
/// written little-endian, producing exactly `expected_len` bytes.
///
/// # Errors
///
/// [`AmxError::Format`] when the stream ends mid-sequence, a sequence
/// overflows the cell width, or the decoded size does not match.
pub fn expand(src: &[u8], expected_len: usize) -> Result<Vec<u8>, AmxError> {
    if expected_len.rem_euclid(CELL_SIZE) != 0 {
        return Err(AmxError::Format);
    }

    let mut out = Vec::with_capacity(expected_len);
    let mut iter = src.iter().copied();

    while out.len() < expected_len {
        let first = iter.next().ok_or(AmxError::Format)?;
        let mut value: Cell = if first & 0x40 == 0 { 0 } else { !0 };
        let mut byte = first;
        let mut sequence = 0;
        loop {
            sequence += 1;
            if sequence > MAX_SEQUENCE {
                return Err(AmxError::Format);
            }
            value = (value << 7) | Cell::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                break;
            }
            byte = iter.next().ok_or(AmxError::Format)?;
        }

        let mut raw = [0u8; CELL_SIZE];
        cell_to_le(value, &mut raw);
        out.extend_from_slice(&raw);
    }

    if iter.next().is_some() {
        return Err(AmxError::Format);
    }
    Ok(out)
}
