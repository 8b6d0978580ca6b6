// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Module header layout and validation.
//!
//! A compiled module starts with a fixed 56-byte header stored
//! little-endian and packed to byte boundaries:
//!
//! ```text
//! offset  width  field
//!      0      4  size          total image size in bytes
//!      4      2  magic         cell-width signature
//!      6      1  file_version
//!      7      1  amx_version   minimum machine version required
//!      8      2  flags
//!     10      2  defsize       record size in the definition tables
//!     12      4  cod           code section offset
//!     16      4  dat           data section offset
//!     20      4  hea           initial heap top (file-relative)
//!     24      4  stp           stack top (file-relative)
//!     28      4  cip           entry point, -1 when there is no main
//!     32     20  publics, natives, libraries, pubvars, tags offsets
//!     52      4  nametable     shared name table offset, 0 if inline
//! ```
//!
//! The header is decoded field by field; the byte buffer is never
//! reinterpreted as a host structure.


use crate::cell::CELL_SIZE;
use crate::error::AmxError;

/// Magic number for modules compiled with 16-bit cells.
pub const AMX_MAGIC_16: u16 = 0xF1E2;
/// Magic number for modules compiled with 32-bit cells.
pub const AMX_MAGIC_32: u16 = 0xF1E0;
/// Magic number for modules compiled with 64-bit cells.
pub const AMX_MAGIC_64: u16 = 0xF1E1;

/// Magic number matching this build's cell width.
#[cfg(feature = "cell16")]
pub const AMX_MAGIC: u16 = AMX_MAGIC_16;
/// Magic number matching this build's cell width.
#[cfg(feature = "cell64")]
pub const AMX_MAGIC: u16 = AMX_MAGIC_64;
/// Magic number matching this build's cell width.
#[cfg(not(any(feature = "cell16", feature = "cell64")))]
pub const AMX_MAGIC: u16 = AMX_MAGIC_32;

/// Current module file format version.
pub const CUR_FILE_VERSION: u8 = 9;
/// Lowest file format version the machine still loads.
pub const MIN_FILE_VERSION: u8 = 6;
/// Version of this abstract machine, as negotiated by `amx_version`.
pub const MIN_AMX_VERSION: u8 = 10;
/// Highest file format version a JIT back-end supports.
pub const MAX_FILE_VER_JIT: u8 = 8;
/// Machine version a JIT back-end negotiates.
pub const MIN_AMX_VER_JIT: u8 = 8;

/// Name capacity of an inline definition record, excluding the NUL.
pub const EXP_MAX: usize = 19;
/// Longest symbol name when the module carries a name table.
pub const NAME_MAX: usize = 31;

/// Size of an inline-name definition record for this cell width.
#[must_use]
pub const fn funcstub_size() -> usize {
    CELL_SIZE + EXP_MAX + 1
}

/// Size of a name-table definition record for this cell width.
#[must_use]
pub const fn funcstubnt_size() -> usize {
    CELL_SIZE + 4
}

/// The decoded module header.
///
/// All offsets are file-relative bytes, validated to be in range and
/// cell-aligned where alignment matters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AmxHeader {
    /// Total image size in bytes.
    pub size: u32,
    /// Cell-width signature.
    pub magic: u16,
    /// File format version.
    pub file_version: u8,
    /// Minimum machine version required to run the module.
    pub amx_version: u8,
    /// Raw flag bits (see [`crate::flags::AmxFlags`]).
    pub flags: u16,
    /// Record size in the definition tables; selects the record shape.
    pub defsize: u16,
    /// Code section offset.
    pub cod: u32,
    /// Data section offset.
    pub dat: u32,
    /// Initial heap top, file-relative.
    pub hea: u32,
    /// Stack top, file-relative.
    pub stp: u32,
    /// Entry point, code-relative; -1 when the module has no `main`.
    pub cip: i32,
    /// Offset of the public functions table.
    pub publics: u32,
    /// Offset of the native functions table.
    pub natives: u32,
    /// Offset of the libraries table.
    pub libraries: u32,
    /// Offset of the public variables table.
    pub pubvars: u32,
    /// Offset of the public tagnames table.
    pub tags: u32,
    /// Offset of the shared name table, 0 when names are inline.
    pub nametable: u32,
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Check that a file offset is a table offset: zero (absent) or inside
/// the image, past the header.
fn table_offset_ok(offset: u32, size: u32) -> bool {
    offset == 0 || (offset as usize >= AmxHeader::SIZE && offset <= size)
}

impl AmxHeader {
    /// Size of the on-disk header in bytes.
    pub const SIZE: usize = 56;

    /// Decode and validate a header from the start of a module buffer.
    ///
    /// # Errors
    ///
    /// - [`AmxError::Memory`] when the buffer cannot hold the header or
    ///   the advertised image size
    /// - [`AmxError::Format`] on a bad magic, offset, or record size
    /// - [`AmxError::Version`] when the file version or the declared
    ///   machine version floor is outside the supported window
    pub fn parse(bytes: &[u8]) -> Result<Self, AmxError> {
        if bytes.len() < Self::SIZE {
            return Err(AmxError::Memory);
        }

        let header = Self {
            size: read_u32(bytes, 0),
            magic: read_u16(bytes, 4),
            file_version: bytes[6],
            amx_version: bytes[7],
            flags: read_u16(bytes, 8),
            defsize: read_u16(bytes, 10),
            cod: read_u32(bytes, 12),
            dat: read_u32(bytes, 16),
            hea: read_u32(bytes, 20),
            stp: read_u32(bytes, 24),
            cip: read_u32(bytes, 28) as i32,
            publics: read_u32(bytes, 32),
            natives: read_u32(bytes, 36),
            libraries: read_u32(bytes, 40),
            pubvars: read_u32(bytes, 44),
            tags: read_u32(bytes, 48),
            nametable: read_u32(bytes, 52),
        };
        header.validate(bytes.len())?;
        Ok(header)
    }

    /// Validate the decoded fields against the providing buffer.
    fn validate(&self, buffer_len: usize) -> Result<(), AmxError> {
        if self.magic != AMX_MAGIC {
            return Err(AmxError::Format);
        }
        if self.file_version < MIN_FILE_VERSION || self.file_version > CUR_FILE_VERSION {
            return Err(AmxError::Version);
        }
        // The module declares the minimum machine version it needs; a
        // JIT back-end would negotiate against MIN_AMX_VER_JIT instead.
        if self.amx_version < MIN_AMX_VERSION {
            return Err(AmxError::Version);
        }
        if (self.size as usize) < Self::SIZE {
            return Err(AmxError::Format);
        }
        if self.size as usize > buffer_len {
            return Err(AmxError::Memory);
        }
        if self.defsize as usize != funcstub_size() && self.defsize as usize != funcstubnt_size() {
            return Err(AmxError::Format);
        }

        // Section offsets: strictly ordered and cell-aligned. The heap
        // start may exceed the file size (the data image ends at `size`
        // and the heap beyond it starts zeroed), but never the stack top.
        let sections = [self.cod, self.dat, self.hea, self.stp];
        if sections.iter().any(|s| s.rem_euclid(CELL_SIZE as u32) != 0) {
            return Err(AmxError::Format);
        }
        if self.cod < Self::SIZE as u32
            || self.cod > self.dat
            || self.dat > self.hea
            || self.hea > self.stp
        {
            return Err(AmxError::Format);
        }
        if self.cod > self.size {
            return Err(AmxError::Format);
        }
        // A compact image stores code+data compressed, so only its
        // expanded extent may exceed the file size.
        let compact = self.flags & crate::flags::AmxFlags::COMPACT.bits() != 0;
        if !compact && self.dat > self.size {
            return Err(AmxError::Format);
        }

        let tables = [
            self.publics,
            self.natives,
            self.libraries,
            self.pubvars,
            self.tags,
        ];
        if tables.iter().any(|&t| !table_offset_ok(t, self.size)) {
            return Err(AmxError::Format);
        }
        // Only the name-table record shape gives the field meaning.
        if self.uses_nametable() && !table_offset_ok(self.nametable, self.size) {
            return Err(AmxError::Format);
        }

        // The entry point, when present, must land inside the code section.
        if self.cip != -1 {
            let code_size = (self.dat - self.cod) as i64;
            let cip = i64::from(self.cip);
            if cip < 0 || cip >= code_size || cip.rem_euclid(CELL_SIZE as i64) != 0 {
                return Err(AmxError::Format);
            }
        }

        Ok(())
    }

    /// Whether definition records reference the shared name table.
    #[inline]
    #[must_use]
    pub fn uses_nametable(&self) -> bool {
        self.defsize as usize == funcstubnt_size()
    }

    /// Longest symbol name the module can express, excluding the NUL.
    #[inline]
    #[must_use]
    pub fn name_length(&self) -> usize {
        if self.uses_nametable() {
            NAME_MAX
        } else {
            EXP_MAX
        }
    }

    /// Number of records between two table offsets.
    fn entries_between(&self, table: u32, next: u32) -> usize {
        if table == 0 || next < table {
            return 0;
        }
        (next - table) as usize / self.defsize as usize
    }

    /// Number of public function records.
    #[must_use]
    pub fn num_publics(&self) -> usize {
        self.entries_between(self.publics, self.natives)
    }

    /// Number of native function records.
    #[must_use]
    pub fn num_natives(&self) -> usize {
        self.entries_between(self.natives, self.libraries)
    }

    /// Number of library records.
    #[must_use]
    pub fn num_libraries(&self) -> usize {
        self.entries_between(self.libraries, self.pubvars)
    }

    /// Number of public variable records.
    #[must_use]
    pub fn num_pubvars(&self) -> usize {
        self.entries_between(self.pubvars, self.tags)
    }

    /// Number of tagname records.
    #[must_use]
    pub fn num_tags(&self) -> usize {
        // The tag table runs to the name table when there is one,
        // otherwise to the code section.
        let next = if self.uses_nametable() && self.nametable != 0 {
            self.nametable
        } else {
            self.cod
        };
        self.entries_between(self.tags, next)
    }
}
