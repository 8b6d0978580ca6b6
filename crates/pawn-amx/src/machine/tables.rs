// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Definition-table lookups: publics, natives, public variables, tags.
//!
//! Each table is a run of fixed-size records between two header offsets.
//! A record is either inline (address cell followed by a bounded
//! NUL-terminated name) or name-table (address cell followed by a
//! 32-bit offset into the shared name table). Lookups are linear scans
//! with case-sensitive, byte-for-byte comparison.

use alloc::string::{String, ToString};

use pawn_abi::cell::{CELL_SIZE, cell_from_le};
use pawn_abi::header::EXP_MAX;
use pawn_abi::{AmxError, AmxHeader, Cell};

use super::{Amx, SharedImage};

/// The five definition tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Table {
    Publics,
    Natives,
    Pubvars,
    Tags,
}

impl Table {
    fn offset(self, header: &AmxHeader) -> u32 {
        match self {
            Self::Publics => header.publics,
            Self::Natives => header.natives,
            Self::Pubvars => header.pubvars,
            Self::Tags => header.tags,
        }
    }

    fn len(self, header: &AmxHeader) -> usize {
        match self {
            Self::Publics => header.num_publics(),
            Self::Natives => header.num_natives(),
            Self::Pubvars => header.num_pubvars(),
            Self::Tags => header.num_tags(),
        }
    }
}

/// Read the address cell and name bytes of one record.
fn entry(image: &SharedImage, table: Table, index: usize) -> Option<(Cell, &[u8])> {
    let header = &image.header;
    let table_offset = table.offset(header);
    if table_offset == 0 || index >= table.len(header) {
        return None;
    }

    let record = table_offset as usize + index * header.defsize as usize;
    let address = cell_from_le(image.prefix.get(record..record + CELL_SIZE)?);

    let name_field = record + CELL_SIZE;
    let name = if header.uses_nametable() {
        let raw = image.prefix.get(name_field..name_field + 4)?;
        let name_offset =
            u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        terminated(image.prefix.get(name_offset..)?)
    } else {
        terminated(image.prefix.get(name_field..name_field + EXP_MAX + 1)?)
    };

    Some((address, name))
}

/// The bytes of a NUL-terminated name, without the terminator.
fn terminated(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

fn entry_name(name: &[u8]) -> Result<String, AmxError> {
    core::str::from_utf8(name)
        .map(ToString::to_string)
        .map_err(|_| AmxError::Format)
}

impl Amx {
    fn scan(&self, table: Table, name: &str) -> Result<(usize, Cell), AmxError> {
        let image = self.shared()?;
        let count = table.len(&image.header);
        for index in 0..count {
            if let Some((address, entry_name)) = entry(image, table, index)
                && entry_name == name.as_bytes()
            {
                return Ok((index, address));
            }
        }
        Err(AmxError::NotFound)
    }

    fn lookup(&self, table: Table, index: usize) -> Result<(Cell, String), AmxError> {
        let image = self.shared()?;
        let (address, name) = entry(image, table, index).ok_or(AmxError::Index)?;
        Ok((address, entry_name(name)?))
    }

    /// Number of public functions.
    #[must_use]
    pub fn num_publics(&self) -> usize {
        self.header().map_or(0, AmxHeader::num_publics)
    }

    /// Number of native functions the module imports.
    #[must_use]
    pub fn num_natives(&self) -> usize {
        self.header().map_or(0, AmxHeader::num_natives)
    }

    /// Number of public variables.
    #[must_use]
    pub fn num_pubvars(&self) -> usize {
        self.header().map_or(0, AmxHeader::num_pubvars)
    }

    /// Number of tagnames.
    #[must_use]
    pub fn num_tags(&self) -> usize {
        self.header().map_or(0, AmxHeader::num_tags)
    }

    /// Find a public function by name.
    ///
    /// # Errors
    ///
    /// [`AmxError::NotFound`] when no public has that name,
    /// [`AmxError::Init`] when no module is loaded.
    pub fn find_public(&self, name: &str) -> Result<usize, AmxError> {
        Ok(self.scan(Table::Publics, name)?.0)
    }

    /// The name of a public function by index.
    ///
    /// # Errors
    ///
    /// [`AmxError::Index`] on an out-of-range index.
    pub fn get_public(&self, index: usize) -> Result<String, AmxError> {
        Ok(self.lookup(Table::Publics, index)?.1)
    }

    /// Find a native function by name.
    ///
    /// # Errors
    ///
    /// [`AmxError::NotFound`] when the module does not import that name.
    pub fn find_native(&self, name: &str) -> Result<usize, AmxError> {
        Ok(self.scan(Table::Natives, name)?.0)
    }

    /// The name of an imported native by index.
    ///
    /// # Errors
    ///
    /// [`AmxError::Index`] on an out-of-range index.
    pub fn get_native(&self, index: usize) -> Result<String, AmxError> {
        Ok(self.lookup(Table::Natives, index)?.1)
    }

    /// Find a public variable by name, returning its address.
    ///
    /// # Errors
    ///
    /// [`AmxError::NotFound`] when no public variable has that name.
    pub fn find_pubvar(&self, name: &str) -> Result<Cell, AmxError> {
        Ok(self.scan(Table::Pubvars, name)?.1)
    }

    /// The name and address of a public variable by index.
    ///
    /// # Errors
    ///
    /// [`AmxError::Index`] on an out-of-range index.
    pub fn get_pubvar(&self, index: usize) -> Result<(String, Cell), AmxError> {
        let (address, name) = self.lookup(Table::Pubvars, index)?;
        Ok((name, address))
    }

    /// Find a tagname by its tag value.
    ///
    /// # Errors
    ///
    /// [`AmxError::NotFound`] when the module defines no such tag.
    pub fn find_tag_id(&self, tag_id: Cell) -> Result<String, AmxError> {
        let image = self.shared()?;
        let count = Table::Tags.len(&image.header);
        for index in 0..count {
            if let Some((address, name)) = entry(image, Table::Tags, index)
                && address == tag_id
            {
                return entry_name(name);
            }
        }
        Err(AmxError::NotFound)
    }

    /// The name and value of a tag by index.
    ///
    /// # Errors
    ///
    /// [`AmxError::Index`] on an out-of-range index.
    pub fn get_tag(&self, index: usize) -> Result<(String, Cell), AmxError> {
        let (tag_id, name) = self.lookup(Table::Tags, index)?;
        Ok((name, tag_id))
    }

    /// Code-relative entry address of a public function.
    pub(crate) fn public_address(&self, index: usize) -> Result<Cell, AmxError> {
        let image = self.shared()?;
        let (address, _) = entry(image, Table::Publics, index).ok_or(AmxError::Index)?;
        Ok(address)
    }
}
