// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Host-attached user data.
//!
//! A small fixed set of slots keyed by a 32-bit tag, treated as an
//! association list. Tag zero marks a free slot. The machine never
//! dereferences the stored pointers.

use pawn_abi::AmxError;

use super::{Amx, USER_NUM, UserData};

impl Amx {
    /// Attach an opaque host pointer under a tag.
    ///
    /// An existing slot with the same tag is overwritten.
    ///
    /// # Errors
    ///
    /// [`AmxError::Params`] for tag zero, [`AmxError::UserData`] when
    /// all slots are taken by other tags.
    pub fn set_user_data(&mut self, tag: u32, data: UserData) -> Result<(), AmxError> {
        if tag == 0 {
            return Err(AmxError::Params);
        }
        let slot = self
            .usertags
            .iter()
            .position(|&t| t == tag)
            .or_else(|| self.usertags.iter().position(|&t| t == 0))
            .ok_or(AmxError::UserData)?;
        self.usertags[slot] = tag;
        self.userdata[slot] = data;
        Ok(())
    }

    /// Fetch the pointer stored under a tag.
    ///
    /// # Errors
    ///
    /// [`AmxError::UserData`] when no slot holds the tag.
    pub fn get_user_data(&self, tag: u32) -> Result<UserData, AmxError> {
        if tag == 0 {
            return Err(AmxError::Params);
        }
        self.usertags
            .iter()
            .position(|&t| t == tag)
            .map(|slot| self.userdata[slot])
            .ok_or(AmxError::UserData)
    }

    /// Number of user-data slots.
    #[must_use]
    pub const fn user_data_slots(&self) -> usize {
        USER_NUM
    }
}
