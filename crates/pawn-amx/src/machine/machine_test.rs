// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for instance state and host memory access.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use pawn_abi::cell::CELL_SIZE;
use pawn_abi::{AmxError, Cell};

use crate::machine::Amx;
use crate::testimg::{ImageBuilder, empty_module};

#[test]
fn new_instance_is_uninit() {
    let amx = Amx::new();
    assert!(!amx.is_initialized());
    assert!(amx.error().is_none());
    assert_eq!(amx.mem_info(), Err(AmxError::Init));
    assert_eq!(amx.name_length(), Err(AmxError::Init));
}

#[test]
fn raise_error_is_sticky() {
    let mut amx = Amx::load(&empty_module()).unwrap();
    amx.raise_error(AmxError::Native);
    assert_eq!(amx.error(), Some(AmxError::Native));

    // A fresh exec clears it.
    amx.exec(pawn_abi::EXEC_MAIN).unwrap();
    assert!(amx.error().is_none());
}

#[test]
fn cell_access_respects_the_free_gap() {
    let mut img = ImageBuilder::new();
    let var = img.data_cell(5);
    let mut amx = Amx::load(&img.build()).unwrap();

    assert_eq!(amx.get_cell(var).unwrap(), 5);
    amx.set_cell(var, 9).unwrap();
    assert_eq!(amx.get_cell(var).unwrap(), 9);

    // The gap between heap and stack is off limits.
    let gap = amx.hea;
    assert_eq!(amx.get_cell(gap), Err(AmxError::MemAccess));
    assert_eq!(amx.set_cell(gap, 1), Err(AmxError::MemAccess));

    // Negative and out-of-range addresses as well.
    assert_eq!(amx.get_cell(-1), Err(AmxError::MemAccess));
    assert_eq!(amx.get_cell(amx.stp), Err(AmxError::MemAccess));
}

#[test]
fn get_addr_validates_cell_addresses() {
    let mut img = ImageBuilder::new();
    let var = img.data_cell(5);
    let mut amx = Amx::load(&img.build()).unwrap();

    // A global resolves to its byte offset in the data region.
    assert_eq!(amx.get_addr(var).unwrap(), var as usize);
    // So does a freshly allotted heap cell.
    let heap_cell = amx.allot(1).unwrap();
    assert_eq!(amx.get_addr(heap_cell).unwrap(), heap_cell as usize);

    // The free gap between heap and stack is rejected.
    assert_eq!(amx.get_addr(amx.hea), Err(AmxError::MemAccess));

    // Outside [0, stp) is rejected on both ends.
    assert_eq!(amx.get_addr(-1), Err(AmxError::MemAccess));
    assert_eq!(amx.get_addr(amx.stp), Err(AmxError::MemAccess));
    assert_eq!(amx.get_addr(Cell::MAX), Err(AmxError::MemAccess));
}

#[test]
fn allotted_cells_are_host_accessible() {
    let mut amx = Amx::load(&empty_module()).unwrap();
    let addr = amx.allot(2).unwrap();

    amx.set_cells(addr, &[3, 4]).unwrap();
    assert_eq!(amx.get_cells(addr, 2).unwrap(), [3, 4]);
}

#[test]
fn mem_info_reports_section_sizes() {
    let mut img = ImageBuilder::new();
    img.data_cell(0);
    img.stack_heap(64 * CELL_SIZE);
    let amx = Amx::load(&img.build()).unwrap();

    let (code, data, stack_heap) = amx.mem_info().unwrap();
    assert!(code > 0);
    assert_eq!(data, CELL_SIZE);
    assert_eq!(stack_heap, 64 * CELL_SIZE);
}

#[test]
fn initial_registers_satisfy_the_region_invariant() {
    let amx = Amx::load(&empty_module()).unwrap();
    assert!(amx.hlw <= amx.hea);
    assert!(amx.hea <= amx.stk);
    assert!(amx.stk <= amx.stp);
    assert_eq!(amx.hea.rem_euclid(CELL_SIZE as Cell), 0);
    assert_eq!(amx.stk.rem_euclid(CELL_SIZE as Cell), 0);
    assert_eq!(amx.stk, amx.reset_stk);
    assert_eq!(amx.hea, amx.reset_hea);
}
