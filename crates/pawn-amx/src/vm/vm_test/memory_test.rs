// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Data access, bounds of the data region, block operations.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{assert_balanced, run_main};
use crate::bytecode::Opcode;
use crate::machine::Amx;
use crate::testimg::ImageBuilder;
use pawn_abi::cell::CELL_SIZE;
use pawn_abi::{AmxError, Cell, EXEC_MAIN};

const CELL: Cell = CELL_SIZE as Cell;

#[test]
fn load_and_store_globals() {
    let mut img = ImageBuilder::new();
    let a = img.data_cell(5);
    let b = img.data_cell(0);
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::LoadPri, &[a]);
    img.emit(Opcode::AddC, &[1]);
    img.emit(Opcode::StorPri, &[b]);
    img.emit(Opcode::LoadPri, &[b]);
    img.emit(Opcode::Retn, &[]);

    let mut amx = Amx::load(&img.build()).unwrap();
    assert_eq!(amx.exec(EXEC_MAIN).unwrap(), 6);
}

#[test]
fn indirect_access_through_pri() {
    let mut img = ImageBuilder::new();
    let a = img.data_cell(123);
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::ConstPri, &[a]);
    img.emit(Opcode::LoadI, &[]);
    img.emit(Opcode::Retn, &[]);

    let mut amx = Amx::load(&img.build()).unwrap();
    assert_eq!(amx.exec(EXEC_MAIN).unwrap(), 123);
}

#[test]
fn indirect_access_into_free_gap_faults() {
    // The free gap between heap and stack is never addressable.
    let (amx, result) = run_main(|img| {
        img.emit(Opcode::Lctrl, &[2]); // pri = hea
        img.emit(Opcode::LoadI, &[]);
    });
    assert_eq!(result, Err(AmxError::MemAccess));
    assert_balanced(&amx);
}

#[test]
fn direct_load_past_data_region_faults() {
    let (amx, result) = run_main(|img| {
        img.emit(Opcode::ConstPri, &[Cell::MAX - CELL]);
        img.emit(Opcode::LoadI, &[]);
    });
    assert_eq!(result, Err(AmxError::MemAccess));
    assert_balanced(&amx);
}

#[test]
fn array_indexing_with_bounds_check() {
    let mut img = ImageBuilder::new();
    let base = img.data_cell(10);
    img.data_cell(20);
    img.data_cell(30);
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::ConstPri, &[2]);
    img.emit(Opcode::Bounds, &[2]);
    img.emit(Opcode::ConstAlt, &[base]);
    img.emit(Opcode::Lidx, &[]);
    img.emit(Opcode::Retn, &[]);

    let mut amx = Amx::load(&img.build()).unwrap();
    assert_eq!(amx.exec(EXEC_MAIN).unwrap(), 30);
}

#[test]
fn partial_cell_store_and_load() {
    let mut img = ImageBuilder::new();
    let a = img.data_cell(-1);
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    // Store one byte, then read it back zero-extended.
    img.emit(Opcode::ConstAlt, &[a]);
    img.emit(Opcode::ConstPri, &[0xAB]);
    img.emit(Opcode::StrbI, &[1]);
    img.emit(Opcode::ConstPri, &[a]);
    img.emit(Opcode::LodbI, &[1]);
    img.emit(Opcode::Retn, &[]);

    let mut amx = Amx::load(&img.build()).unwrap();
    assert_eq!(amx.exec(EXEC_MAIN).unwrap(), 0xAB);

    // The other bytes of the cell were left alone.
    let cell = amx.get_cell(a).unwrap();
    assert_eq!(cell & 0xFF, 0xAB);
    assert_ne!(cell, 0xAB);
}

#[test]
fn fill_writes_whole_cells() {
    let mut img = ImageBuilder::new();
    let base = img.data_cell(0);
    img.data_cell(0);
    img.data_cell(99);
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::ConstAlt, &[base]);
    img.emit(Opcode::ConstPri, &[7]);
    img.emit(Opcode::Fill, &[2 * CELL]);
    img.emit(Opcode::Retn, &[]);

    let mut amx = Amx::load(&img.build()).unwrap();
    amx.exec(EXEC_MAIN).unwrap();
    assert_eq!(amx.get_cell(base).unwrap(), 7);
    assert_eq!(amx.get_cell(base + CELL).unwrap(), 7);
    assert_eq!(amx.get_cell(base + 2 * CELL).unwrap(), 99);
}

#[test]
fn movs_copies_and_cmps_compares() {
    let mut img = ImageBuilder::new();
    let src = img.data_cell(0x11);
    let dst = img.data_cell(0);
    img.main_here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::ConstPri, &[src]);
    img.emit(Opcode::ConstAlt, &[dst]);
    img.emit(Opcode::Movs, &[CELL]);
    img.emit(Opcode::Cmps, &[CELL]);
    img.emit(Opcode::Retn, &[]);

    let mut amx = Amx::load(&img.build()).unwrap();
    // After the copy the blocks compare equal.
    assert_eq!(amx.exec(EXEC_MAIN).unwrap(), 0);
    assert_eq!(amx.get_cell(dst).unwrap(), 0x11);
}

#[test]
fn stack_overflow_is_stack_error() {
    // An unbounded recursion crosses the margin above the heap.
    let mut img = ImageBuilder::new();
    img.main_here();
    let entry = img.here();
    img.emit(Opcode::Proc, &[]);
    img.emit(Opcode::PushC, &[0]);
    img.emit(Opcode::Call, &[entry]);
    img.emit(Opcode::Retn, &[]);

    let mut amx = Amx::load(&img.build()).unwrap();
    assert_eq!(amx.exec(EXEC_MAIN), Err(AmxError::StackErr));
    assert_balanced(&amx);
}

#[test]
fn heap_op_collision_is_stack_error() {
    // Growing the heap into the margin below the stack faults.
    let (amx, result) = run_main(|img| {
        img.emit(Opcode::Heap, &[1024 * CELL]);
    });
    assert_eq!(result, Err(AmxError::StackErr));
    assert_balanced(&amx);
}

#[test]
fn heap_underflow_is_heap_low() {
    let (_, result) = run_main(|img| {
        img.emit(Opcode::Heap, &[-CELL]);
    });
    assert_eq!(result, Err(AmxError::HeapLow));
}
