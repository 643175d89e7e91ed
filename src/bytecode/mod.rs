/*
 * Copyright (c) 2026-present, the Ladybird developers.
 *
 * SPDX-License-Identifier: BSD-2-Clause
 */

pub mod class;
pub mod codegen;
pub mod debug;
pub mod expression;
pub mod generator;
pub mod instruction;
pub mod literal;
pub mod operand;
