// SPDX-License-Identifier: MIT OR Apache-2.0

pub mod config;
pub mod error;
pub mod event;
pub mod processor;
pub mod state;
pub mod store;
pub mod symbol;
pub mod time;
pub mod tree;
