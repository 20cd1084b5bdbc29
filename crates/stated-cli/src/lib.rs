//! Stated CLI library.
//!
//! This crate provides the command-line interface and interactive REPL
//! for Stated.

pub mod cli;
pub mod commands;
pub mod repl;
