//! Subcommands of the `scroller` binary.

pub mod inspect;
pub mod train;
