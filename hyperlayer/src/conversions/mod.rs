//! Field-by-field conversions between host structures and their Linux
//! on-wire counterparts.
//!
//! Every conversion here is pure data reshaping; none of it touches guest
//! memory directly; syscall handlers are responsible for the
//! copy_to_user/copy_from_user step around these functions.

pub mod errno;
pub mod flags;
pub mod signal;
pub mod stat;
pub mod statfs;
pub mod termios;
pub mod winsize;
