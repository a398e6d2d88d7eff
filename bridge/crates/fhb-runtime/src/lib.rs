//! FHB Runtime Library
//!
//! C ABI over the [`fhb`] bridge for hosts written in C:
//! - runtime initialisation from host and foreign-library function tables
//! - handle construction (`fhb_wrap*`)
//! - collector callbacks (`fhb_finalize`, `fhb_mark`, `fhb_after_collection`)

mod abi;
pub mod vtable;

pub use abi::*;
pub use vtable::*;
