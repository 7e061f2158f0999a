//! In-process secondary dynamic loader: loads bionic-ABI guest shared
//! objects into a host process with a different ABI, resolving symbols
//! through host-provided translation shims and performing the
//! per-architecture relocations (ARM, AArch64, i386, x86_64) the guest
//! needs, while keeping a debugger-visible module list alongside the
//! host loader's own.
//!
//! The public surface is deliberately narrow: [`Context`] holds all
//! process-wide state, and the `api` module's `open`/`close`/`lookup`/
//! `addr_info`/`error` functions are the only entry points a caller
//! needs for ordinary `dlopen`-style use. Everything else here exists to
//! support those four calls.

#[cfg(not(any(
    target_arch = "x86_64",
    target_arch = "x86",
    target_arch = "arm",
    target_arch = "aarch64",
)))]
compile_error!("unsupported arch");

mod arch;
mod config;
mod context;
mod debug;
mod dynamic;
mod ehdr;
mod error;
mod hash;
mod lifecycle;
mod mmap;
mod module;
mod object;
mod path;
mod relocation;
mod segment;
mod shim;
#[cfg(feature = "runtime-stub")]
mod stub;
mod symbol;
mod wrappers;

pub mod api;

pub use context::{Context, ENV_DIE_AT_RUNTIME, ENV_HOST_DATA_DIRS, ENV_LD_LIBRARY_PATH, LoaderConfig};
pub use debug::RDebug;
pub use error::{Error, Result};
pub use mmap::{LibcMmap, Mmap};
pub use object::{ElfBinary, ElfFile, ElfObject};
pub use shim::{DlsymShims, HostShims};
