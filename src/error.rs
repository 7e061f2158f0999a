//! Error types used throughout `bionic_loader`.
use std::borrow::Cow;
use std::fmt::{Debug, Display};

/// Error conditions that can arise while locating, mapping, parsing, or
/// relocating a guest ELF image, or while servicing a public API call.
#[derive(Debug)]
pub enum Error {
 /// I/O failure while searching for or reading a guest library.
 Io { msg: Cow<'static, str> },

 /// `mmap`/`mprotect`/`munmap` failed.
 Mmap { msg: Cow<'static, str> },

 /// The ELF header failed validation (magic, class, machine, type).
 ParseEhdr { msg: Cow<'static, str> },

 /// A program header was malformed or no PT_LOAD segment was present.
 ParsePhdr { msg: Cow<'static, str> },

 /// The `.dynamic` section was malformed or missing a required tag.
 ParseDynamic { msg: Cow<'static, str> },

 /// A relocation entry referenced an unresolved non-weak symbol, or its
 /// computed value did not fit the target field.
 Relocation { msg: Cow<'static, str> },

 /// The `cfg.d` override configuration was malformed.
 Config { msg: Cow<'static, str> },

 /// DL_ERR_CANNOT_LOAD_LIBRARY.
 CannotLoad { msg: Cow<'static, str> },

 /// DL_ERR_INVALID_LIBRARY_HANDLE.
 InvalidHandle,

 /// DL_ERR_BAD_SYMBOL_NAME.
 BadSymbolName,

 /// DL_ERR_SYMBOL_NOT_FOUND.
 SymbolNotFound { name: Cow<'static, str> },

 /// DL_ERR_SYMBOL_NOT_GLOBAL.
 SymbolNotGlobal { name: Cow<'static, str> },
}

impl Display for Error {
 fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
 match self {
 Error::Io { msg } => write!(f, "I/O error: {msg}"),
 Error::Mmap { msg } => write!(f, "memory mapping error: {msg}"),
 Error::ParseEhdr { msg } => write!(f, "ELF header error: {msg}"),
 Error::ParsePhdr { msg } => write!(f, "program header error: {msg}"),
 Error::ParseDynamic { msg } => write!(f, "dynamic section error: {msg}"),
 Error::Relocation { msg } => write!(f, "relocation error: {msg}"),
 Error::Config { msg } => write!(f, "configuration error: {msg}"),
 Error::CannotLoad { msg } => write!(f, "cannot load library: {msg}"),
 Error::InvalidHandle => write!(f, "invalid library handle"),
 Error::BadSymbolName => write!(f, "invalid symbol name"),
 Error::SymbolNotFound { name } => write!(f, "symbol not found: {name}"),
 Error::SymbolNotGlobal { name } => write!(f, "symbol is not global: {name}"),
 }
 }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[cold]
#[inline(never)]
pub(crate) fn io_error(msg: impl Into<Cow<'static, str>>) -> Error {
 Error::Io { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn mmap_error(msg: impl Into<Cow<'static, str>>) -> Error {
 Error::Mmap { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_ehdr_error(msg: impl Into<Cow<'static, str>>) -> Error {
 Error::ParseEhdr { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_phdr_error(msg: impl Into<Cow<'static, str>>) -> Error {
 Error::ParsePhdr { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn parse_dynamic_error(msg: impl Into<Cow<'static, str>>) -> Error {
 Error::ParseDynamic { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn relocate_error(msg: impl Into<Cow<'static, str>>) -> Error {
 Error::Relocation { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn config_error(msg: impl Into<Cow<'static, str>>) -> Error {
 Error::Config { msg: msg.into() }
}

#[cold]
#[inline(never)]
pub(crate) fn cannot_load(msg: impl Into<Cow<'static, str>>) -> Error {
 Error::CannotLoad { msg: msg.into() }
}
