use alloc::{borrow::Cow, string::String};
use core::fmt::Display;

/// Error types used throughout the `extlink` library.
///
/// The variants mirror the failure classes of the link pass: reader I/O,
/// malformed binary structure, symbol resolution, missing architecture
/// capabilities and dependency-list exhaustion. Format and I/O errors abort
/// a load immediately; unresolved-symbol and unsupported-relocation errors
/// are accumulated across a pass so one run surfaces every bad record.
#[derive(Debug)]
pub enum Error {
    /// An error occurred while reading the extension binary.
    ///
    /// Once a read fails mid-walk, the reader position can no longer be
    /// trusted, so this error is always immediately fatal.
    Io {
        /// A descriptive message about the I/O error.
        msg: Cow<'static, str>,
    },

    /// The binary is structurally malformed.
    ///
    /// Covers invalid relocation entry sizes, out-of-range section
    /// cross-references, sections missing from every memory region and
    /// symbols with an invalid section-index classification.
    Format {
        /// A descriptive message about the format error.
        msg: Cow<'static, str>,
    },

    /// A symbol could not be resolved against any symbol table.
    Unresolved {
        /// The name of the symbol that failed to resolve.
        symbol: String,
        /// Where the reference came from (section and offset).
        msg: Cow<'static, str>,
    },

    /// The relocation type is not supported by the architecture back end,
    /// or the required capability is absent in this build.
    Unsupported {
        /// A descriptive message about the missing capability.
        msg: Cow<'static, str>,
    },

    /// The fixed-capacity dependency list is full.
    ///
    /// Reported distinctly from format errors so callers can suggest
    /// raising [`DEPENDENCY_COUNT`](crate::ext::DEPENDENCY_COUNT).
    Capacity {
        /// A descriptive message about the exhausted resource.
        msg: Cow<'static, str>,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Io { msg } => write!(f, "I/O error: {msg}"),
            Error::Format { msg } => write!(f, "Format error: {msg}"),
            Error::Unresolved { symbol, msg } => {
                write!(f, "Unresolved symbol `{symbol}`: {msg}")
            }
            Error::Unsupported { msg } => write!(f, "Unsupported: {msg}"),
            Error::Capacity { msg } => write!(f, "Resource exhausted: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

/// Creates an I/O error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn io_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Io { msg: msg.into() }
}

/// Creates a format error with the specified message.
///
/// Public so architecture back ends outside this crate can report
/// structural problems with the records they are handed.
#[cold]
#[inline(never)]
pub fn format_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Format { msg: msg.into() }
}

/// Creates an unresolved-symbol error naming the symbol and its source.
#[cold]
#[inline(never)]
pub(crate) fn unresolved_error(
    symbol: impl Into<String>,
    msg: impl Into<Cow<'static, str>>,
) -> Error {
    Error::Unresolved {
        symbol: symbol.into(),
        msg: msg.into(),
    }
}

/// Creates an unsupported-capability error with the specified message.
///
/// This is the default result of every [`ArchRelocator`](crate::arch::ArchRelocator)
/// hook, and what back ends return for relocation types they decline.
#[cold]
#[inline(never)]
pub fn unsupported_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Unsupported { msg: msg.into() }
}

/// Creates a resource-exhaustion error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn capacity_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Capacity { msg: msg.into() }
}
