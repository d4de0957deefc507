use thiserror::Error;

/// Result alias used by every fallible operation in this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Text does not match any recognized notation, or matches one but
    /// violates its length/charset constraint.
    #[error("invalid {kind} format: {text:?}")]
    InvalidFormat { kind: &'static str, text: String },

    /// Two operands of different IP versions were combined.
    #[error("IP version mismatch")]
    VersionMismatch,

    /// Netmask bits are not a contiguous ones-then-zeros pattern.
    #[error("invalid netmask address format")]
    InvalidNetmask,

    /// Prefix length outside the valid window for the operation.
    #[error("invalid prefix length: {0}")]
    InvalidPrefixLength(u32),

    /// A range endpoint update would invert `first <= last`.
    #[error("{0}")]
    Order(&'static str),

    /// The excluded subnet does not overlap the target network at all.
    #[error("excluded subnet is not within the target network")]
    OutOfRange,

    /// Stepping past the top or bottom of the address space.
    #[error("address space overflow")]
    Overflow,
}

impl Error {
    pub(crate) fn invalid_format(kind: &'static str, text: &str) -> Self {
        Error::InvalidFormat {
            kind,
            text: text.to_string(),
        }
    }
}
