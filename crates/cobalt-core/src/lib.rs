//! Common traits and types shared by every layer of the protocol stack:
//! byte cursors, the `Decode`/`Encode` traits and their error types, and the
//! helper macros used by the PDU codecs.

#[macro_use]
mod macros;

mod cursor;
mod decode;
mod encode;
mod write_buf;

pub use self::cursor::{NotEnoughBytesError, ReadCursor, WriteCursor};
pub use self::decode::{
    decode, decode_cursor, decode_owned, decode_owned_cursor, Decode, DecodeError, DecodeErrorKind, DecodeOwned,
    DecodeResult,
};
pub use self::encode::{
    encode, encode_buf, encode_cursor, encode_vec, name, size, Encode, EncodeError, EncodeErrorKind, EncodeResult,
};
pub use self::write_buf::WriteBuf;

/// Constructor trait for "not enough bytes" errors.
pub trait NotEnoughBytesErr {
    fn not_enough_bytes(context: &'static str, received: usize, expected: usize) -> Self;
}

/// Constructor trait for "invalid field" errors.
pub trait InvalidFieldErr {
    fn invalid_field(context: &'static str, field: &'static str, reason: &'static str) -> Self;
}

/// Constructor trait for "unexpected message type" errors.
pub trait UnexpectedMessageTypeErr {
    fn unexpected_message_type(context: &'static str, got: u8) -> Self;
}

/// Constructor trait for "unsupported version" errors.
pub trait UnsupportedVersionErr {
    fn unsupported_version(context: &'static str, got: u8) -> Self;
}

/// Constructor trait for "unsupported value" errors.
pub trait UnsupportedValueErr {
    fn unsupported_value(context: &'static str, name: &'static str, value: String) -> Self;
}

/// Constructor trait for catch-all errors.
pub trait OtherErr {
    fn other(context: &'static str, description: &'static str) -> Self;
}

/// Trait for error types that can carry a boxed source error.
pub trait WithSource {
    #[must_use]
    fn with_source(self, source: impl cobalt_error::Source) -> Self;
}

/// Creates an `InvalidField` error with a source attached.
pub fn invalid_field_err_with_source<E, S>(
    context: &'static str,
    field: &'static str,
    reason: &'static str,
    source: S,
) -> E
where
    E: InvalidFieldErr + WithSource,
    S: cobalt_error::Source,
{
    E::invalid_field(context, field, reason).with_source(source)
}

/// Creates an `Other` error with a source attached.
pub fn other_err_with_source<E, S>(context: &'static str, description: &'static str, source: S) -> E
where
    E: OtherErr + WithSource,
    S: cobalt_error::Source,
{
    E::other(context, description).with_source(source)
}

/// Trait used to produce an owned version of a borrowing PDU.
pub trait IntoOwned: Sized {
    type Owned: 'static;

    fn into_owned(self) -> Self::Owned;
}
