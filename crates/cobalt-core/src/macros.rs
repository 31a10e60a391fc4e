//! Helper macros for PDU encoding and decoding
//!
//! Exported and available to the other crates of the workspace.

/// Asserts that the traits support dynamic dispatch.
///
/// From <https://docs.rs/static_assertions/1.1.0/src/static_assertions/assert_obj_safe.rs.html#72-76>
#[macro_export]
macro_rules! assert_obj_safe {
    ($($xs:path),+ $(,)?) => {
        $(const _: Option<&dyn $xs> = None;)+
    };
}

/// Asserts that the type implements _all_ of the given traits.
///
/// From <https://docs.rs/static_assertions/1.1.0/src/static_assertions/assert_impl.rs.html#113-121>
#[macro_export]
macro_rules! assert_impl {
    ($type:ty: $($trait:path),+ $(,)?) => {
        const _: fn() = || {
            fn assert_impl_all<T: ?Sized $(+ $trait)+>() {}
            assert_impl_all::<$type>();
        };
    };
}

#[macro_export]
macro_rules! ensure_size {
    (ctx: $ctx:expr, in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if !(received >= expected) {
            return Err($crate::NotEnoughBytesErr::not_enough_bytes($ctx, received, expected));
        }
    }};
    (in: $buf:ident, size: $expected:expr) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: $expected)
    }};
}

#[macro_export]
macro_rules! ensure_fixed_part_size {
    (in: $buf:ident) => {{
        $crate::ensure_size!(ctx: Self::NAME, in: $buf, size: Self::FIXED_PART_SIZE)
    }};
}

#[macro_export]
macro_rules! cast_length {
    ($ctx:expr, $field:expr, $len:expr) => {{
        $len.try_into()
            .map_err(|_| $crate::InvalidFieldErr::invalid_field($ctx, $field, "too many elements"))
    }};
    ($field:expr, $len:expr) => {{
        $crate::cast_length!(Self::NAME, $field, $len)
    }};
}

/// Creates a `NotEnoughBytes` error.
#[macro_export]
macro_rules! not_enough_bytes_err {
    ( $context:expr, $received:expr, $expected:expr $(,)? ) => {{
        $crate::NotEnoughBytesErr::not_enough_bytes($context, $received, $expected)
    }};
    ( $received:expr, $expected:expr $(,)? ) => {{
        $crate::not_enough_bytes_err!(Self::NAME, $received, $expected)
    }};
}

/// Creates an `InvalidField` error.
#[macro_export]
macro_rules! invalid_field_err {
    ( $context:expr, $field:expr, $reason:expr $(,)? ) => {{
        $crate::InvalidFieldErr::invalid_field($context, $field, $reason)
    }};
    ( $field:expr, $reason:expr $(,)? ) => {{
        $crate::invalid_field_err!(Self::NAME, $field, $reason)
    }};
}

/// Creates an `UnexpectedMessageType` error.
#[macro_export]
macro_rules! unexpected_message_type_err {
    ( $context:expr, $got:expr $(,)? ) => {{
        $crate::UnexpectedMessageTypeErr::unexpected_message_type($context, $got)
    }};
    ( $got:expr $(,)? ) => {{
        $crate::unexpected_message_type_err!(Self::NAME, $got)
    }};
}

/// Creates an `UnsupportedVersion` error.
#[macro_export]
macro_rules! unsupported_version_err {
    ( $context:expr, $got:expr $(,)? ) => {{
        $crate::UnsupportedVersionErr::unsupported_version($context, $got)
    }};
    ( $got:expr $(,)? ) => {{
        $crate::unsupported_version_err!(Self::NAME, $got)
    }};
}

/// Creates an `UnsupportedValue` error.
#[macro_export]
macro_rules! unsupported_value_err {
    ( $context:expr, $name:expr, $value:expr $(,)? ) => {{
        $crate::UnsupportedValueErr::unsupported_value($context, $name, $value)
    }};
    ( $name:expr, $value:expr $(,)? ) => {{
        $crate::unsupported_value_err!(Self::NAME, $name, $value)
    }};
}

/// Creates an `Other` error.
#[macro_export]
macro_rules! other_err {
    ( $context:expr, source: $source:expr $(,)? ) => {{
        $crate::other_err_with_source($context, "", $source)
    }};
    ( $context:expr, $description:expr $(,)? ) => {{
        $crate::OtherErr::other($context, $description)
    }};
    ( $description:expr $(,)? ) => {{
        $crate::other_err!(Self::NAME, $description)
    }};
}

#[macro_export]
macro_rules! read_padding {
    ($src:expr, $n:expr) => {{
        $src.advance($n);
    }};
}

#[macro_export]
macro_rules! write_padding {
    ($dst:expr, $n:expr) => {{
        for _ in 0..$n {
            $dst.write_u8(0);
        }
    }};
}
