//! Unrecoverable corruption reporting.
//!
//! Corrupted allocator metadata cannot be repaired, so these macros log the
//! failed condition at `error` level and then panic. On the target the panic
//! handler parks the hart for good.

/// Log at `error` level, then panic with the same message.
macro_rules! fatal {
    ($($arg:tt)+) => {{
        ::log::error!($($arg)+);
        panic!($($arg)+)
    }};
}

/// `fatal!` with a `failed asserting that <cond>: <message>` report unless
/// `cond` holds.
macro_rules! fatal_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::fatal::fatal!(
                "failed asserting that {}: {}",
                stringify!($cond),
                format_args!($($arg)+)
            );
        }
    };
}

pub(crate) use {fatal, fatal_assert};
