//! Feature-gated tracing macros for zero-overhead instrumentation.
//!
//! When the `tracing` feature is enabled, this module re-exports the
//! tracing crate's macros. When disabled, all macros compile to no-ops
//! with zero overhead.

#[cfg(feature = "tracing")]
pub use tracing::{debug, debug_span, info, info_span, trace, trace_span, warn};

#[cfg(not(feature = "tracing"))]
#[allow(dead_code)]
mod noop {
    /// No-op span that does nothing
    pub struct Span;

    impl Span {
        pub fn entered(self) -> SpanGuard {
            SpanGuard
        }
    }

    /// No-op guard that implements Drop
    pub struct SpanGuard;

    impl Drop for SpanGuard {
        fn drop(&mut self) {}
    }

    #[macro_export]
    macro_rules! trace {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! debug {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! info {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! warn_ {
        ($($tt:tt)*) => {};
    }

    #[macro_export]
    macro_rules! trace_span {
        ($($tt:tt)*) => {
            $crate::trace::Span
        };
    }

    #[macro_export]
    macro_rules! debug_span {
        ($($tt:tt)*) => {
            $crate::trace::Span
        };
    }

    #[macro_export]
    macro_rules! info_span {
        ($($tt:tt)*) => {
            $crate::trace::Span
        };
    }

    pub use crate::{debug, debug_span, info, info_span, trace, trace_span, warn_ as warn};
}

#[cfg(not(feature = "tracing"))]
pub use noop::*;
