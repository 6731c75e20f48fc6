//! Real-time helpers for the tick driver.

// -------------------------------------------------------------------------------------------------

/// Run the given function with allocation checks enabled, when the `assert-allocs` feature is
/// enabled. Checks are only effective when the binary installed `assert_no_alloc::AllocDisabler`
/// as global allocator.
#[inline]
pub(crate) fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    #[cfg(feature = "assert-allocs")]
    return assert_no_alloc::assert_no_alloc::<T, F>(func);

    #[cfg(not(feature = "assert-allocs"))]
    return func();
}

/// Temporarily allow allocations within an [`assert_no_alloc`] scope, e.g. for logging.
#[inline]
pub(crate) fn permit_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    #[cfg(feature = "assert-allocs")]
    return assert_no_alloc::permit_alloc::<T, F>(func);

    #[cfg(not(feature = "assert-allocs"))]
    return func();
}
