//! Unwrap helpers with good error messages.
//!
//! These replace `unwrap()` and `expect()` in test code, reporting the
//! caller's location via `#[track_caller]`.

use std::fmt::Debug;

/// Unwrap a `Result`, panicking with context on error.
///
/// ```rust
/// use fleetwear_test_helpers::must;
///
/// let result: Result<i32, &str> = Ok(42);
/// assert_eq!(must(result), 42);
/// ```
///
/// # Panics
///
/// Panics if the result is `Err`, with a message including the error value.
#[track_caller]
pub fn must<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must: unexpected Err: {e:?}"),
    }
}

/// Unwrap an `Option`, panicking with a custom message if `None`.
///
/// # Panics
///
/// Panics if the option is `None`, with the provided message.
#[track_caller]
pub fn must_some<T>(option: Option<T>, msg: &str) -> T {
    match option {
        Some(v) => v,
        None => panic!("must_some: {msg}"),
    }
}

/// Unwrap a `Result` with a custom context message.
///
/// # Panics
///
/// Panics if the result is `Err`, with the context and error value.
#[track_caller]
pub fn must_with<T, E: Debug>(result: Result<T, E>, context: &str) -> T {
    match result {
        Ok(v) => v,
        Err(e) => panic!("must_with: {context}: {e:?}"),
    }
}

#[cfg(feature = "mock")]
mod async_helpers {
    use super::*;
    use std::future::Future;

    /// Await a future that returns `Result`, unwrapping with context on error.
    ///
    /// This is the async version of [`must`].
    #[track_caller]
    pub async fn must_async<F, T, E>(future: F) -> T
    where
        F: Future<Output = Result<T, E>>,
        E: Debug,
    {
        match future.await {
            Ok(v) => v,
            Err(e) => panic!("must_async: unexpected Err: {e:?}"),
        }
    }
}

#[cfg(feature = "mock")]
pub use async_helpers::must_async;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_must_ok() {
        let result: Result<i32, &str> = Ok(42);
        assert_eq!(must(result), 42);
    }

    #[test]
    #[should_panic(expected = "must: unexpected Err")]
    fn test_must_err() {
        let result: Result<i32, &str> = Err("error");
        must(result);
    }

    #[test]
    #[should_panic(expected = "must_some: expected a device")]
    fn test_must_some_none() {
        let option: Option<i32> = None;
        must_some(option, "expected a device");
    }

    #[test]
    #[should_panic(expected = "must_with: loading config")]
    fn test_must_with_err() {
        let result: Result<i32, &str> = Err("missing");
        must_with(result, "loading config");
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn test_must_async_ok() {
        let value = must_async(async { Ok::<_, String>(7) }).await;
        assert_eq!(value, 7);
    }
}
