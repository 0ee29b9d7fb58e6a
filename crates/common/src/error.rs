/// Error types that can be built from a rendered message.
///
/// Each library crate implements this for its own `Error` and then calls
/// [`impl_context!`] so `.context()` works on its `Result`s and `Option`s.
pub trait FromMessage: Sized {
    fn from_message(message: String) -> Self;
}

/// Render `context: source` the same way in every crate.
#[must_use]
pub fn join_context(context: &str, source: &dyn std::fmt::Display) -> String {
    format!("{context}: {source}")
}

/// Generate a crate-local `Context` trait for `Result` and `Option`.
///
/// Expects `Error: FromMessage` and `type Result<T>` in the invoking module.
///
/// ```ignore
/// // crates/oauth/src/error.rs
/// credlink_common::impl_context!();
/// ```
#[macro_export]
macro_rules! impl_context {
    () => {
        pub trait Context<T> {
            fn context(self, context: impl Into<String>) -> Result<T>;

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C;
        }

        impl<T, E: std::fmt::Display> Context<T> for std::result::Result<T, E> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context)
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.map_err(|source| {
                    let rendered = $crate::join_context(&f().into(), &source);
                    <Error as $crate::FromMessage>::from_message(rendered)
                })
            }
        }

        impl<T> Context<T> for Option<T> {
            fn context(self, context: impl Into<String>) -> Result<T> {
                self.with_context(|| context)
            }

            fn with_context<C, F>(self, f: F) -> Result<T>
            where
                C: Into<String>,
                F: FnOnce() -> C,
            {
                self.ok_or_else(|| <Error as $crate::FromMessage>::from_message(f().into()))
            }
        }
    };
}
