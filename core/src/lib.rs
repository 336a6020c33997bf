#![deny(clippy::missing_inline_in_public_items)]

use errors::DirectoryError;

pub mod canonizer;
pub mod config;
pub mod distance;
pub mod driver;
pub mod errors;
pub mod graph;
pub mod logger;
pub mod model;
pub mod normalizer;
pub mod player;
pub mod rng;
pub mod selector;
#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

#[cfg(test)]
extern crate rstest_reuse;

/// This macro returns the name of the enclosing function.
/// As the internal implementation is based on the [`std::any::type_name`], this macro derives
/// all the limitations of this function.
///
/// [`std::any::type_name`]: https://doc.rust-lang.org/std/any/fn.type_name.html
///
/// # Note
///
/// This macro is copied from the `stdext` crate. <https://github.com/popzxc/stdext-rs>
#[macro_export]
macro_rules! function_name {
    () => {{
        const fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            std::any::type_name::<T>()
        }
        let name = type_name_of(f);
        // `3` is the length of the `::f`.
        &name[..name.len() - 3]
    }};
}

#[must_use]
#[inline]
pub fn format_duration(duration: &std::time::Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = duration.as_secs_f32() % 60.;

    format!("{hours:02}:{minutes:02}:{seconds:05.2}")
}

/// Get the data directory for the application.
///
/// Follows the XDG Base Directory Specification for linux, and the equivalents on other platforms.
/// See the [`directories`](https://docs.rs/directories/latest/directories/) crate for more information.
///
/// # Errors
///
/// This function will return an error if the data directory could not be found.
#[inline]
pub fn get_data_dir() -> Result<std::path::PathBuf, DirectoryError> {
    let directory = if let Ok(s) = std::env::var("FOREVER_JUKEBOX_DATA") {
        std::path::PathBuf::from(s)
    } else if let Some(proj_dirs) =
        directories::ProjectDirs::from("io", "forever-jukebox", "forever-jukebox")
    {
        proj_dirs.data_local_dir().to_path_buf()
    } else {
        return Err(DirectoryError::Data);
    };
    Ok(directory)
}

/// Get the config directory for the application.
///
/// Follows the XDG Base Directory Specification for linux, and the equivalents on other platforms.
/// See the [`directories`](https://docs.rs/directories/latest/directories/) crate for more information.
///
/// # Errors
///
/// This function will return an error if the config directory could not be found.
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, DirectoryError> {
    let directory = if let Ok(s) = std::env::var("FOREVER_JUKEBOX_CONFIG") {
        std::path::PathBuf::from(s)
    } else if let Some(proj_dirs) =
        directories::ProjectDirs::from("io", "forever-jukebox", "forever-jukebox")
    {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        return Err(DirectoryError::Config);
    };
    Ok(directory)
}

/// A `OnceLock` that returns a default value if it has not been set yet.
#[derive(Debug, Clone)]
pub struct OnceLockDefault<T> {
    value: std::sync::OnceLock<T>,
    default: T,
}

impl<T> OnceLockDefault<T> {
    /// Creates a new `OnceLockDefault` with the given default value.
    #[inline]
    pub const fn new(default: T) -> Self {
        Self {
            value: std::sync::OnceLock::new(),
            default,
        }
    }

    /// Initializes the contents of the cell to value.
    ///
    /// # Errors
    ///
    /// Returns `Ok(())` if the cell was uninitialized and `Err(value)` if the cell was already initialized.
    #[inline]
    pub fn set(&self, value: T) -> Result<(), T> {
        self.value.set(value)
    }

    /// Gets the reference to the underlying value, if set. Otherwise returns a reference to the default value.
    #[inline]
    pub fn get(&self) -> &T {
        self.value.get().unwrap_or(&self.default)
    }

    /// Checks if the cell has been initialized.
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.value.get().is_some()
    }
}

impl<T> std::ops::Deref for OnceLockDefault<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.get()
    }
}
