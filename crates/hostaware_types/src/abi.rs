//! Plugin Library ABI
//!
//! A plugin library exports two symbols:
//! - `hostaware_abi_version`: returns [`ABI_VERSION`]
//! - `hostaware_get_instances`: appends the library's instances to a vector
//!
//! Instances cross the library boundary as Rust trait objects, so plugins must
//! be built with the same toolchain and the same version of this crate as the
//! daemon. The version symbol catches the second mismatch before any instance
//! is created.
//!
//! # Example
//!
//! ```rust,ignore
//! hostaware_types::export_instances!(LoadAvgCollector::new(), LoadWatch::new());
//! ```

use crate::Instance;

/// Bumped whenever the `Instance` trait or the exported symbols change
pub const ABI_VERSION: u32 = 1;

pub const ABI_VERSION_SYMBOL: &[u8] = b"hostaware_abi_version\0";
pub const GET_INSTANCES_SYMBOL: &[u8] = b"hostaware_get_instances\0";

pub type AbiVersionFn = extern "C" fn() -> u32;
pub type GetInstancesFn = fn(&mut Vec<Box<dyn Instance>>);

/// Export the given instance constructors from a plugin library
#[macro_export]
macro_rules! export_instances {
    ($($instance:expr),+ $(,)?) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn hostaware_abi_version() -> u32 {
            $crate::ABI_VERSION
        }

        #[unsafe(no_mangle)]
        pub fn hostaware_get_instances(
            out: &mut ::std::vec::Vec<::std::boxed::Box<dyn $crate::Instance>>,
        ) {
            $( out.push(::std::boxed::Box::new($instance)); )+
        }
    };
}
