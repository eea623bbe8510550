//! This crate implements symbolication of textual stack traces.
//!
//! A raw stack trace, as printed by a managed runtime, is parsed line-by-line
//! into [`StackFrame`]s. Each frame can then be resolved against a
//! [`TypeCatalog`] supplied by the host, which maps the textual signature back
//! onto the one method it denotes, if that method can be identified
//! unambiguously.
//!
//! # Examples
//!
//! ```
//! use textrace::{MethodInfo, StackTrace, TypeCatalog, TypeInfo};
//!
//! let catalog = TypeCatalog::new([
//!     TypeInfo::new("Shop.Cart")
//!         .with_constructor(MethodInfo::new(".ctor", ["Customer"]))
//!         .with_method(MethodInfo::new("Add", ["Shop.Item"]))
//!         .with_method(MethodInfo::new("Add", ["Shop.Item", "System.Int32"])),
//!     TypeInfo::nested("Shop.Cart+Line")
//!         .with_method(MethodInfo::new("Total", [])),
//! ]);
//!
//! let raw = "   at System.Environment.get_StackTrace()
//!    at Capture.Trace(Int32 skip)
//!    at Capture.Trace()
//!    at Shop.Log.Write(String message)
//!    at Shop.Cart.Line.Total()
//!    at Shop.Cart.Add(Item item, Int32 count) in Cart.cs:line 31
//!    at Shop.Cart..ctor(Customer customer) in Cart.cs:line 12
//! ";
//! let trace = StackTrace::capture(raw, 1);
//! assert_eq!(trace.frame_count(), 3);
//!
//! let total = trace.frame(0).resolve(&catalog).unwrap();
//! assert_eq!(total.declaring_type().full_name, "Shop.Cart+Line");
//!
//! let add = trace.frame(1).resolve(&catalog).unwrap();
//! assert_eq!(add.to_string(), "Shop.Cart.Add(Shop.Item, System.Int32)");
//! assert_eq!(trace.frame(1).line_number(), Some(31));
//!
//! let ctor = trace.frame(2).resolve(&catalog).unwrap();
//! assert!(ctor.is_constructor());
//! ```

#![warn(missing_docs)]

mod catalog;
mod entry;
mod resolver;
mod stacktrace;

pub use catalog::{CatalogError, MethodInfo, Module, TypeCatalog, TypeInfo, NESTED_TYPE_SEPARATOR};
pub use entry::{EntryModuleError, EntryModuleFinder, DEFAULT_IGNORED_MODULES};
pub use resolver::ResolvedMethod;
pub use stacktrace::{
    CaptureOptions, StackFrame, StackTrace, CONSTRUCTOR_NAME, DEFAULT_SKIP_FRAMES, SELF_FRAMES,
};
