//! Everything the generator is told about the code under test: the focal
//! declaration, its usage closure and nearby example tests.

pub mod closure;
pub mod examples;
pub mod resolve;

pub use closure::UsageClosureExtractor;
pub use examples::{ExampleTest, ExampleTestSelector};
pub use resolve::{FocalDecl, FocalFunctionResolver};
