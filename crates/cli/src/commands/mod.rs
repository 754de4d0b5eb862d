pub mod analyze;
pub mod annotations;
pub mod catalog;
pub mod hosts;
pub mod util;

pub use analyze::*;
pub use annotations::*;
pub use catalog::*;
pub use hosts::*;
pub use util::*;
