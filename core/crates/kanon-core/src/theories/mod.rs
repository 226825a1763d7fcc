//! The built-in Shostak theories

pub mod arith;
pub mod array;
pub mod bv;
pub mod coproduct;
pub mod nonlin;
pub mod tuple;
