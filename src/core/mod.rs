//! Declaration model: names, values, resources, stacks and the references between
//! them

pub mod app;
pub mod cdn;
pub mod graph;
pub mod iam;
pub mod reference;
pub mod resource;
pub mod stack;
pub mod validation;
pub mod value;
