//! Domain model builders consumed by the solver: the slip grid world and the
//! synthetic road network. Both produce ordinary [`crate::LexModel`]s through
//! the model-construction interface; the solver knows nothing about them.

pub mod grid;
pub mod road;
