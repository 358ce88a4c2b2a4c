// Domain layer - Core business logic

pub mod index;
pub mod model;
pub mod rules;
