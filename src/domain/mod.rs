pub mod model;
pub mod repos;
