pub mod arm;
pub mod model;
#[cfg(test)]
pub mod stubs;
