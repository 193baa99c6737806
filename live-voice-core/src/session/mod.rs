pub mod capture;
pub mod controller;
pub mod events;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;
