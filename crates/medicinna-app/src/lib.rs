pub mod controller;
pub mod events;
pub mod orchestrator;
pub mod pipeline;
pub mod state;
#[cfg(test)]
mod tests;
