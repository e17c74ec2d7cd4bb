mod client;
pub mod heartbeat;
pub mod home_assistant;
pub mod inverter;
pub mod ntfy;
pub mod octopus;
mod upstream;

pub use self::upstream::Upstream;
