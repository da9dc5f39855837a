pub mod audio;
pub mod common;
pub mod configs;
pub mod gateway;
pub mod player;
pub mod protocol;
pub mod server;
pub mod transport;
