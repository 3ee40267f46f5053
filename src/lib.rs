pub mod dashboard;
pub mod dispatcher;
pub mod error;
pub mod grid;
pub mod logging;
pub mod registry;
pub mod session;
pub mod state;
pub mod storage;
pub mod transport;
pub mod verify;
