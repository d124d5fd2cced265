pub mod room;
pub mod service;
pub mod table;

pub use room::{Room, RoomPhase};
pub use service::RoomService;
