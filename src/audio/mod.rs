pub mod player;
pub mod queue;
pub mod session;
pub mod track;
