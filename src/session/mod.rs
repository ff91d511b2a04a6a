pub mod controller;
pub mod menu;
pub mod save;
pub mod state_machine;
