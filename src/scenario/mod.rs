pub mod context;
pub mod page;
pub mod recording_menu;
pub mod runner;
pub mod scenario_model;
