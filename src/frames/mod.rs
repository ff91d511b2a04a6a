pub mod locator;
pub mod web_frames;
