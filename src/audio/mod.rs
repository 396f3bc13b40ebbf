// Audio module - CPAL backend rendering the click track

pub mod engine;
