// User interface: tick presentation and the metronome screen

pub mod app;
pub mod cue;
