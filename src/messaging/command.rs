// Command types - UI/scheduler → audio thread

use crate::sequencer::ClickSound;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Play one click now
    Click(ClickSound),
    SetVolume(f32),
}
