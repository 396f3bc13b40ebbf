// Lock-free communication channels

use crate::messaging::command::Command;
use crate::ui::cue::Cue;
use ringbuf::{HeapRb, traits::Split};

pub type CommandProducer = ringbuf::HeapProd<Command>;
pub type CommandConsumer = ringbuf::HeapCons<Command>;

pub fn create_command_channel(capacity: usize) -> (CommandProducer, CommandConsumer) {
    let rb = HeapRb::<Command>::new(capacity);
    rb.split()
}

pub type CueProducer = ringbuf::HeapProd<Cue>;
pub type CueConsumer = ringbuf::HeapCons<Cue>;

pub fn create_cue_channel(capacity: usize) -> (CueProducer, CueConsumer) {
    let rb = HeapRb::<Cue>::new(capacity);
    rb.split()
}
