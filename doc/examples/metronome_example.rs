// Example: Driving the tick clock and click player without a window
// Shows how ticks, cues and click samples fit together

use mymusic_metronome::{Cue, Metronome, MetronomeSettings, TickClock};
use std::time::{Duration, Instant};

fn main() {
    let mut settings = MetronomeSettings {
        beats: 4,
        subdivisions: 2,
        tempo: 120,
        ..Default::default()
    };
    settings.gaps.insert(3);

    let params = settings.tick_parameters().expect("valid settings");
    let mut clock = TickClock::new(params).expect("valid parameters");
    let mut metronome = Metronome::new(48000.0);

    println!("Simulating 2 seconds at {}, beat 3 muted", params);

    let t0 = Instant::now();
    clock.start(t0).expect("clock is stopped");

    let mut now = t0;
    while now < t0 + Duration::from_secs(2) {
        if let Some(event) = clock.poll(now) {
            match Cue::for_tick(&event, &settings) {
                Some(cue) => {
                    println!(
                        "tick {:2} beat {} {:?} -> {:?}",
                        event.counter, event.beat, event.tick_type, cue.sound
                    );
                    metronome.trigger_click(cue.sound);
                }
                None => println!("tick {:2} beat {} (gap)", event.counter, event.beat),
            }
        }

        // One 10ms audio buffer
        let mut buffer = vec![0.0f32; 480];
        metronome.process_buffer(&mut buffer);
        now += Duration::from_millis(10);
    }

    clock.stop();
}
