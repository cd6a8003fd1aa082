//! Feeds stdin through a parser channel and prints every decoded command.
//!
//! ```text
//! $ printf 'N1 G1 X20 Y30*41\nM117 "hello"\n' | cargo run --example cli
//! ```

use std::io::Read;

use gcode_buffer::{GCodeBuffer, NullObjectModel};

fn main() {
    env_logger::init();

    let mut gb: GCodeBuffer<NullObjectModel> = GCodeBuffer::new("stdin", NullObjectModel);

    for byte in std::io::stdin().bytes() {
        let Ok(b) = byte else { break };
        if gb.put_byte(b) {
            while gb.is_ready() {
                let mut short = String::new();
                let _ = gb.print_command(&mut short);
                println!(
                    "{:<8} {}",
                    short,
                    String::from_utf8_lossy(gb.data()).trim_end()
                );
                gb.set_finished();
            }
        }
    }
    println!("Done");
}
