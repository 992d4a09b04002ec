//! Stimulus scripts for decoder tests.
//!
//! Times are in microseconds. Every line starts released (high) unless
//! `initial` says otherwise; `set` records a level change, and repeated
//! sets to the current level are ignored when the capture is built.

#![allow(dead_code)]

use iecshark_core::{BusLine, Capture, CaptureChannel, EdgeChannel, Level};

pub const RATE_HZ: u32 = 4_000_000;
pub const ATN: u16 = 0;
pub const CLK: u16 = 1;
pub const DATA: u16 = 2;
/// Quiet bus before the first transaction.
pub const LEAD_IN_US: u64 = 2_000;

/// EOI shape: DATA falls `hold_us` after ready and stays low `ack_us`.
#[derive(Debug, Clone, Copy)]
pub struct Eoi {
    pub hold_us: u64,
    pub ack_us: u64,
}

impl Eoi {
    pub const STANDARD: Eoi = Eoi {
        hold_us: 210,
        ack_us: 80,
    };
}

/// Key instants of one scripted byte, in microseconds.
#[derive(Debug, Clone, Copy)]
pub struct ByteTiming {
    pub ready: u64,
    /// CLK fall that opens the bit phase.
    pub clk_start: u64,
    /// CLK fall after the eighth bit.
    pub last_fall: u64,
    /// Listener pulls DATA low.
    pub ack: u64,
}

pub struct BusScript {
    rate_hz: u32,
    initial: [Level; 3],
    changes: [Vec<(u64, Level)>; 3],
}

fn index(line: BusLine) -> usize {
    match line {
        BusLine::Atn => 0,
        BusLine::Clk => 1,
        BusLine::Data => 2,
    }
}

impl BusScript {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            rate_hz,
            initial: [Level::High; 3],
            changes: [Vec::new(), Vec::new(), Vec::new()],
        }
    }

    /// Sample index of a time in microseconds.
    pub fn at(&self, us: u64) -> u64 {
        us * u64::from(self.rate_hz) / 1_000_000
    }

    pub fn initial(&mut self, line: BusLine, level: Level) -> &mut Self {
        self.initial[index(line)] = level;
        self
    }

    pub fn set(&mut self, us: u64, line: BusLine, level: Level) -> &mut Self {
        let sample = self.at(us);
        self.changes[index(line)].push((sample, level));
        self
    }

    pub fn atn(&mut self, us: u64, level: Level) -> &mut Self {
        self.set(us, BusLine::Atn, level)
    }

    pub fn clk(&mut self, us: u64, level: Level) -> &mut Self {
        self.set(us, BusLine::Clk, level)
    }

    pub fn data(&mut self, us: u64, level: Level) -> &mut Self {
        self.set(us, BusLine::Data, level)
    }

    /// Talker holds CLK, listener holds DATA.
    pub fn hold(&mut self, us: u64) -> &mut Self {
        self.clk(us, Level::Low).data(us, Level::Low)
    }

    /// Both handshake lines released.
    pub fn release(&mut self, us: u64) -> &mut Self {
        self.clk(us, Level::High).data(us, Level::High)
    }

    /// Ready phase starting 30 µs after `t`; CLK falls `ready_us` later.
    /// Returns `(ready, clk_start)`.
    pub fn ready_phase(&mut self, t: u64, ready_us: u64) -> (u64, u64) {
        let ready = t + 30;
        self.release(ready);
        let clk_start = ready + ready_us;
        self.clk(clk_start, Level::Low);
        (ready, clk_start)
    }

    /// Ready phase with an EOI acknowledge pulse. Returns `(ready, clk_start)`.
    pub fn eoi_phase(&mut self, t: u64, eoi: Eoi) -> (u64, u64) {
        let ready = t + 30;
        self.release(ready);
        let fall = ready + eoi.hold_us;
        self.data(fall, Level::Low);
        self.data(fall + eoi.ack_us, Level::High);
        let clk_start = fall + eoi.ack_us + 40;
        self.clk(clk_start, Level::Low);
        (ready, clk_start)
    }

    /// The first `count` bit cells of `value`, LSB first. Returns the last
    /// CLK fall.
    pub fn bits(&mut self, clk_start: u64, value: u8, count: u64) -> u64 {
        for bit in 0..count {
            let cell = clk_start + 60 * bit;
            let one = (value >> bit) & 1 == 1;
            self.data(cell + 20, Level::from_bit(one));
            self.clk(cell + 40, Level::High);
            self.clk(cell + 60, Level::Low);
        }
        clk_start + 60 * count
    }

    /// Talker releases DATA, listener pulls it low. Returns the ack time.
    pub fn ack(&mut self, last_fall: u64) -> u64 {
        self.data(last_fall + 10, Level::High);
        self.data(last_fall + 60, Level::Low);
        last_fall + 60
    }

    /// A complete byte starting from CLK and DATA held low at `t`.
    pub fn byte(&mut self, t: u64, value: u8) -> ByteTiming {
        let (ready, clk_start) = self.ready_phase(t, 40);
        self.finish_byte(ready, clk_start, value)
    }

    pub fn eoi_byte(&mut self, t: u64, value: u8, eoi: Eoi) -> ByteTiming {
        let (ready, clk_start) = self.eoi_phase(t, eoi);
        self.finish_byte(ready, clk_start, value)
    }

    fn finish_byte(&mut self, ready: u64, clk_start: u64, value: u8) -> ByteTiming {
        let last_fall = self.bits(clk_start, value, 8);
        let ack = self.ack(last_fall);
        ByteTiming {
            ready,
            clk_start,
            last_fall,
            ack,
        }
    }

    /// Build a three-channel capture (ATN, CLK, DATA on ids 0, 1, 2).
    pub fn capture(&self, end_us: u64) -> Capture {
        let samples = self.at(end_us);
        let channels = [(ATN, "ATN"), (CLK, "CLK"), (DATA, "DATA")]
            .into_iter()
            .enumerate()
            .map(|(slot, (id, name))| {
                let mut changes = self.changes[slot].clone();
                changes.sort_by_key(|&(sample, _)| sample);
                let mut current = self.initial[slot];
                let mut edges = Vec::new();
                for (sample, level) in changes {
                    if level != current {
                        edges.push(sample);
                        current = level;
                    }
                }
                CaptureChannel {
                    id,
                    name: name.to_string(),
                    edges: EdgeChannel::new(self.initial[slot], edges, samples).unwrap(),
                }
            })
            .collect();
        Capture {
            sample_rate_hz: self.rate_hz,
            samples,
            channels,
        }
    }
}

/// Serialize a capture in the JSON capture format.
pub fn capture_to_json(capture: &Capture) -> String {
    let channels: Vec<serde_json::Value> = capture
        .channels
        .iter()
        .map(|channel| {
            serde_json::json!({
                "id": channel.id,
                "name": channel.name,
                "initial": u8::from(channel.edges.initial().is_high()),
                "edges": channel.edges.edges(),
            })
        })
        .collect();
    serde_json::json!({
        "sample_rate_hz": capture.sample_rate_hz,
        "samples": capture.samples,
        "channels": channels,
    })
    .to_string()
}

/// Serialize a capture as a transition CSV, one row per edge instant plus
/// a closing row on the last sample.
pub fn capture_to_csv(capture: &Capture, with_rate_comment: bool) -> String {
    let mut instants: Vec<u64> = capture
        .channels
        .iter()
        .flat_map(|channel| channel.edges.edges().iter().copied())
        .collect();
    instants.push(0);
    instants.push(capture.samples - 1);
    instants.sort_unstable();
    instants.dedup();

    let mut out = String::new();
    if with_rate_comment {
        out.push_str(&format!("# sample_rate_hz={}\n", capture.sample_rate_hz));
    }
    out.push_str("Time [s]");
    for channel in &capture.channels {
        out.push(',');
        out.push_str(&channel.name);
    }
    out.push('\n');
    for sample in instants {
        let seconds = sample as f64 / f64::from(capture.sample_rate_hz);
        out.push_str(&format!("{seconds:.9}"));
        for channel in &capture.channels {
            let bit = u8::from(channel.edges.level_at(sample).is_high());
            out.push_str(&format!(",{bit}"));
        }
        out.push('\n');
    }
    out
}
