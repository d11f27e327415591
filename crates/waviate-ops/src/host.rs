//! Operators that read the running stream through the host context.
//!
//! These operators are runtime-only: the compiler never folds them. During
//! compilation they run once with a detached context and write placeholder
//! values; only their lengths matter at that point.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use waviate_core::{
    DeclaredType, Inputs, LenQuery, NodeConfig, NodeFault, OperatorType, RuntimeContext, SlotSpec,
    Value, ValueType,
};

use crate::{OperatorCategory, id};

/// Number of MIDI note lanes.
pub const NOTE_COUNT: usize = 128;

/// Per-stream state read by host-backed operators.
///
/// The audio side owns one of these, advances it after every block, and hands
/// it to the executor with [`BlockContext::runtime`].
#[derive(Debug, Clone)]
pub struct BlockContext {
    /// Stream sample rate in Hz.
    pub sample_rate: f64,
    /// Index of the first frame of the current block.
    pub frame: u64,
    notes: [bool; NOTE_COUNT],
    rng: StdRng,
}

impl BlockContext {
    /// Creates a context at frame 0 with a noise generator seeded from `seed`.
    pub fn new(sample_rate: f64, seed: u64) -> Self {
        Self {
            sample_rate,
            frame: 0,
            notes: [false; NOTE_COUNT],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Moves to the next block.
    pub fn advance(&mut self, frames: usize) {
        self.frame += frames as u64;
    }

    /// Marks `note` as held. Out-of-range notes are ignored.
    pub fn note_on(&mut self, note: u8) {
        if let Some(n) = self.notes.get_mut(usize::from(note)) {
            *n = true;
        }
    }

    /// Releases `note`.
    pub fn note_off(&mut self, note: u8) {
        if let Some(n) = self.notes.get_mut(usize::from(note)) {
            *n = false;
        }
    }

    /// Whether `note` is held.
    pub fn is_held(&self, note: u8) -> bool {
        self.notes.get(usize::from(note)).copied().unwrap_or(false)
    }

    /// Uniform sample from the closed interval between `a` and `b`.
    pub fn uniform(&mut self, a: f64, b: f64) -> f64 {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        if lo == hi || !lo.is_finite() || !hi.is_finite() {
            return lo;
        }
        self.rng.random_range(lo..=hi)
    }

    /// Runtime context exposing this block to operator bodies.
    pub fn runtime(&mut self) -> RuntimeContext<'_> {
        RuntimeContext::new(self)
    }
}

impl Default for BlockContext {
    fn default() -> Self {
        Self::new(48_000.0, 0)
    }
}

fn one(_: &LenQuery<'_>) -> Result<usize, NodeFault> {
    Ok(1)
}

fn notes_len(_: &LenQuery<'_>) -> Result<usize, NodeFault> {
    Ok(NOTE_COUNT)
}

fn noise_len(q: &LenQuery<'_>) -> Result<usize, NodeFault> {
    crate::vector::count(q, 2)
}

fn sample_number(_: &NodeConfig, rt: &mut RuntimeContext<'_>, _: &Inputs<'_>, out: &mut [Value]) {
    let frame = rt.host::<BlockContext>().map_or(0, |b| b.frame);
    out.fill(Value::integer(frame as i64));
}

fn sample_rate(_: &NodeConfig, rt: &mut RuntimeContext<'_>, _: &Inputs<'_>, out: &mut [Value]) {
    let rate = rt.host::<BlockContext>().map_or(0.0, |b| b.sample_rate);
    out.fill(Value::decimal(rate));
}

fn white_noise(_: &NodeConfig, rt: &mut RuntimeContext<'_>, inputs: &Inputs<'_>, out: &mut [Value]) {
    let (a, b) = (inputs.scalar(0), inputs.scalar(1));
    match rt.host::<BlockContext>() {
        Some(block) => {
            for o in out.iter_mut() {
                *o = Value::decimal(block.uniform(a, b));
            }
        }
        None => out.fill(Value::decimal(a)),
    }
}

fn note_on(_: &NodeConfig, rt: &mut RuntimeContext<'_>, _: &Inputs<'_>, out: &mut [Value]) {
    match rt.host::<BlockContext>() {
        Some(block) => {
            for (o, held) in out.iter_mut().zip(block.notes) {
                *o = Value::boolean(held);
            }
        }
        None => out.fill(Value::ZERO),
    }
}

/// Host-backed operators.
pub(crate) fn operators() -> Vec<OperatorType> {
    let category = OperatorCategory::Host.name();
    vec![
        OperatorType::builtin(id::SAMPLE_NUMBER, "current sample number", one, sample_number)
            .category(category)
            .output(DeclaredType::INTEGER)
            .runtime_only(),
        OperatorType::builtin(id::SAMPLE_RATE, "sample rate", one, sample_rate)
            .category(category)
            .runtime_only(),
        OperatorType::builtin(id::WHITE_NOISE, "white noise", noise_len, white_noise)
            .category(category)
            .slot(SlotSpec::new("a", ValueType::Decimal).with_len(1))
            .slot(
                SlotSpec::new("b", ValueType::Decimal)
                    .with_len(1)
                    .with_default(1.0),
            )
            .slot(
                SlotSpec::new("n", ValueType::Integer)
                    .with_len(1)
                    .compile_time()
                    .with_default(1_i64),
            )
            .runtime_only(),
        OperatorType::builtin(id::NOTE_ON, "note on", notes_len, note_on)
            .category(category)
            .output(DeclaredType::BOOLEAN)
            .runtime_only(),
    ]
}
