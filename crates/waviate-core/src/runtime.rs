//! Views handed to operator bodies.
//!
//! - [`RuntimeContext`]: opaque per-block host state (sample clock, MIDI, noise
//!   generators). The engine only threads it through.
//! - [`Inputs`]: read-only, allocation-free view of a node's input vectors.
//! - [`LenQuery`]: what an output-length function may look at.

use core::any::Any;

use crate::operator::NodeConfig;
use crate::plan::Region;
use crate::value::Value;

/// Host state for one block, passed unchanged to every execute function.
///
/// A detached context carries no host; operators that need one (noise,
/// transport readers) must then produce a neutral value. The compiler always
/// uses a detached context when it runs bodies ahead of time.
#[derive(Default)]
pub struct RuntimeContext<'a> {
    host: Option<&'a mut (dyn Any + 'static)>,
}

impl<'a> RuntimeContext<'a> {
    /// A context with no host state.
    pub fn detached() -> Self {
        Self { host: None }
    }

    /// Wraps the host's per-block state.
    pub fn new<T: Any>(host: &'a mut T) -> Self {
        Self { host: Some(host) }
    }

    /// Borrows the host state as `T`, if present and of that type.
    pub fn host<T: Any>(&mut self) -> Option<&mut T> {
        self.host.as_deref_mut()?.downcast_mut::<T>()
    }

    /// True if no host state is attached.
    pub fn is_detached(&self) -> bool {
        self.host.is_none()
    }
}

impl core::fmt::Debug for RuntimeContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("detached", &self.is_detached())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Source<'a> {
    Field {
        field: &'a [Value],
        regions: &'a [Region],
    },
    Slices(&'a [&'a [Value]]),
    Owned(&'a [Vec<Value>]),
}

/// Read-only view of a node's input vectors, one per slot.
///
/// Unattached slots appear as one-element vectors holding the slot default.
#[derive(Clone, Copy)]
pub struct Inputs<'a>(Source<'a>);

impl Inputs<'static> {
    /// No inputs at all.
    pub const EMPTY: Self = Inputs(Source::Slices(&[]));
}

impl<'a> Inputs<'a> {
    /// Regions of a flat execution buffer.
    pub(crate) fn field(field: &'a [Value], regions: &'a [Region]) -> Self {
        Self(Source::Field { field, regions })
    }

    /// Borrowed slices.
    pub fn slices(slices: &'a [&'a [Value]]) -> Self {
        Self(Source::Slices(slices))
    }

    /// Owned vectors.
    pub fn owned(vectors: &'a [Vec<Value>]) -> Self {
        Self(Source::Owned(vectors))
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        match self.0 {
            Source::Field { regions, .. } => regions.len(),
            Source::Slices(s) => s.len(),
            Source::Owned(v) => v.len(),
        }
    }

    /// True if there are no slots.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The vector in `slot`, or `None` past the end.
    pub fn get(&self, slot: usize) -> Option<&'a [Value]> {
        match self.0 {
            Source::Field { field, regions } => regions.get(slot).map(|r| &field[r.range()]),
            Source::Slices(s) => s.get(slot).copied(),
            Source::Owned(v) => v.get(slot).map(Vec::as_slice),
        }
    }

    /// The vector in `slot`, or an empty slice past the end.
    pub fn slot(&self, slot: usize) -> &'a [Value] {
        self.get(slot).unwrap_or(&[])
    }

    /// First element of `slot` read as a decimal, or 0.0.
    pub fn scalar(&self, slot: usize) -> f64 {
        self.slot(slot).first().map_or(0.0, |v| v.as_decimal())
    }

    /// First element of `slot` read as an integer, or 0.
    pub fn integer(&self, slot: usize) -> i64 {
        self.slot(slot).first().map_or(0, |v| v.as_integer())
    }

    /// Iterates the slots in order.
    pub fn iter(&self) -> impl Iterator<Item = &'a [Value]> {
        let this = *self;
        (0..this.len()).map(move |slot| this.slot(slot))
    }
}

impl core::fmt::Debug for Inputs<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// What an output-length function can inspect about a node.
#[derive(Debug, Clone, Copy)]
pub struct LenQuery<'a> {
    config: &'a NodeConfig,
    inputs: Inputs<'a>,
    attached: &'a [bool],
}

impl<'a> LenQuery<'a> {
    pub(crate) fn new(config: &'a NodeConfig, inputs: Inputs<'a>, attached: &'a [bool]) -> Self {
        Self {
            config,
            inputs,
            attached,
        }
    }

    /// Node properties.
    pub fn config(&self) -> &'a NodeConfig {
        self.config
    }

    /// Speculative input values, already coerced to the slot types.
    pub fn inputs(&self) -> &Inputs<'a> {
        &self.inputs
    }

    /// Length of the vector in `slot` (1 when unattached).
    pub fn len(&self, slot: usize) -> usize {
        self.inputs.slot(slot).len()
    }

    /// Whether `slot` has a producer.
    pub fn is_attached(&self, slot: usize) -> bool {
        self.attached.get(slot).copied().unwrap_or(false)
    }

    /// Number of slots with a producer.
    pub fn attached_count(&self) -> usize {
        self.attached.iter().filter(|a| **a).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Clock {
        sample: u64,
    }

    #[test]
    fn host_downcast() {
        let mut clock = Clock { sample: 41 };
        let mut ctx = RuntimeContext::new(&mut clock);
        assert!(!ctx.is_detached());
        if let Some(c) = ctx.host::<Clock>() {
            c.sample += 1;
        }
        assert!(ctx.host::<u32>().is_none());
        assert_eq!(clock.sample, 42);
    }

    #[test]
    fn detached_has_no_host() {
        let mut ctx = RuntimeContext::detached();
        assert!(ctx.is_detached());
        assert!(ctx.host::<Clock>().is_none());
    }

    #[test]
    fn field_view_reads_regions() {
        let field: Vec<Value> = (0..6).map(|i| Value::decimal(f64::from(i))).collect();
        let regions = [Region::new(4, 2), Region::new(0, 1)];
        let inputs = Inputs::field(&field, &regions);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs.slot(0), &field[4..6]);
        assert_eq!(inputs.scalar(1), 0.0);
        assert!(inputs.get(2).is_none());
        assert!(inputs.slot(2).is_empty());
    }

    #[test]
    fn owned_and_slices_agree() {
        let owned = vec![vec![Value::integer(3)], vec![]];
        let a = Inputs::owned(&owned);
        let refs: Vec<&[Value]> = owned.iter().map(Vec::as_slice).collect();
        let b = Inputs::slices(&refs);
        assert_eq!(a.integer(0), b.integer(0));
        assert_eq!(a.slot(1).len(), 0);
        assert_eq!(b.iter().count(), 2);
        assert!(Inputs::EMPTY.is_empty());
    }

    #[test]
    fn len_query_counts_legs() {
        let config = NodeConfig::default();
        let owned = vec![vec![Value::ZERO; 3], vec![Value::ZERO]];
        let attached = [true, false];
        let q = LenQuery::new(&config, Inputs::owned(&owned), &attached);
        assert_eq!(q.len(0), 3);
        assert!(q.is_attached(0));
        assert!(!q.is_attached(5));
        assert_eq!(q.attached_count(), 1);
    }
}
