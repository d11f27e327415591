//! Handoff of compiled contexts from the editor to the audio callback.
//!
//! [`channel`] creates a [`Publisher`]/[`Renderer`] pair around one
//! `ArcSwapOption`. The editor compiles a context to completion and then
//! publishes it with a single atomic store, so the renderer only ever sees
//! fully built contexts. The renderer loads the pointer once per block.
//!
//! Execution state for a new context is built on the publishing side and
//! parked next to it. The renderer takes it with `try_lock` when it first sees
//! the new context id, which keeps allocation off the audio thread in the
//! common case. If the lock is contended the renderer builds the state itself.
//!
//! The context and state a renderer stops using are handed back through a
//! one-entry retire slot and freed by the publisher on its next
//! [`publish`](Publisher::publish), [`clear`](Publisher::clear) or
//! [`reclaim`](Publisher::reclaim).
//!
//! ```text
//! editor thread                          audio thread
//! compile() ─> publish(ctx) ──ArcSwap──> render(): load, swap state, run
//! reclaim()  <──────── retire slot ────── previous (ctx, state)
//! ```

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;

use crate::executor::{self, ExecutionState};
use crate::plan::{CompiledContext, ContextId};
use crate::runtime::{Inputs, RuntimeContext};
use crate::value::Value;

/// A published context plus the state prepared for it.
struct Installed {
    context: Arc<CompiledContext>,
    state: Mutex<Option<ExecutionState>>,
}

/// A context the renderer has stopped running, with its state.
type Retired = (Arc<CompiledContext>, ExecutionState);

struct Shared {
    installed: ArcSwapOption<Installed>,
    retired: Mutex<Option<Retired>>,
}

/// Creates a connected publisher and renderer with nothing installed.
pub fn channel() -> (Publisher, Renderer) {
    let shared = Arc::new(Shared {
        installed: ArcSwapOption::empty(),
        retired: Mutex::new(None),
    });
    (
        Publisher {
            shared: Arc::clone(&shared),
        },
        Renderer {
            shared,
            active: None,
            backlog: None,
        },
    )
}

/// Editor-side end of the handoff.
pub struct Publisher {
    shared: Arc<Shared>,
}

impl Publisher {
    /// Installs `context` for the next block.
    pub fn publish(&self, context: Arc<CompiledContext>) {
        self.reclaim();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "publish {}: {} steps, {} cells",
            context.id(),
            context.steps().len(),
            context.field_len()
        );
        let state = ExecutionState::new(&context);
        self.shared.installed.store(Some(Arc::new(Installed {
            context,
            state: Mutex::new(Some(state)),
        })));
    }

    /// Retracts the installed context. The renderer outputs silence.
    pub fn clear(&self) {
        self.reclaim();
        #[cfg(feature = "tracing")]
        tracing::debug!("publish: cleared");
        self.shared.installed.store(None);
    }

    /// Frees whatever the renderer has handed back. Returns whether
    /// anything was waiting.
    pub fn reclaim(&self) -> bool {
        let retired = self.shared.retired.lock().take();
        #[cfg(feature = "tracing")]
        if let Some((context, _)) = &retired {
            tracing::debug!("reclaim {}", context.id());
        }
        retired.is_some()
    }

    /// The context currently installed.
    pub fn current(&self) -> Option<Arc<CompiledContext>> {
        self.shared
            .installed
            .load()
            .as_ref()
            .map(|i| Arc::clone(&i.context))
    }
}

impl core::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Publisher")
            .field("current", &self.current().map(|c| c.id()))
            .finish()
    }
}

/// Audio-side end of the handoff.
pub struct Renderer {
    shared: Arc<Shared>,
    active: Option<Retired>,
    /// Retired entry the publisher has not taken yet.
    backlog: Option<Retired>,
}

impl Renderer {
    /// Id of the context the last block ran.
    pub fn active(&self) -> Option<ContextId> {
        self.active.as_ref().map(|(c, _)| c.id())
    }

    /// Runs one block of the installed context.
    ///
    /// Returns `None` while nothing is published.
    pub fn render(
        &mut self,
        runtime: &mut RuntimeContext<'_>,
        externals: &Inputs<'_>,
    ) -> Option<&[Value]> {
        self.hand_back();
        let guard = self.shared.installed.load();
        let previous = match guard.as_ref() {
            None => self.active.take(),
            Some(installed)
                if self
                    .active
                    .as_ref()
                    .is_none_or(|(c, _)| c.id() != installed.context.id()) =>
            {
                let state = installed
                    .state
                    .try_lock()
                    .and_then(|mut parked| parked.take())
                    .unwrap_or_else(|| ExecutionState::new(&installed.context));
                self.active.replace((Arc::clone(&installed.context), state))
            }
            Some(_) => None,
        };
        drop(guard);
        if let Some(previous) = previous {
            self.retire(previous);
        }

        let (context, state) = self.active.as_mut()?;
        Some(executor::run(context, state, runtime, externals))
    }

    /// Moves the backlog into the retire slot if the slot is free.
    fn hand_back(&mut self) {
        if self.backlog.is_none() {
            return;
        }
        if let Some(mut slot) = self.shared.retired.try_lock()
            && slot.is_none()
        {
            *slot = self.backlog.take();
        }
    }

    fn retire(&mut self, retired: Retired) {
        self.hand_back();
        // Replaces, and frees here, an entry the publisher never reclaimed.
        self.backlog = Some(retired);
        self.hand_back();
    }

    /// Runs one block into `out`, zero-filling cells the output does not
    /// cover. Returns the number of cells written from the context.
    pub fn render_into(
        &mut self,
        out: &mut [Value],
        runtime: &mut RuntimeContext<'_>,
        externals: &Inputs<'_>,
    ) -> usize {
        let written = match self.render(runtime, externals) {
            Some(result) => {
                let n = result.len().min(out.len());
                out[..n].copy_from_slice(&result[..n]);
                n
            }
            None => 0,
        };
        out[written..].fill(Value::ZERO);
        written
    }
}

impl core::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Renderer")
            .field("active", &self.active())
            .finish()
    }
}
