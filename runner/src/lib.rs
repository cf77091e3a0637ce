// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The host-program bridge (spec §4.6): loads a guest WebAssembly binary
//! with `wasmtime` and runs it against the WASI subset and custom
//! `__tinygo_*` host ABI in `host`. Knows nothing about `kern::Schematic`
//! directly - every hardware operation goes through the `SchematicBridge`
//! trait, so this crate is reusable unchanged whether the schematic lives
//! on another thread or is driven inline (`worker`'s job, spec §5, §9).

pub mod bridge;
pub mod host;
pub mod shared_buffer;

pub use bridge::{HostCall, HostOp, HostReply, SchematicBridge};
pub use host::RunnerEvent;
pub use shared_buffer::SharedBuffer;

use anyhow::{Context, Result};
use host::{add_tinygo_abi, add_wasi_subset, ProcExit, RunnerState};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use wasmtime::{Engine, Linker, Module, Store};

/// How a run ended (spec §6 `exited`/`error`): a clean `proc_exit` versus
/// an uncaught wasm trap or an unsatisfiable import.
pub enum RunOutcome {
    Exited(i32),
    Trapped(String),
}

/// A loaded, not-yet-running guest module. Cheap to hold onto: parsing and
/// the host ABI registration happen once in [`Runner::load`], so multiple
/// [`Runner::run`] calls (a restart) don't re-parse the binary.
pub struct Runner {
    engine: Engine,
    module: Module,
    linker: Linker<RunnerState>,
}

impl Runner {
    /// Parses `wasm_bytes` and wires up the host ABI (spec §4.6). A
    /// parse/validation failure here is the "program fetch/compile
    /// failure" case (spec §7); the caller turns it into `error{message,
    /// source: "compiler"}`.
    pub fn load(wasm_bytes: &[u8]) -> Result<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, wasm_bytes).context("failed to parse wasm module")?;
        let mut linker = Linker::new(&engine);
        add_wasi_subset(&mut linker)?;
        add_tinygo_abi(&mut linker)?;
        Ok(Self { engine, module, linker })
    }

    /// Instantiates the module and runs its `_start` export to completion
    /// against `bridge` (spec §4.6, §5). Blocks the calling thread for the
    /// run's duration - the threaded worker is expected to call this from
    /// its own dedicated thread; the inline worker calls it directly.
    pub fn run(
        &self,
        mcu_id: String,
        bridge: Arc<dyn SchematicBridge>,
        shared: Arc<SharedBuffer>,
        events: Box<dyn FnMut(RunnerEvent) + Send>,
    ) -> Result<RunOutcome> {
        let state = RunnerState {
            mcu_id,
            bridge,
            shared,
            rng: ChaCha8Rng::seed_from_u64(0),
            events,
            ws2812_pending: Default::default(),
        };
        let mut store = Store::new(&self.engine, state);
        let instance =
            self.linker.instantiate(&mut store, &self.module).context("failed to instantiate guest module")?;
        let start = instance
            .get_typed_func::<(), ()>(&mut store, "_start")
            .context("guest module has no _start export")?;
        match start.call(&mut store, ()) {
            Ok(()) => Ok(RunOutcome::Exited(0)),
            Err(e) => match e.downcast::<ProcExit>() {
                Ok(exit) => Ok(RunOutcome::Exited(exit.0)),
                Err(e) => Ok(RunOutcome::Trapped(e.to_string())),
            },
        }
    }
}
