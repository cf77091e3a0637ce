// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Ties `runner` and `kern::Schematic` together as the two cooperating
//! tasks spec §5 describes, and exposes the UI message surface (spec §6)
//! as a single [`Worker`] an embedding host drives. This is the crate a
//! native CLI (`simhost`) or a `wasm-bindgen` wrapper built outside this
//! workspace talks to; nothing here knows about a browser.

pub mod bridge_impl;

use abi::{BinarySource, CoreEvent, I2cError, Message, StartConfig};
use bridge_impl::{InlineBridge, NowCache, ThreadedBridge};
use kern::Schematic;
use runner::{HostCall, HostOp, HostReply, RunOutcome, Runner, RunnerEvent, SchematicBridge, SharedBuffer};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

const NUM_I2C_BUSES: usize = 4;

/// Commands the schematic thread drains: UI-facing structural messages and
/// the two kinds of guest host call (spec §5 "Runner -> Schematic is FIFO",
/// guaranteed here because both arrive over the same channel).
pub(crate) enum SchematicCmd {
    Ui(Message),
    Apply(HostOp),
    Call(HostCall, Sender<HostReply>),
}

pub(crate) fn apply_host_op(schematic: &mut Schematic, op: HostOp) {
    match op {
        HostOp::GpioConfigure { mcu, pin, mode } => schematic.gpio_configure(&mcu, pin, mode),
        HostOp::GpioSet { mcu, pin, high } => schematic.gpio_set(&mcu, pin, high),
        HostOp::PwmConfigure { mcu, pin, period_ms } => schematic.pwm_configure(&mcu, pin, period_ms),
        HostOp::PwmSetDuty { mcu, pin, duty_cycle } => schematic.pwm_set_duty(&mcu, pin, duty_cycle),
        HostOp::SpiConfigure { mcu, bus, sck, sdo, sdi, as_controller } => {
            schematic.spi_configure(&mcu, bus, sck, sdo, sdi, as_controller)
        }
        HostOp::I2cConfigure { mcu, bus, scl, sda } => schematic.i2c_configure(&mcu, bus, scl, sda),
        HostOp::Ws2812Write { mcu, pin, bytes } => schematic.ws2812_write(&mcu, pin, &bytes),
    }
}

pub(crate) fn apply_host_call(schematic: &mut Schematic, call: HostCall) -> HostReply {
    match call {
        HostCall::SpiTransferByte { mcu, bus, byte } => HostReply::SpiByte(schematic.spi_transfer(&mcu, bus, byte)),
        HostCall::I2cTransfer { mcu, bus, address, write, read_len } => {
            let (err, data) = schematic.i2c_transfer(&mcu, bus, address, &write, read_len);
            HostReply::I2c(err, data)
        }
    }
}

pub(crate) fn mirror_pin_changes(schematic: &mut Schematic, shared: &SharedBuffer, mcu_id: &str) {
    for (pin, code) in schematic.drain_mcu_pin_changes(mcu_id) {
        shared.set_pin_state(pin, code);
    }
}

fn i2c_status_code(err: I2cError) -> i32 {
    match err {
        I2cError::Success => 0,
        I2cError::NoAck => 1,
        I2cError::ArbitrationLost => 2,
        I2cError::Other => 3,
    }
}

/// Parses `config.main_part` ("`<partId>.<pinName>`", spec §6) down to the
/// MCU part id the runner's host ABI calls are scoped to - there is
/// exactly one MCU per board in every config this crate constructs.
fn mcu_id_from_main_part(main_part: &str) -> String {
    main_part.split('.').next().unwrap_or(main_part).to_string()
}

/// A running (or not-yet-started) simulation session: owns the schematic
/// thread, the optional runner thread, and the shared pin-state buffer.
/// `post` is the dependency-injected callback every `CoreEvent` flows
/// through (spec §9 "global mutable UI hooks -> dependency-injected
/// PostMessage callback").
pub struct Worker {
    cmd_tx: Sender<SchematicCmd>,
    schematic_thread: Option<JoinHandle<()>>,
    runner_thread: Option<JoinHandle<()>>,
    shared: Arc<SharedBuffer>,
    now_cache: Arc<NowCache>,
    post: Arc<dyn Fn(CoreEvent) + Send + Sync>,
}

impl Worker {
    /// Spawns the schematic thread immediately; no guest program runs
    /// until `send(Message::Start { .. })` arrives. `post` is the one
    /// callback every `CoreEvent` this session ever produces flows
    /// through, for the lifetime of the `Worker`.
    pub fn spawn(post: impl Fn(CoreEvent) + Send + Sync + 'static) -> Self {
        let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
        let shared = SharedBuffer::new(NUM_I2C_BUSES);
        let now_cache = Arc::new(NowCache::default());
        let post: Arc<dyn Fn(CoreEvent) + Send + Sync> = Arc::new(post);
        let shared_for_thread = Arc::clone(&shared);
        let now_for_thread = Arc::clone(&now_cache);
        let post_for_thread = Arc::clone(&post);
        let schematic_thread = std::thread::spawn(move || {
            schematic_loop(Schematic::new(), cmd_rx, shared_for_thread, now_for_thread, post_for_thread)
        });
        Self { cmd_tx, schematic_thread: Some(schematic_thread), runner_thread: None, shared, now_cache, post }
    }

    /// Forwards one UI message (spec §6). `Start` additionally spins up
    /// the runner thread once the schematic has the parts/wires in place.
    pub fn send(&mut self, msg: Message) {
        if let Message::Start { config, binary, .. } = &msg {
            self.start(config.clone(), binary.clone());
        }
        let _ = self.cmd_tx.send(SchematicCmd::Ui(msg));
    }

    fn start(&mut self, config: StartConfig, binary: BinarySource) {
        let post = Arc::clone(&self.post);
        post(CoreEvent::Loading);
        let wasm_bytes = match binary {
            BinarySource::Inline(bytes) => bytes,
            BinarySource::Fetch { url, .. } => {
                // Fetching a compiled binary from a remote compile service
                // is the job of an external collaborator this crate
                // doesn't implement (spec §1 "Out of scope"); the
                // embedding host is expected to resolve the fetch itself
                // and send `Inline` bytes instead.
                post(CoreEvent::Error {
                    message: format!("binary fetch not supported by this runner; resolve {url} to bytes before calling start"),
                    source: Some("compiler".to_string()),
                });
                return;
            }
        };

        let runner = match Runner::load(&wasm_bytes) {
            Ok(r) => r,
            Err(e) => {
                post(CoreEvent::Error { message: e.to_string(), source: Some("compiler".to_string()) });
                return;
            }
        };

        let bridge: Arc<dyn SchematicBridge> = Arc::new(ThreadedBridge {
            cmd_tx: self.cmd_tx.clone(),
            shared: Arc::clone(&self.shared),
            now: Arc::clone(&self.now_cache),
        });
        let shared_for_runner = Arc::clone(&self.shared);
        let mcu_id = mcu_id_from_main_part(&config.main_part);
        let runner_thread = std::thread::spawn(move || {
            post(CoreEvent::Started);
            let events_post = Arc::clone(&post);
            let on_event = Box::new(move |ev: RunnerEvent| match ev {
                RunnerEvent::Stdout(s) | RunnerEvent::Stderr(s) => events_post(CoreEvent::Stdout { data: s }),
            });
            match runner.run(mcu_id, bridge, shared_for_runner, on_event) {
                Ok(RunOutcome::Exited(code)) => post(CoreEvent::Exited { exit_code: code }),
                Ok(RunOutcome::Trapped(message)) => post(CoreEvent::Error { message, source: None }),
                Err(e) => post(CoreEvent::Error { message: e.to_string(), source: None }),
            }
        });
        self.runner_thread = Some(runner_thread);
    }

    /// Runs the guest inline on the calling thread instead of a dedicated
    /// one, for hosts without cross-thread shared-memory waits (spec §5
    /// last paragraph). Blocks until the guest exits.
    pub fn run_inline(
        schematic: Arc<Mutex<Schematic>>,
        mcu_id: String,
        wasm_bytes: &[u8],
        mut on_event: impl FnMut(RunnerEvent),
    ) -> anyhow::Result<RunOutcome> {
        let runner = Runner::load(wasm_bytes)?;
        let shared = SharedBuffer::new(NUM_I2C_BUSES);
        let bridge: Arc<dyn SchematicBridge> =
            Arc::new(InlineBridge { schematic, shared: Arc::clone(&shared), mcu_id: mcu_id.clone() });
        runner.run(mcu_id, bridge, shared, Box::new(move |e| on_event(e)))
    }

    /// Closes the command channel and waits for the schematic thread to
    /// drain it. The runner thread, if any, only exits once the guest
    /// itself does - cancellation here is "terminate the process" (spec
    /// §5); a host that needs to abort a hung guest has to drop the whole
    /// `Worker` process rather than wait on this.
    pub fn shutdown(self) {
        let Worker { cmd_tx, schematic_thread, runner_thread, .. } = self;
        drop(cmd_tx);
        if let Some(h) = schematic_thread {
            let _ = h.join();
        }
        if let Some(h) = runner_thread {
            let _ = h.join();
        }
    }
}

/// The schematic thread's main loop (spec §5 "Schematic task"): drains
/// commands FIFO, ticks animation/power decay whenever nothing is
/// pending, mirrors MCU pin-state and I2C-status changes into the shared
/// buffer, and pushes `notifyUpdate` whenever new dirty state appears
/// that the UI hasn't been told about yet.
fn schematic_loop(
    mut schematic: Schematic,
    cmd_rx: Receiver<SchematicCmd>,
    shared: Arc<SharedBuffer>,
    now_cache: Arc<NowCache>,
    post: Arc<dyn Fn(CoreEvent) + Send + Sync>,
) {
    let mut last_notified_dirty = false;
    loop {
        match cmd_rx.recv_timeout(Duration::from_millis(16)) {
            Ok(SchematicCmd::Ui(msg)) => {
                for event in schematic.apply(msg) {
                    post(event);
                }
            }
            Ok(SchematicCmd::Apply(op)) => {
                let mcu = host_op_mcu(&op).to_string();
                apply_host_op(&mut schematic, op);
                mirror_pin_changes(&mut schematic, &shared, &mcu);
                shared.end_op();
            }
            Ok(SchematicCmd::Call(call, reply_tx)) => {
                let mcu = host_call_mcu(&call).to_string();
                let bus = host_call_bus(&call);
                let reply = apply_host_call(&mut schematic, call);
                mirror_pin_changes(&mut schematic, &shared, &mcu);
                if let (Some(bus), HostReply::I2c(err, _)) = (bus, &reply) {
                    shared.set_i2c_status(bus, i2c_status_code(*err));
                }
                shared.end_op();
                let _ = reply_tx.send(reply);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return,
        }
        now_cache.store(schematic.now_ms());
        shared.set_speed(schematic.is_running());
        schematic.tick();
        let dirty = schematic.has_pending_updates();
        if dirty && !last_notified_dirty {
            post(CoreEvent::NotifyUpdate);
        }
        last_notified_dirty = dirty;
    }
}

fn host_op_mcu(op: &HostOp) -> &str {
    match op {
        HostOp::GpioConfigure { mcu, .. }
        | HostOp::GpioSet { mcu, .. }
        | HostOp::PwmConfigure { mcu, .. }
        | HostOp::PwmSetDuty { mcu, .. }
        | HostOp::SpiConfigure { mcu, .. }
        | HostOp::I2cConfigure { mcu, .. }
        | HostOp::Ws2812Write { mcu, .. } => mcu,
    }
}

fn host_call_mcu(call: &HostCall) -> &str {
    match call {
        HostCall::SpiTransferByte { mcu, .. } | HostCall::I2cTransfer { mcu, .. } => mcu,
    }
}

fn host_call_bus(call: &HostCall) -> Option<u32> {
    match call {
        HostCall::I2cTransfer { bus, .. } => Some(*bus),
        _ => None,
    }
}
