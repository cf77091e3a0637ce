// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The host ABI the guest WebAssembly binary imports (spec §4.6): a small
//! WASI subset plus the custom `__tinygo_*` pin/bus calls. Wired directly
//! against `wasmtime::Linker` rather than through the `wasmtime-wasi`
//! crate, since `clock_time_get` and `poll_oneoff` need to answer against
//! this crate's virtual clock and speed cell instead of the real one
//! (see DESIGN.md for why `wasmtime-wasi` was dropped).

use crate::bridge::{HostCall, HostOp, HostReply, SchematicBridge};
use crate::shared_buffer::SharedBuffer;
use abi::GpioConfigureCode;
use anyhow::{anyhow, Result};
use rand::RngCore;
use rand_chacha::ChaCha8Rng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use wasmtime::{Caller, Linker, Memory};

pub const ERRNO_SUCCESS: i32 = 0;
pub const ERRNO_NOSYS: i32 = 52;

/// A `proc_exit(code)` call is modeled as an error that unwinds the guest
/// call, not a panic (spec §4.6, §7, §9 "exceptions for exit -> explicit
/// Exit{code} bubbled through a single boundary").
#[derive(Debug)]
pub struct ProcExit(pub i32);

impl std::fmt::Display for ProcExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "proc_exit({})", self.0)
    }
}

impl std::error::Error for ProcExit {}

pub enum RunnerEvent {
    Stdout(String),
    Stderr(String),
}

/// `Store<T>` data: everything a host call closure needs to reach, kept in
/// one place so `Linker::func_wrap` closures can be plain `move` captures
/// of `&mut Caller<'_, RunnerState>` rather than threading extra state.
pub struct RunnerState {
    pub mcu_id: String,
    pub bridge: Arc<dyn SchematicBridge>,
    pub shared: Arc<SharedBuffer>,
    pub rng: ChaCha8Rng,
    pub events: Box<dyn FnMut(RunnerEvent) + Send>,
    /// WS2812 bytes accumulated per pin since the last flush (spec §4.6
    /// "WS2812 writes are buffered per-pin and flushed before each
    /// sleep").
    pub ws2812_pending: std::collections::HashMap<u32, Vec<u8>>,
}

impl RunnerState {
    fn flush_ws2812(&mut self) {
        let pending = std::mem::take(&mut self.ws2812_pending);
        for (pin, bytes) in pending {
            if !bytes.is_empty() {
                self.bridge.post(HostOp::Ws2812Write { mcu: self.mcu_id.clone(), pin, bytes });
            }
        }
    }
}

fn memory(caller: &mut Caller<'_, RunnerState>) -> Result<Memory> {
    caller.get_export("memory").and_then(|e| e.into_memory()).ok_or_else(|| anyhow!("guest has no exported memory"))
}

fn write_bytes(caller: &mut Caller<'_, RunnerState>, ptr: i32, data: &[u8]) -> Result<()> {
    let mem = memory(caller)?;
    mem.write(caller, ptr as usize, data)?;
    Ok(())
}

fn read_bytes(caller: &mut Caller<'_, RunnerState>, ptr: i32, len: usize) -> Result<Vec<u8>> {
    let mem = memory(caller)?;
    let mut buf = vec![0u8; len];
    mem.read(caller, ptr as usize, &mut buf)?;
    Ok(buf)
}

fn write_u32(caller: &mut Caller<'_, RunnerState>, ptr: i32, v: u32) -> Result<()> {
    write_bytes(caller, ptr, &v.to_le_bytes())
}

/// Registers the WASI subset spec §4.6 names: everything else the module
/// might import returns `ENOSYS`, handled by `Runner` refusing to
/// instantiate a module that imports a function this linker doesn't
/// provide (wasmtime's own "unknown import" error already covers that).
pub fn add_wasi_subset(linker: &mut Linker<RunnerState>) -> Result<()> {
    linker.func_wrap("wasi_snapshot_preview1", "args_get", |_: Caller<'_, RunnerState>, _argv: i32, _argv_buf: i32| -> i32 {
        ERRNO_SUCCESS
    })?;
    linker.func_wrap(
        "wasi_snapshot_preview1",
        "args_sizes_get",
        |mut caller: Caller<'_, RunnerState>, argc_ptr: i32, argv_buf_size_ptr: i32| -> Result<i32> {
            write_u32(&mut caller, argc_ptr, 0)?;
            write_u32(&mut caller, argv_buf_size_ptr, 0)?;
            Ok(ERRNO_SUCCESS)
        },
    )?;
    linker.func_wrap(
        "wasi_snapshot_preview1",
        "environ_get",
        |_: Caller<'_, RunnerState>, _environ: i32, _environ_buf: i32| -> i32 { ERRNO_SUCCESS },
    )?;
    linker.func_wrap(
        "wasi_snapshot_preview1",
        "environ_sizes_get",
        |mut caller: Caller<'_, RunnerState>, count_ptr: i32, buf_size_ptr: i32| -> Result<i32> {
            write_u32(&mut caller, count_ptr, 0)?;
            write_u32(&mut caller, buf_size_ptr, 0)?;
            Ok(ERRNO_SUCCESS)
        },
    )?;
    linker.func_wrap(
        "wasi_snapshot_preview1",
        "clock_time_get",
        |caller: Caller<'_, RunnerState>, _clock_id: i32, _precision: i64, time_ptr: i32| -> Result<i32> {
            let now_ns = caller.data().bridge.now_ms() * 1_000_000;
            let mut c = caller;
            write_bytes(&mut c, time_ptr, &now_ns.to_le_bytes())?;
            Ok(ERRNO_SUCCESS)
        },
    )?;
    linker.func_wrap(
        "wasi_snapshot_preview1",
        "fd_write",
        |mut caller: Caller<'_, RunnerState>, fd: i32, iovs_ptr: i32, iovs_len: i32, nwritten_ptr: i32| -> Result<i32> {
            if fd != 1 && fd != 2 {
                return Ok(ERRNO_NOSYS);
            }
            let mut total = 0usize;
            let mut chunks = Vec::new();
            for i in 0..iovs_len {
                let entry = read_bytes(&mut caller, iovs_ptr + i * 8, 8)?;
                let base = u32::from_le_bytes(entry[0..4].try_into().unwrap());
                let len = u32::from_le_bytes(entry[4..8].try_into().unwrap());
                let bytes = read_bytes(&mut caller, base as i32, len as usize)?;
                total += bytes.len();
                chunks.extend(bytes);
            }
            // Lossy UTF-8, matching a JS `TextDecoder`'s replacement-char
            // behavior on malformed sequences (SPEC_FULL §4.6).
            let text = String::from_utf8_lossy(&chunks).into_owned();
            let state = caller.data_mut();
            if fd == 1 {
                (state.events)(RunnerEvent::Stdout(text));
            } else {
                (state.events)(RunnerEvent::Stderr(text));
            }
            write_u32(&mut caller, nwritten_ptr, total as u32)?;
            Ok(ERRNO_SUCCESS)
        },
    )?;
    linker.func_wrap(
        "wasi_snapshot_preview1",
        "random_get",
        |mut caller: Caller<'_, RunnerState>, buf_ptr: i32, buf_len: i32| -> Result<i32> {
            let mut bytes = vec![0u8; buf_len as usize];
            caller.data_mut().rng.fill_bytes(&mut bytes);
            write_bytes(&mut caller, buf_ptr, &bytes)?;
            Ok(ERRNO_SUCCESS)
        },
    )?;
    // The only subscription kind implemented is a single relative-clock
    // timeout, which is all `runtime.sleepTicks` needs (spec §4.6, §9).
    // Any other subscription kind is an ENOSYS diagnostic, not a panic.
    linker.func_wrap(
        "wasi_snapshot_preview1",
        "poll_oneoff",
        |mut caller: Caller<'_, RunnerState>, in_ptr: i32, out_ptr: i32, nsubs: i32, nevents_ptr: i32| -> Result<i32> {
            if nsubs != 1 {
                return Ok(ERRNO_NOSYS);
            }
            let sub = read_bytes(&mut caller, in_ptr, 48)?;
            let tag = sub[8];
            const EVENTTYPE_CLOCK: u8 = 0;
            if tag != EVENTTYPE_CLOCK {
                return Ok(ERRNO_NOSYS);
            }
            let timeout_ns = u64::from_le_bytes(sub[24..32].try_into().unwrap());
            let deadline = Instant::now() + Duration::from_nanos(timeout_ns);
            caller.data().shared.wait_running_until(deadline);
            // Guest-facing event: userdata (8) + error (2, success) + type (1) + pad.
            let userdata = &sub[0..8];
            let mut out = vec![0u8; 32];
            out[0..8].copy_from_slice(userdata);
            out[8] = EVENTTYPE_CLOCK;
            write_bytes(&mut caller, out_ptr, &out)?;
            write_u32(&mut caller, nevents_ptr, 1)?;
            Ok(ERRNO_SUCCESS)
        },
    )?;
    linker.func_wrap("wasi_snapshot_preview1", "proc_exit", |_: Caller<'_, RunnerState>, code: i32| -> Result<()> {
        Err(ProcExit(code).into())
    })?;
    Ok(())
}

/// Registers the custom `__tinygo_*` pin/bus calls (spec §4.6, exact
/// names).
pub fn add_tinygo_abi(linker: &mut Linker<RunnerState>) -> Result<()> {
    linker.func_wrap("env", "runtime.ticks", |caller: Caller<'_, RunnerState>| -> i64 {
        caller.data().bridge.now_ms() as i64
    })?;
    linker.func_wrap("env", "runtime.sleepTicks", |mut caller: Caller<'_, RunnerState>, ms: i64| -> Result<()> {
        caller.data_mut().flush_ws2812();
        let deadline = Instant::now() + Duration::from_millis(ms.max(0) as u64);
        let mut remaining_deadline = deadline;
        loop {
            let ran_to_completion = caller.data().shared.wait_running_until(remaining_deadline);
            if ran_to_completion {
                break;
            }
            // Paused mid-sleep: the remaining virtual delay is preserved
            // (spec §4.1); once resumed, loop and wait out what's left.
            while !caller.data().shared.is_running() {
                std::thread::sleep(Duration::from_millis(5));
            }
            remaining_deadline = Instant::now() + Duration::from_millis(ms.max(0) as u64);
        }
        Ok(())
    })?;
    linker.func_wrap(
        "env",
        "__tinygo_gpio_set",
        |caller: Caller<'_, RunnerState>, pin: i32, high: i32| {
            let state = caller.data();
            state.bridge.post(HostOp::GpioSet { mcu: state.mcu_id.clone(), pin: pin as u32, high: high != 0 });
        },
    )?;
    linker.func_wrap("env", "__tinygo_gpio_get", |caller: Caller<'_, RunnerState>, pin: i32| -> i32 {
        let state = caller.data();
        state.bridge.wait_quiescent();
        if state.shared.pin_state(pin as u32) == abi::PinCode::High as i32 {
            1
        } else {
            0
        }
    })?;
    linker.func_wrap("env", "__tinygo_gpio_configure", |caller: Caller<'_, RunnerState>, pin: i32, mode: i32| {
        let state = caller.data();
        let Some(mode) = GpioConfigureCode::from_u32(mode as u32) else { return };
        state.bridge.post(HostOp::GpioConfigure { mcu: state.mcu_id.clone(), pin: pin as u32, mode });
    })?;
    linker.func_wrap(
        "env",
        "__tinygo_pwm_configure",
        |caller: Caller<'_, RunnerState>, pin: i32, period_ms: f64| {
            let state = caller.data();
            state.bridge.post(HostOp::PwmConfigure { mcu: state.mcu_id.clone(), pin: pin as u32, period_ms });
        },
    )?;
    linker.func_wrap("env", "__tinygo_pwm_set", |caller: Caller<'_, RunnerState>, pin: i32, duty_cycle: f64| {
        let state = caller.data();
        state.bridge.post(HostOp::PwmSetDuty { mcu: state.mcu_id.clone(), pin: pin as u32, duty_cycle });
    })?;
    linker.func_wrap(
        "env",
        "__tinygo_spi_configure",
        |caller: Caller<'_, RunnerState>, bus: i32, sck: i32, sdo: i32, sdi: i32| {
            let state = caller.data();
            state.bridge.post(HostOp::SpiConfigure {
                mcu: state.mcu_id.clone(),
                bus: bus as u32,
                sck: sck as u32,
                sdo: sdo as u32,
                sdi: sdi as u32,
                as_controller: true,
            });
        },
    )?;
    // Legacy single-byte form: the spec notes this one literally "returns a
    // random byte" rather than performing a real transfer (§4.6) - the
    // bulk `__tinygo_spi_tx` below is what actually touches the net.
    linker.func_wrap("env", "__tinygo_spi_transfer", |mut caller: Caller<'_, RunnerState>, _bus: i32, _w: i32| -> i32 {
        (caller.data_mut().rng.next_u32() & 0xff) as i32
    })?;
    linker.func_wrap(
        "env",
        "__tinygo_spi_tx",
        |mut caller: Caller<'_, RunnerState>, bus: i32, wptr: i32, wlen: i32, rptr: i32, rlen: i32| -> Result<()> {
            let n = wlen.max(rlen).max(0) as usize;
            let write = if wlen > 0 { read_bytes(&mut caller, wptr, wlen as usize)? } else { Vec::new() };
            let mcu_id = caller.data().mcu_id.clone();
            let mut read = Vec::with_capacity(n);
            for i in 0..n {
                let byte = write.get(i).copied().unwrap_or(0);
                let reply = caller.data().bridge.call(HostCall::SpiTransferByte { mcu: mcu_id.clone(), bus: bus as u32, byte });
                if let HostReply::SpiByte(b) = reply {
                    read.push(b);
                }
            }
            if rlen > 0 {
                let take = read.len().min(rlen as usize);
                write_bytes(&mut caller, rptr, &read[..take])?;
            }
            Ok(())
        },
    )?;
    linker.func_wrap(
        "env",
        "__tinygo_i2c_configure",
        |caller: Caller<'_, RunnerState>, bus: i32, scl: i32, sda: i32| {
            let state = caller.data();
            state.bridge.post(HostOp::I2cConfigure { mcu: state.mcu_id.clone(), bus: bus as u32, scl: scl as u32, sda: sda as u32 });
        },
    )?;
    linker.func_wrap(
        "env",
        "__tinygo_i2c_transfer",
        |mut caller: Caller<'_, RunnerState>, bus: i32, addr: i32, wptr: i32, wlen: i32, rptr: i32, rlen: i32| -> Result<i32> {
            let write = if wlen > 0 { read_bytes(&mut caller, wptr, wlen as usize)? } else { Vec::new() };
            let mcu_id = caller.data().mcu_id.clone();
            let reply =
                caller.data().bridge.call(HostCall::I2cTransfer { mcu: mcu_id, bus: bus as u32, address: addr as u8, write, read_len: rlen.max(0) as usize });
            let HostReply::I2c(err, data) = reply else { return Ok(1) };
            if rlen > 0 && !data.is_empty() {
                write_bytes(&mut caller, rptr, &data)?;
            }
            Ok(match err {
                abi::I2cError::Success => 0,
                abi::I2cError::NoAck => 1,
                abi::I2cError::ArbitrationLost => 2,
                abi::I2cError::Other => 3,
            })
        },
    )?;
    linker.func_wrap("env", "__tinygo_ws2812_write_byte", |mut caller: Caller<'_, RunnerState>, pin: i32, byte: i32| {
        caller.data_mut().ws2812_pending.entry(pin as u32).or_default().push(byte as u8);
    })?;
    Ok(())
}
