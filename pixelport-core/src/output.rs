//! Per-output serial worker.
//!
//! One blocking OS thread per configured output: serial writes block, and
//! OS-level parallelism across ports is the point. Multiple controllers
//! transmit simultaneously with no shared progress. Each worker owns its
//! port for its whole lifetime, consumes frames from its slot, applies the
//! pixel-format transform, and emits protocol frames. A write failure
//! discards the current frame and cycles the port through reconnect
//! backoff; the slot keeps draining through replacement meanwhile.

use std::io::Write;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info, trace, warn};

use crate::config::OutputConfig;
use crate::error::BridgeError;
use crate::pacing::FramePacer;
use crate::pixel::{self, PixelFormat};
use crate::protocol::{self, wled, Protocol};
use crate::slot::Slot;
use crate::stats::{bump, OutputStats};

const OPEN_RETRY_INITIAL: Duration = Duration::from_millis(250);
const OPEN_RETRY_MAX: Duration = Duration::from_secs(5);
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);
// Arduino-class devices reset when DTR toggles on open; give the MCU time
// to come back before the first frame.
const PORT_SETTLE: Duration = Duration::from_millis(100);

/// Handle to a spawned worker thread.
#[derive(Debug)]
pub struct OutputHandle {
    name: String,
    handle: thread::JoinHandle<()>,
}

impl OutputHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

/// Spawn the worker thread for one output.
pub fn spawn(
    config: OutputConfig,
    slot: Arc<Slot>,
    stats: Arc<OutputStats>,
    pacer: Option<FramePacer>,
) -> OutputHandle {
    let name = config.port.clone();
    let thread_name = format!(
        "serial-{}",
        config.port.rsplit(['/', '\\']).next().unwrap_or("out")
    );
    let worker = Worker {
        protocol: config.effective_protocol(),
        format: config.format(),
        config,
        slot,
        stats,
        pacer,
        last_seq: None,
    };
    let handle = thread::Builder::new()
        .name(thread_name)
        .spawn(move || worker.run())
        .expect("failed to spawn serial worker thread");
    OutputHandle { name, handle }
}

enum Pump {
    /// Slot returned the shutdown sentinel.
    Shutdown,
    /// The port failed mid-write; reopen it.
    PortError,
}

struct Worker {
    config: OutputConfig,
    protocol: Protocol,
    format: PixelFormat,
    slot: Arc<Slot>,
    stats: Arc<OutputStats>,
    pacer: Option<FramePacer>,
    last_seq: Option<u64>,
}

impl Worker {
    fn run(mut self) {
        loop {
            let Some(mut port) = self.open_with_backoff() else {
                // Shut down while disconnected; nothing to flush.
                return;
            };
            info!(
                output = %self.config.port,
                protocol = %self.protocol,
                baud = self.config.baud_rate,
                leds = self.config.led_count,
                "serial output ready"
            );
            match self.pump(&mut port) {
                Pump::Shutdown => {
                    self.blackout(&mut port);
                    return;
                }
                Pump::PortError => continue,
            }
        }
    }

    /// Open the port, retrying with exponential backoff until it opens or
    /// the slot closes. Returns `None` on shutdown.
    fn open_with_backoff(&self) -> Option<Box<dyn SerialPort>> {
        let mut delay = OPEN_RETRY_INITIAL;
        loop {
            if self.slot.is_closed() {
                return None;
            }
            match self.open_port() {
                Ok(port) => return Some(port),
                Err(e) => {
                    self.stats.record_error(&e);
                    warn!(
                        output = %self.config.port,
                        error = %e,
                        retry_in = ?delay,
                        "failed to open serial port"
                    );
                }
            }
            // Sleep in slices so shutdown is not held up by the backoff.
            let until = Instant::now() + delay;
            while Instant::now() < until {
                if self.slot.is_closed() {
                    return None;
                }
                thread::sleep(Duration::from_millis(50));
            }
            delay = (delay * 2).min(OPEN_RETRY_MAX);
        }
    }

    fn open_port(&self) -> Result<Box<dyn SerialPort>, BridgeError> {
        if self.protocol.negotiates_baud() {
            self.open_wled()
        } else {
            self.open_at(self.config.baud_rate)
        }
    }

    /// Open the device at `baud` with the line settings every supported
    /// controller expects: 8N1, no flow control.
    fn open_at(&self, baud: u32) -> Result<Box<dyn SerialPort>, BridgeError> {
        let mut port = serialport::new(&self.config.port, baud)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()?;

        // Some devices stay silent until both lines are asserted.
        if let Err(e) = port.write_data_terminal_ready(true) {
            warn!(output = %self.config.port, error = %e, "could not set DTR");
        }
        if let Err(e) = port.write_request_to_send(true) {
            warn!(output = %self.config.port, error = %e, "could not set RTS");
        }
        thread::sleep(PORT_SETTLE);
        Ok(port)
    }

    /// WLED bring-up: probe at the handshake baud, switch the device to
    /// the data baud, reopen there. Probe failure downgrades to
    /// best-effort AdaLight at the handshake baud, never fatal.
    fn open_wled(&self) -> Result<Box<dyn SerialPort>, BridgeError> {
        let mut phase = wled::LinkPhase::Opening;
        let handshake = self.config.handshake_baud();

        let mut port = self.open_at(handshake)?;
        phase.begin_probe()?;

        // Short per-read timeout; the probe deadline bounds the exchange.
        port.set_timeout(Duration::from_millis(50))?;
        let confirmed = match wled::probe(&mut port, wled::PROBE_TIMEOUT) {
            Ok(confirmed) => confirmed,
            Err(e) => {
                phase.fail();
                self.stats.record_error(&e);
                return Err(BridgeError::Connection(e));
            }
        };

        if !confirmed {
            self.stats
                .record_error("WLED probe unanswered; running AdaLight at handshake baud");
            warn!(
                output = %self.config.port,
                baud = handshake,
                "device did not identify as WLED; continuing as plain AdaLight"
            );
            phase.start_running()?;
            port.set_timeout(WRITE_TIMEOUT)?;
            return Ok(port);
        }

        debug!(output = %self.config.port, "WLED confirmed via JSON probe");

        if self.config.baud_rate != handshake {
            phase.begin_switch()?;
            let cmd = wled::send_baud_command(&mut port, self.config.baud_rate)?;
            debug!(
                output = %self.config.port,
                command = %format_args!("{cmd:#04X}"),
                target = self.config.baud_rate,
                "baud-change command sent"
            );
            // The device answers "Baud is now <N>" and re-inits its UART;
            // reopen on our side once it has settled.
            thread::sleep(wled::SWITCH_SETTLE);
            drop(port);
            port = self.open_at(self.config.baud_rate)?;
        }

        phase.start_running()?;
        port.set_timeout(WRITE_TIMEOUT)?;
        Ok(port)
    }

    /// Consume frames until shutdown or a port error.
    fn pump(&mut self, port: &mut Box<dyn SerialPort>) -> Pump {
        loop {
            let Some(frame) = self.slot.take() else {
                return Pump::Shutdown;
            };

            if let Some(last) = self.last_seq {
                debug_assert!(frame.seq > last, "slot handed out a stale frame");
            }
            self.last_seq = Some(frame.seq);

            match self.write_frame(port, frame.pixels) {
                Ok(()) => {
                    bump(&self.stats.frames_written);
                    if let Some(pacer) = self.pacer.as_mut() {
                        pacer.pace();
                    }
                }
                Err(e) => {
                    // Frame discarded; never retried.
                    self.stats.record_error(&e);
                    warn!(
                        output = %self.config.port,
                        error = %e,
                        "serial write failed; reopening port"
                    );
                    return Pump::PortError;
                }
            }
        }
    }

    fn write_frame(
        &self,
        port: &mut Box<dyn SerialPort>,
        pixels: Vec<u8>,
    ) -> std::io::Result<()> {
        let wire = pixel::transform(pixels, self.format);
        let frame = protocol::encode_frame(self.protocol, &wire, self.format.stride());

        if tracing::enabled!(tracing::Level::TRACE) {
            trace!(
                output = %self.config.port,
                bytes = frame.len(),
                head = %hex_head(&frame),
                "serial frame"
            );
        }

        let started = Instant::now();
        port.write_all(&frame)?;
        port.flush()?;
        self.stats.last_write_micros.store(
            started.elapsed().as_micros() as u64,
            std::sync::atomic::Ordering::Relaxed,
        );
        Ok(())
    }

    /// Best-effort black frame so the installation goes dark instead of
    /// freezing on the last image.
    fn blackout(&self, port: &mut Box<dyn SerialPort>) {
        let black = vec![0u8; self.config.led_count * 3];
        if self.write_frame(port, black).is_ok() {
            debug!(output = %self.config.port, "blackout frame sent");
        }
    }
}

/// First bytes of a frame as hex, for trace logs.
fn hex_head(frame: &[u8]) -> String {
    const HEAD: usize = 32;
    let shown = &frame[..frame.len().min(HEAD)];
    let mut out = String::with_capacity(shown.len() * 3 + 1);
    for byte in shown {
        out.push_str(&format!("{byte:02x} "));
    }
    if frame.len() > HEAD {
        out.push('…');
    } else {
        out.pop();
    }
    out
}
