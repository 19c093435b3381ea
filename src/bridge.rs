//! PHC bus bridge.
//!
//! The [`Bridge`] owns one serial line and everything needed to drive the
//! modules on it:
//!
//! - outbound commands go into a [`RetryQueue`] and are written until the
//!   module reports the requested output state or the attempts run out,
//! - inbound bytes are reassembled into frames, output reports update the
//!   [`OutputStateCache`] and EM input frames are acknowledged and forwarded
//!   as [`InputEvent`]s,
//! - configuration requests from modules that restarted are answered.
//!
//! Two worker threads run per bridge opened with [`Bridge::open`]: the
//! serial reader and the retry loop. Both share the state behind an `Arc`.
//!
//! # Example
//!
//! ```no_run
//! use phc_serial::{Bridge, BridgeConfig, ModuleConfig, ModuleType, PhcCommand};
//!
//! let config = BridgeConfig::new("/dev/ttyUSB0")
//!     .with_module(ModuleConfig::new(ModuleType::Em, 0))
//!     .with_module(ModuleConfig::new(ModuleType::Am, 3));
//!
//! let (bridge, events) = Bridge::open(config)?;
//! bridge.send(ModuleType::Am, 3, 2, PhcCommand::On)?;
//!
//! for event in events.iter() {
//!     println!("EM {} input {} -> {}", event.module, event.channel, event.state);
//! }
//! # Ok::<(), phc_serial::PhcError>(())
//! ```

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use log::{debug, error, info, trace, warn};

use crate::command::{
    am_config, em_acknowledge, em_config, encode_command, module_poll, por_broadcast, validate,
    PhcCommand, CONFIG_REQUEST, DEFAULT_SHUTTER_TIME, FN_ON, POLL, STATUS_REPORT,
};
use crate::config::BridgeConfig;
use crate::error::{PhcError, Result};
use crate::frame::{Frame, FrameDecoder};
use crate::module::{
    dip_of, family_of, ModuleRegistry, ModuleType, FAMILY_AM, FAMILY_EM, FAMILY_SYSTEM,
    MAX_DIP_ADDRESS,
};
use crate::queue::{PendingCommand, RetryQueue};
use crate::state::{InputStates, OutputStateCache, ToggleMap};
use crate::transport::{FrameWriter, SerialReader, SerialTransport};
use crate::utils::{format_frame, format_frame_binary};

/// Size of the serial read buffer.
const READ_BUFFER_SIZE: usize = 256;

/// Why the bridge went offline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineReason {
    /// Writing to the serial port failed.
    CommunicationError(String),
    /// The bridge was shut down.
    Shutdown,
}

/// Health of the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeStatus {
    /// Created, bus not initialized yet.
    Initializing,
    /// Bus initialized, last write succeeded.
    Online,
    /// Not usable.
    Offline(OfflineReason),
}

/// Input change reported by an EM module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    /// DIP address of the EM module.
    pub module: u8,
    /// Input channel (0-15).
    pub channel: u8,
    /// `true` when the input switched on.
    pub state: bool,
    /// Raw event byte as sent by the module.
    pub code: u8,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Shared {
    config: BridgeConfig,
    writer: Mutex<Box<dyn FrameWriter>>,
    queue: RetryQueue,
    outputs: Mutex<OutputStateCache>,
    toggles: Mutex<ToggleMap>,
    inputs: Mutex<InputStates>,
    modules: RwLock<ModuleRegistry>,
    shutter_times: Mutex<HashMap<(u8, u8), u16>>,
    decoder: Mutex<FrameDecoder>,
    last_received_crc: Mutex<Option<u16>>,
    status: Mutex<BridgeStatus>,
    events: Sender<InputEvent>,
    running: AtomicBool,
}

impl Shared {
    fn set_status(&self, status: BridgeStatus) {
        let mut current = lock(&self.status);
        if *current != status {
            debug!("Bridge '{}' status {:?} -> {:?}", self.config.port, *current, status);
            *current = status;
        }
    }

    fn write(&self, frame: &Frame) -> io::Result<()> {
        let bytes = frame.to_bytes();
        debug!("send: {}", format_frame_binary(&bytes));

        let result = lock(&self.writer).write_frame(&bytes);
        match &result {
            Ok(()) => {
                let mut status = lock(&self.status);
                if matches!(*status, BridgeStatus::Offline(OfflineReason::CommunicationError(_))) {
                    info!("Communication on '{}' restored", self.config.port);
                    *status = BridgeStatus::Online;
                }
            }
            Err(e) => {
                warn!(
                    "Error writing '{}' to serial port '{}': {}",
                    format_frame(&bytes),
                    self.config.port,
                    e
                );
                self.set_status(BridgeStatus::Offline(OfflineReason::CommunicationError(
                    format!("Error writing '{}' to serial port: {}", format_frame(&bytes), e),
                )));
            }
        }
        result
    }

    fn write_repeated(&self, frame: &Frame, times: u32) -> io::Result<()> {
        for _ in 0..times {
            self.write(frame)?;
        }
        Ok(())
    }

    fn shutter_time(&self, dip: u8, channel: u8) -> u16 {
        lock(&self.shutter_times)
            .get(&(dip, channel))
            .copied()
            .unwrap_or(DEFAULT_SHUTTER_TIME)
    }

    fn enqueue(
        &self,
        module_type: ModuleType,
        dip: u8,
        channel: u8,
        command: PhcCommand,
        at: Instant,
    ) -> Result<()> {
        validate(module_type, dip, channel, command)?;

        let mut pending = PendingCommand::new(module_type, dip, channel, command)
            .with_shutter_time(self.shutter_time(dip, channel));
        if module_type == ModuleType::Jrm {
            // shutter modules never report their state, write once
            pending.attempts = self.config.retry_count.saturating_sub(1);
        }

        debug!("queue command: {} {} channel {} {}", module_type, dip, channel, command);
        self.queue.push(at, pending);
        Ok(())
    }

    fn process_due(&self, now: Instant) {
        for pending in self.queue.pop_due(now) {
            self.dispatch(pending, now);
        }
    }

    fn dispatch(&self, mut pending: PendingCommand, now: Instant) {
        let confirmed = pending.command.expected_output().is_some_and(|expected| {
            lock(&self.outputs).is_set(pending.module_type, pending.dip, pending.channel)
                == expected
        });
        if confirmed {
            debug!(
                "{} {} channel {} confirmed {} after {} attempts",
                pending.module_type, pending.dip, pending.channel, pending.command, pending.attempts
            );
            return;
        }

        if pending.attempts >= self.config.retry_count {
            if pending.module_type != ModuleType::Jrm {
                warn!(
                    "No acknowledge from {} module {} for {} on channel {} after {} attempts",
                    pending.module_type,
                    pending.dip,
                    pending.command,
                    pending.channel,
                    pending.attempts
                );
            }
            return;
        }

        let address = match pending.bus_address() {
            Ok(address) => address,
            Err(e) => {
                warn!("Dropping command for {} {}: {}", pending.module_type, pending.dip, e);
                return;
            }
        };
        let toggle = lock(&self.toggles).next(address, pending.channel);
        let frame = match encode_command(
            pending.module_type,
            pending.dip,
            pending.channel,
            pending.command,
            pending.shutter_time,
            toggle,
        ) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping command for {} {}: {}", pending.module_type, pending.dip, e);
                return;
            }
        };

        pending.attempts += 1;
        // failures are reported through the bridge status
        let _ = self.write(&frame);
        self.queue.push(now + self.config.retry_interval, pending);
    }

    fn handle_incoming(&self, data: &[u8]) {
        trace!("received {} bytes: {}", data.len(), format_frame(data));

        let frames = {
            let modules = self.modules.read().unwrap_or_else(PoisonError::into_inner);
            lock(&self.decoder).feed(data, &modules)
        };
        for frame in frames {
            self.handle_frame(&frame);
        }
    }

    fn handle_frame(&self, frame: &Frame) {
        debug!("received: {}", format_frame_binary(&frame.to_bytes()));

        let family = family_of(frame.address);
        if family == FAMILY_SYSTEM {
            return;
        }
        let Some(&first) = frame.payload.first() else {
            return;
        };

        match first {
            STATUS_REPORT => {
                if frame.payload.len() != 2 {
                    return;
                }
                let module_type = match family {
                    FAMILY_AM => ModuleType::Am,
                    FAMILY_EM => ModuleType::Em,
                    _ => return,
                };
                lock(&self.outputs).set(module_type, frame.address, frame.payload[1]);
            }
            CONFIG_REQUEST => {
                let reply = match family {
                    FAMILY_EM => em_config(frame.address),
                    FAMILY_AM => am_config(frame.address),
                    _ => return,
                };
                info!("Configuring module 0x{:02X}", frame.address);
                let _ = self.write(&reply);
            }
            POLL => {}
            _ if family == FAMILY_EM => self.handle_input(frame),
            _ => {}
        }
    }

    fn handle_input(&self, frame: &Frame) {
        let _ = self.write_repeated(
            &em_acknowledge(frame.address, frame.toggle),
            self.config.ack_repeats,
        );

        let crc = frame.crc();
        {
            let mut last = lock(&self.last_received_crc);
            if *last == Some(crc) {
                debug!("repeated input from 0x{:02X}, acknowledge resent", frame.address);
                return;
            }
            *last = Some(crc);
        }

        let code = frame.payload[0];
        let event = InputEvent {
            module: dip_of(frame.address),
            channel: (code >> 4) & 0x0F,
            state: code & 0x0F == FN_ON,
            code,
        };

        if !lock(&self.inputs).update(event.module, event.channel, event.state) {
            trace!("input {:?} unchanged", event);
            return;
        }
        debug!("EM {} input {}: {}", event.module, event.channel, event.state);
        if self.events.send(event).is_err() {
            trace!("no event receiver for {:?}", event);
        }
    }

    fn run_retry_loop(&self) {
        debug!("Retry loop on '{}' started", self.config.port);
        while self.queue.wait(self.config.idle_wait) {
            self.process_due(Instant::now());
        }
        debug!("Retry loop on '{}' stopped", self.config.port);
    }

    fn run_reader(&self, mut reader: SerialReader) {
        let mut buffer = [0u8; READ_BUFFER_SIZE];
        while self.running.load(Ordering::Acquire) {
            match reader.read(&mut buffer) {
                Ok(0) => {}
                Ok(n) => self.handle_incoming(&buffer[..n]),
                Err(e) => {
                    warn!("Error reading serial port '{}': {}", self.config.port, e);
                    thread::sleep(self.config.read_timeout);
                }
            }
        }
        debug!("Reader on '{}' stopped", self.config.port);
    }
}

/// Protocol engine for one PHC bus.
pub struct Bridge {
    shared: Arc<Shared>,
    threads: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Creates a bridge writing to `writer`, with the configured modules
    /// registered. No thread is started.
    ///
    /// Returns the receiver of EM input events alongside the bridge.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::InvalidParameter` if a configured module address
    /// exceeds 31 or shutter times are set on channels a JRM module does not
    /// have.
    pub fn new(
        config: BridgeConfig,
        writer: impl FrameWriter + 'static,
    ) -> Result<(Self, Receiver<InputEvent>)> {
        let mut modules = ModuleRegistry::new();
        let mut shutter_times = HashMap::new();
        for module in &config.modules {
            modules.register(module.module_type, module.address)?;
            if module.shutter_times.is_empty() {
                continue;
            }
            if module.module_type != ModuleType::Jrm {
                return Err(PhcError::invalid_parameter(
                    "shutter_times",
                    format!("{} modules have no shutter channels", module.module_type),
                ));
            }
            for (index, &tenths) in module.shutter_times.iter().enumerate() {
                let channel = u8::try_from(index).map_err(|_| {
                    PhcError::invalid_parameter("shutter_times", "too many channels")
                })?;
                validate(ModuleType::Jrm, module.address, channel, PhcCommand::Stop)?;
                shutter_times.insert((module.address, channel), tenths);
            }
        }

        let (events, receiver) = mpsc::channel();
        let shared = Shared {
            config,
            writer: Mutex::new(Box::new(writer)),
            queue: RetryQueue::new(),
            outputs: Mutex::new(OutputStateCache::new()),
            toggles: Mutex::new(ToggleMap::new()),
            inputs: Mutex::new(InputStates::new()),
            modules: RwLock::new(modules),
            shutter_times: Mutex::new(shutter_times),
            decoder: Mutex::new(FrameDecoder::new()),
            last_received_crc: Mutex::new(None),
            status: Mutex::new(BridgeStatus::Initializing),
            events,
            running: AtomicBool::new(true),
        };

        Ok((
            Self {
                shared: Arc::new(shared),
                threads: Vec::new(),
            },
            receiver,
        ))
    }

    /// Opens the configured serial port and starts the bridge.
    ///
    /// This spawns the reader, initializes the bus and spawns the retry loop.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::PortNotFound` or `PhcError::Serial` if the port
    /// cannot be used, and `PhcError::Io` if the bus initialization fails.
    pub fn open(config: BridgeConfig) -> Result<(Self, Receiver<InputEvent>)> {
        let transport = SerialTransport::open(&config).inspect_err(|e| {
            error!("Could not open serial port '{}': {}", config.port, e);
        })?;
        let (writer, reader) = transport.split()?;

        let (mut bridge, events) = Self::new(config, writer)?;
        bridge.spawn_reader(reader)?;
        bridge.initialize()?;
        bridge.spawn_retry_loop()?;
        Ok((bridge, events))
    }

    /// Bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Current health.
    pub fn status(&self) -> BridgeStatus {
        lock(&self.shared.status).clone()
    }

    /// Registers a module so its frames are decoded. Returns its bus address.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::InvalidParameter` if `dip` exceeds 31.
    pub fn add_module(&self, module_type: ModuleType, dip: u8) -> Result<u8> {
        let address = self
            .shared
            .modules
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(module_type, dip)?;
        info!("Registered {} module {} at 0x{:02X}", module_type, dip, address);
        Ok(address)
    }

    /// Returns whether frames from `address` are decoded.
    pub fn is_registered(&self, address: u8) -> bool {
        self.shared
            .modules
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
    }

    /// Sets the run time of a shutter channel in tenths of a second.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::InvalidParameter` for an out-of-range address or
    /// channel.
    pub fn set_shutter_time(&self, dip: u8, channel: u8, tenths: u16) -> Result<()> {
        validate(ModuleType::Jrm, dip, channel, PhcCommand::Stop)?;
        lock(&self.shared.shutter_times).insert((dip, channel), tenths);
        Ok(())
    }

    /// Resets all modules and polls every EM address.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::Io` if a write fails; the status is then offline.
    pub fn initialize(&self) -> Result<()> {
        info!("Initializing PHC bus on '{}'", self.shared.config.port);
        self.shared
            .write_repeated(&por_broadcast(), self.shared.config.por_repeats)?;
        for address in 0..=MAX_DIP_ADDRESS {
            self.shared.write(&module_poll(address))?;
        }
        self.shared.set_status(BridgeStatus::Online);
        Ok(())
    }

    /// Queues a command for `channel` of the module at DIP address `dip`.
    ///
    /// The command is written by the retry loop until the module reports
    /// the requested state, up to `retry_count` times. Shutter commands are
    /// written once.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::InvalidParameter` if the address, channel or command
    /// does not fit the module type and `PhcError::UnsupportedModule` for
    /// DIM modules.
    pub fn send(
        &self,
        module_type: ModuleType,
        dip: u8,
        channel: u8,
        command: PhcCommand,
    ) -> Result<()> {
        self.shared
            .enqueue(module_type, dip, channel, command, Instant::now())
    }

    /// Feeds bytes read from the serial port.
    pub fn handle_incoming(&self, data: &[u8]) {
        self.shared.handle_incoming(data);
    }

    /// Runs one pass of the retry loop at `now`.
    pub fn process_due(&self, now: Instant) {
        self.shared.process_due(now);
    }

    /// Number of commands waiting in the retry queue.
    pub fn pending_commands(&self) -> usize {
        self.shared.queue.len()
    }

    /// Last output byte reported by a module.
    pub fn output_state(&self, module_type: ModuleType, dip: u8) -> u8 {
        lock(&self.shared.outputs).get(module_type, dip)
    }

    /// Starts the retry loop thread.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::Io` if the thread cannot be spawned.
    pub fn spawn_retry_loop(&mut self) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("phc-retry".into())
            .spawn(move || shared.run_retry_loop())?;
        self.threads.push(handle);
        Ok(())
    }

    /// Starts a thread feeding everything read from `reader` into the bridge.
    ///
    /// # Errors
    ///
    /// Returns `PhcError::Io` if the thread cannot be spawned.
    pub fn spawn_reader(&mut self, reader: SerialReader) -> Result<()> {
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("phc-reader".into())
            .spawn(move || shared.run_reader(reader))?;
        self.threads.push(handle);
        Ok(())
    }

    /// Stops the worker threads and drops queued commands.
    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.queue.close();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("PHC worker thread panicked");
            }
        }
        self.shared.queue.clear();
        self.shared
            .set_status(BridgeStatus::Offline(OfflineReason::Shutdown));
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("port", &self.shared.config.port)
            .field("status", &self.status())
            .field("pending_commands", &self.pending_commands())
            .finish()
    }
}
