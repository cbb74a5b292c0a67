//! JSON-described receive scenarios.
//!
//! A scenario configures a module, then feeds it chunks of line traffic and
//! services it after each one, collecting every frame it decodes:
//!
//! ```json
//! {
//!   "name": "sequence",
//!   "rx_len": 50,
//!   "start": "[",
//!   "end": "]",
//!   "steps": [
//!     { "rx": "gibberish[Ceci est une trame]more gibberish", "repeat": 5 }
//!   ]
//! }
//! ```

use std::cell::Cell;
use std::rc::Rc;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uart_core::{Frame, FramingConfig, Module, ModuleConfig, Triage, UartModule};

use crate::{SimClock, SimUart};

/// Errors raised while loading or playing a scenario
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid scenario JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid scenario: {0}")]
    Invalid(String),
}

/// One chunk of line traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Bytes received on the line
    pub rx: String,
    /// How many times the chunk is received, each followed by its runs
    #[serde(default = "one")]
    pub repeat: usize,
    /// `run()` calls after each reception
    #[serde(default = "one")]
    pub runs: usize,
}

fn one() -> usize {
    1
}

/// A module configuration and the traffic to play through it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub name: String,
    /// Receive ring length
    pub rx_len: usize,
    /// Frame queue depth
    pub frame_depth: usize,
    /// Delimiter matches examined per scan
    pub scan_depth: usize,
    /// Fixed frame length, 0 for delimited frames
    pub expected_len: usize,
    pub start: String,
    pub end: String,
    pub escape: String,
    /// Report completed DMA laps to the module
    pub report_laps: bool,
    pub steps: Vec<Step>,
}

impl Default for Scenario {
    fn default() -> Self {
        let config = ModuleConfig::default();
        Self {
            name: String::from("unnamed"),
            rx_len: config.rx_len,
            frame_depth: config.frame_depth,
            scan_depth: config.scan_depth,
            expected_len: 0,
            start: String::new(),
            end: String::new(),
            escape: String::new(),
            report_laps: true,
            steps: Vec::new(),
        }
    }
}

/// What a scenario produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// Every decoded frame, in order
    pub frames: Vec<Frame>,
    /// Frames decoded after each step repetition
    pub per_step: Vec<usize>,
    /// Bytes left in the receive ring at the end
    pub remaining: Vec<u8>,
    /// Strategy the module ran with
    pub triage: Triage,
    /// Frames dropped because the queue was full
    pub dropped: u32,
    /// Times the frame-received callback ran
    pub callbacks: u32,
}

impl Outcome {
    /// Decoded frames as text, lossy for binary content
    pub fn texts(&self) -> Vec<String> {
        self.frames
            .iter()
            .map(|frame| String::from_utf8_lossy(frame.as_bytes()).into_owned())
            .collect()
    }
}

impl Scenario {
    /// Parse and check a scenario
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        let scenario: Scenario = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Serialize the scenario back to JSON
    pub fn to_json(&self) -> Result<String, SimError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check that the module can be built from this scenario
    pub fn validate(&self) -> Result<(), SimError> {
        if self.rx_len == 0 {
            return Err(SimError::Invalid(format!("{}: rx_len must not be 0", self.name)));
        }
        if self.frame_depth == 0 {
            return Err(SimError::Invalid(format!("{}: frame_depth must not be 0", self.name)));
        }
        if let Some(index) = self.steps.iter().position(|step| step.repeat == 0) {
            return Err(SimError::Invalid(format!("{}: step {} never repeats", self.name, index)));
        }
        Ok(())
    }

    /// Framing the module is configured with
    pub fn framing(&self) -> FramingConfig {
        FramingConfig {
            expected_len: self.expected_len,
            start: self.start.as_bytes().to_vec(),
            end: self.end.as_bytes().to_vec(),
            escape: self.escape.as_bytes().to_vec(),
        }
    }

    /// Sizing of the module under test
    pub fn module_config(&self) -> ModuleConfig {
        ModuleConfig {
            rx_len: self.rx_len,
            frame_depth: self.frame_depth,
            scan_depth: self.scan_depth,
            ..ModuleConfig::default()
        }
    }

    /// Play the scenario on a fresh module
    ///
    /// Frames are taken out of the queue after every `run()`, so the queue
    /// only overflows when a single scan decodes more than its depth.
    pub fn play(&self) -> Result<Outcome, SimError> {
        self.validate()?;
        info!(target: "uart-sim", "Playing scenario {}", self.name);

        let port = SimUart::new().with_lap_reporting(self.report_laps);
        let mut module = UartModule::new(
            &self.name,
            port.clone(),
            SimClock::default(),
            self.module_config(),
        );
        if !module.do_post() {
            return Err(SimError::Invalid(format!("{}: module failed POST", self.name)));
        }
        module.set_framing(self.framing());

        let callbacks = Rc::new(Cell::new(0u32));
        let counter = Rc::clone(&callbacks);
        module.set_frame_received_callback(move || counter.set(counter.get() + 1));

        let mut frames = Vec::new();
        let mut per_step = Vec::new();
        for step in &self.steps {
            for _ in 0..step.repeat {
                port.inject(step.rx.as_bytes());
                let before = frames.len();
                for _ in 0..step.runs {
                    module.run();
                    while module.available_frames() > 0 {
                        frames.push(module.receive_frame());
                    }
                }
                per_step.push(frames.len() - before);
                debug!(
                    target: "uart-sim",
                    "{} frame(s) after {:?}",
                    frames.len() - before,
                    step.rx
                );
            }
        }

        let mut remaining = vec![0u8; module.available_bytes()];
        module.receive(&mut remaining);

        Ok(Outcome {
            frames,
            per_step,
            remaining,
            triage: module.triage(),
            dropped: module.dropped_frames(),
            callbacks: callbacks.get(),
        })
    }
}
