//! Hardware-free reader driver.
//!
//! Replays a scripted tag population: each tag is in the field between its
//! `arrives` and `departs` offsets (measured from `open`), and is read once per
//! inventory cycle while present. Every `drop_every`-th read is lost, the way
//! a real reader misses badly oriented tags.

use crate::driver::ReaderDriver;
use crate::error::DriverError;
use crate::subscription::{Delivery, EventSink};
use async_trait::async_trait;
use chrono::Utc;
use kiosk_protocol::{PortSpec, ReaderCommand, TagId, TagSeenEvent};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

const DEFAULT_CYCLE: Duration = Duration::from_millis(250);

/// One scripted tag.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedTag {
    pub id: TagId,
    pub secondary_id: Option<String>,
    pub antenna: u8,
    pub arrives: Duration,
    /// `None` keeps the tag in the field forever
    pub departs: Option<Duration>,
}

impl SimulatedTag {
    /// Tag present from the start, forever, on antenna 1.
    pub fn new(id: impl Into<TagId>) -> Self {
        Self {
            id: id.into(),
            secondary_id: None,
            antenna: 1,
            arrives: Duration::ZERO,
            departs: None,
        }
    }

    pub fn on_antenna(mut self, antenna: u8) -> Self {
        self.antenna = antenna;
        self
    }

    pub fn with_secondary_id(mut self, secondary_id: impl Into<String>) -> Self {
        self.secondary_id = Some(secondary_id.into());
        self
    }

    pub fn arriving_at(mut self, offset: Duration) -> Self {
        self.arrives = offset;
        self
    }

    pub fn departing_at(mut self, offset: Duration) -> Self {
        self.departs = Some(offset);
        self
    }

    fn present_at(&self, elapsed: Duration) -> bool {
        elapsed >= self.arrives && self.departs.map_or(true, |departs| elapsed < departs)
    }
}

/// Driver call as seen by a [`SimulatedReader`], recorded for inspection.
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Open { port: PortSpec, at: Instant },
    Send(ReaderCommand),
    Close,
}

/// Read-only view of a simulator's call log. Stays valid after the driver
/// has moved into a session.
#[derive(Debug, Clone, Default)]
pub struct SimulatorProbe {
    calls: Arc<Mutex<Vec<DriverCall>>>,
}

impl SimulatorProbe {
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    /// Times of every open attempt, in order.
    pub fn open_times(&self) -> Vec<Instant> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Open { at, .. } => Some(at),
                _ => None,
            })
            .collect()
    }

    pub fn commands(&self) -> Vec<ReaderCommand> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DriverCall::Send(command) => Some(command),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: DriverCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

/// Scripted reader driver.
pub struct SimulatedReader {
    population: Arc<Vec<SimulatedTag>>,
    cycle: Duration,
    drop_every: Option<u32>,
    failing_opens: u32,
    open_delay: Duration,
    command_codes: HashMap<&'static str, i32>,
    probe: SimulatorProbe,
    sink: Option<EventSink>,
    opened_at: Option<Instant>,
    inventory: Option<JoinHandle<()>>,
}

impl Default for SimulatedReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedReader {
    pub fn new() -> Self {
        Self {
            population: Arc::new(Vec::new()),
            cycle: DEFAULT_CYCLE,
            drop_every: None,
            failing_opens: 0,
            open_delay: Duration::ZERO,
            command_codes: HashMap::new(),
            probe: SimulatorProbe::default(),
            sink: None,
            opened_at: None,
            inventory: None,
        }
    }

    /// A small shelf for demos: two resident tags, one taken away after 6s,
    /// one placed after 3s.
    pub fn demo(ids: &[TagId]) -> Self {
        let fallback: Vec<TagId> = (1..=4)
            .map(|n| TagId::new(format!("E2000017221101440{:03}", n)))
            .collect();
        let ids = if ids.len() >= 4 { &ids[..4] } else { &fallback[..] };

        Self::new()
            .with_tag(SimulatedTag::new(ids[0].clone()).on_antenna(1))
            .with_tag(SimulatedTag::new(ids[1].clone()).on_antenna(2))
            .with_tag(
                SimulatedTag::new(ids[2].clone())
                    .on_antenna(3)
                    .departing_at(Duration::from_secs(6)),
            )
            .with_tag(
                SimulatedTag::new(ids[3].clone())
                    .on_antenna(4)
                    .arriving_at(Duration::from_secs(3)),
            )
            .with_drop_every(7)
    }

    pub fn with_tag(mut self, tag: SimulatedTag) -> Self {
        Arc::make_mut(&mut self.population).push(tag);
        self
    }

    pub fn with_cycle(mut self, cycle: Duration) -> Self {
        self.cycle = cycle.max(Duration::from_millis(1));
        self
    }

    /// Lose every `n`-th read (n >= 2).
    pub fn with_drop_every(mut self, n: u32) -> Self {
        self.drop_every = (n >= 2).then_some(n);
        self
    }

    /// The next `n` opens fail with [`DriverError::PortUnavailable`].
    pub fn failing_opens(mut self, n: u32) -> Self {
        self.failing_opens = n;
        self
    }

    /// Every open takes this long before answering.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    /// Return `code` for every command named `command` (`"stop"`, `"start_inventory"`).
    pub fn with_command_code(mut self, command: &'static str, code: i32) -> Self {
        self.command_codes.insert(command, code);
        self
    }

    pub fn probe(&self) -> SimulatorProbe {
        self.probe.clone()
    }

    pub fn population(&self) -> &[SimulatedTag] {
        &self.population
    }

    fn stop_inventory(&mut self) {
        if let Some(task) = self.inventory.take() {
            task.abort();
            debug!("Simulated inventory stopped");
        }
    }

    fn start_inventory(&mut self) {
        self.stop_inventory();
        let (Some(sink), Some(opened_at)) = (self.sink.clone(), self.opened_at) else {
            return;
        };
        let population = Arc::clone(&self.population);
        let cycle = self.cycle;
        let drop_every = self.drop_every;

        self.inventory = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cycle);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut reads: u64 = 0;

            loop {
                ticker.tick().await;
                let elapsed = opened_at.elapsed();

                for tag in population.iter().filter(|tag| tag.present_at(elapsed)) {
                    reads += 1;
                    if drop_every.is_some_and(|n| reads % n as u64 == 0) {
                        trace!("Simulated miss of {}", tag.id);
                        continue;
                    }
                    let mut event = TagSeenEvent::new(tag.id.clone(), tag.antenna, Utc::now());
                    event.secondary_id = tag.secondary_id.clone();
                    if sink.tag_seen(event) == Delivery::Unsubscribed {
                        return;
                    }
                }

                if sink.read_cycle_complete() == Delivery::Unsubscribed {
                    return;
                }
            }
        }));
    }
}

#[async_trait]
impl ReaderDriver for SimulatedReader {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn open(
        &mut self,
        port: &PortSpec,
        _timeout: Duration,
        sink: EventSink,
    ) -> Result<(), DriverError> {
        self.probe.record(DriverCall::Open {
            port: port.clone(),
            at: Instant::now(),
        });

        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(DriverError::PortUnavailable(port.port.clone()));
        }

        self.sink = Some(sink);
        self.opened_at = Some(Instant::now());
        Ok(())
    }

    async fn send(&mut self, command: &ReaderCommand) -> Result<i32, DriverError> {
        self.probe.record(DriverCall::Send(*command));
        if self.sink.is_none() {
            return Err(DriverError::Transport("channel not open".to_string()));
        }

        let code = self.command_codes.get(command.name()).copied().unwrap_or(0);
        if code == 0 {
            match command {
                ReaderCommand::Stop => self.stop_inventory(),
                ReaderCommand::StartInventory(_) => self.start_inventory(),
            }
        }
        Ok(code)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        self.probe.record(DriverCall::Close);
        self.stop_inventory();
        self.sink = None;
        self.opened_at = None;
        Ok(())
    }
}

impl Drop for SimulatedReader {
    fn drop(&mut self) {
        self.stop_inventory();
    }
}
