//! The control loop that couples transport, encoder and policy
//!
//! One synchronous cycle per tick:
//! receive -> encode -> reward for the previous transition -> Bellman
//! update -> epsilon-greedy select -> map to wheel speeds -> send.
//! Cancellation is cooperative: the stop token is polled once per tick
//! boundary, so an in-flight tick always completes and shutdown always
//! attempts a final snapshot and a zero-speed stop command.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use linefollow_agent::{
    ConstantSchedule, ExponentialSchedule, QLearningConfig, QTable, Schedule, Snapshot,
};
use linefollow_core::{
    encode, reward_for, Action, LineFollowError, Result, Reward, State, Transition, STOP_SPEEDS,
};

use crate::transport::{Command, SimClient};

/// Cooperative cancellation handle polled once per tick.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    /// Create a token in the "keep running" state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. The in-flight tick completes before the loop exits.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// How the control loop treats the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Learn online and persist snapshots.
    Train,
    /// Replay the stored policy: epsilon forced to zero, no updates.
    Evaluate,
}

/// Control-loop lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not yet connected to the simulator
    Idle,
    /// Connected, about to enter the tick cycle
    Connected,
    /// Inside the tick cycle
    Running,
    /// Stop observed, final snapshot and stop command in flight
    ShuttingDown,
}

/// Settings for one control-loop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    /// Simulator host
    pub host: String,
    /// Simulator port
    pub port: u16,
    /// Snapshot location
    pub snapshot_path: PathBuf,
    /// Q-learning hyperparameters
    #[serde(flatten)]
    pub learning: QLearningConfig,
    /// Floor for the decayed exploration rate
    pub epsilon_min: f64,
    /// Per-tick exploration decay factor; 1.0 keeps epsilon constant
    pub epsilon_decay: f64,
    /// Pacing delay between ticks
    pub tick_interval: Duration,
    /// Bound on a single receive poll
    pub read_timeout: Duration,
    /// Ticks between periodic snapshot saves
    pub save_interval: u64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50002,
            snapshot_path: PathBuf::from("q_table.json"),
            learning: QLearningConfig::default(),
            epsilon_min: 0.01,
            epsilon_decay: 1.0,
            tick_interval: Duration::from_millis(50),
            read_timeout: Duration::from_millis(100),
            save_interval: 100,
        }
    }
}

/// Orchestrates the tick cycle against one simulator connection.
///
/// Owns the policy table exclusively for the process lifetime; nothing
/// else mutates it.
pub struct Trainer {
    config: TrainerConfig,
    mode: RunMode,
    table: QTable,
    epsilon_schedule: Box<dyn Schedule>,
    phase: Phase,
    ticks: u64,
    prev: Option<(State, Action)>,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("config", &self.config)
            .field("mode", &self.mode)
            .field("phase", &self.phase)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl Trainer {
    /// Build a trainer, restoring any existing snapshot.
    ///
    /// A fresh zero table is used when no snapshot exists, except in
    /// evaluate mode, which refuses to run an untrained policy. A snapshot
    /// with mismatched dimensions is an error, never a silent resize.
    pub async fn new(config: TrainerConfig, mode: RunMode) -> Result<Self> {
        let mut table = QTable::new();
        let mut epsilon = config.learning.epsilon;
        match Snapshot::load(&config.snapshot_path).await? {
            Some(snapshot) => {
                let (restored, saved_epsilon) = snapshot.into_table()?;
                table = restored;
                epsilon = saved_epsilon;
                info!(
                    path = %config.snapshot_path.display(),
                    epsilon,
                    "restored policy snapshot"
                );
            }
            None if mode == RunMode::Evaluate => {
                return Err(LineFollowError::SnapshotMissing(config.snapshot_path));
            }
            None => {
                info!("no snapshot found, starting from a zero table");
            }
        }
        let epsilon_schedule: Box<dyn Schedule> = if config.epsilon_decay < 1.0 {
            Box::new(ExponentialSchedule::new(
                epsilon,
                config.epsilon_min,
                config.epsilon_decay,
            ))
        } else {
            Box::new(ConstantSchedule::new(epsilon))
        };
        Ok(Self {
            config,
            mode,
            table,
            epsilon_schedule,
            phase: Phase::Idle,
            ticks: 0,
            prev: None,
        })
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Ticks completed so far.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// The policy table as it stands.
    #[must_use]
    pub fn table(&self) -> &QTable {
        &self.table
    }

    fn current_epsilon(&self) -> f64 {
        match self.mode {
            RunMode::Evaluate => 0.0,
            RunMode::Train => self.epsilon_schedule.value(usize::try_from(self.ticks).unwrap_or(usize::MAX)),
        }
    }

    /// Run until the token is cancelled or the transport fails fatally.
    ///
    /// Shutdown is best-effort regardless of how the loop ended: save a
    /// final snapshot, command zero speeds, stop the simulation, close.
    pub async fn run(&mut self, stop: StopToken) -> Result<()> {
        let mut client = SimClient::connect(&self.config.host, self.config.port).await?;
        client.set_read_timeout(self.config.read_timeout);
        self.phase = Phase::Connected;
        info!(host = %self.config.host, port = self.config.port, "connected to simulator");

        client.send(&Command::StartSimulation).await?;
        self.phase = Phase::Running;
        let outcome = self.run_loop(&mut client, &stop).await;
        self.phase = Phase::ShuttingDown;
        self.shutdown(&mut client).await;
        outcome
    }

    async fn run_loop(&mut self, client: &mut SimClient, stop: &StopToken) -> Result<()> {
        while !stop.is_cancelled() {
            self.tick(client).await?;
        }
        info!(ticks = self.ticks, "stop requested, leaving the tick cycle");
        Ok(())
    }

    async fn tick(&mut self, client: &mut SimClient) -> Result<()> {
        let Some(reading) = client.receive().await? else {
            sleep(self.config.tick_interval).await;
            return Ok(());
        };
        let state = encode(&reading);

        // No transition exists before the first command is sent; telemetry
        // carries a zero reward on that tick.
        let mut reward = Reward::new(0.0);
        if let Some((prev_state, prev_action)) = self.prev {
            let transition = Transition::new(prev_state, prev_action, reward_for(state), state);
            reward = transition.reward;
            if self.mode == RunMode::Train {
                self.table.update(
                    transition.state,
                    transition.action,
                    transition.reward,
                    transition.next_state,
                    self.config.learning.learning_rate,
                    self.config.learning.discount_factor,
                )?;
            }
        }

        let epsilon = self.current_epsilon();
        let action = self.table.select_action(state, epsilon)?;
        let (left, right) = action.wheel_speeds();
        client
            .send(&Command::SetSpeed {
                left,
                right,
                state: state.0,
                reward: reward.value(),
                action: u8::try_from(action.index()).unwrap_or(0),
            })
            .await?;
        debug!(
            tick = self.ticks,
            %state,
            ?action,
            reward = reward.value(),
            epsilon,
            "tick"
        );

        self.prev = Some((state, action));
        self.ticks += 1;
        if self.mode == RunMode::Train && self.ticks % self.config.save_interval == 0 {
            self.save_snapshot().await?;
            info!(tick = self.ticks, "saved periodic policy snapshot");
        }
        sleep(self.config.tick_interval).await;
        Ok(())
    }

    async fn save_snapshot(&self) -> Result<()> {
        Snapshot::capture(&self.table, self.current_epsilon())
            .save(&self.config.snapshot_path)
            .await
    }

    /// Best-effort teardown; failures are logged, never propagated, so a
    /// broken transport cannot prevent the snapshot save.
    async fn shutdown(&mut self, client: &mut SimClient) {
        if self.mode == RunMode::Train {
            if let Err(err) = self.save_snapshot().await {
                warn!(%err, "failed to save final snapshot");
            }
        }
        let (left, right) = STOP_SPEEDS;
        let halt = Command::SetSpeed {
            left,
            right,
            state: 0,
            reward: 0.0,
            action: 0,
        };
        if let Err(err) = client.send(&halt).await {
            warn!(%err, "failed to send final stop command");
        }
        if let Err(err) = client.send(&Command::StopSimulation).await {
            warn!(%err, "failed to stop the simulation");
        }
        client.close();
        info!("control loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use linefollow_core::SensorReading;

    use super::*;

    const CENTERED_FRAME: &[u8] = concat!(
        r#"{"type":"sensor_update","sensors":{"left_corner":0.0,"left":0.0,"#,
        r#""middle":0.9,"right":0.0,"right_corner":0.0}}"#,
        "\n",
    )
    .as_bytes();

    fn test_config(port: u16, snapshot_path: PathBuf) -> TrainerConfig {
        TrainerConfig {
            host: "127.0.0.1".to_string(),
            port,
            snapshot_path,
            learning: QLearningConfig {
                epsilon: 0.0,
                ..QLearningConfig::default()
            },
            tick_interval: Duration::from_millis(1),
            read_timeout: Duration::from_millis(10),
            save_interval: 10_000,
            ..TrainerConfig::default()
        }
    }

    // The full pipeline on one centered reading: encoder, reward table,
    // tie-break and wheel mapping all line up.
    #[test]
    fn centered_reading_drives_forward_through_the_pipeline() {
        let reading = SensorReading::new(0.0, 0.0, 0.9, 0.0, 0.0);
        let state = encode(&reading);
        assert_eq!(state, State(4));
        assert_eq!(reward_for(state).value(), 20.0);

        let table = QTable::new();
        let action = table.select_action(state, 0.0).unwrap();
        assert_eq!(action, Action::Forward);
        assert_eq!(action.wheel_speeds(), (2.0, 2.0));
    }

    #[tokio::test]
    async fn evaluate_mode_requires_a_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(1, dir.path().join("absent.json"));
        let err = Trainer::new(config, RunMode::Evaluate).await.unwrap_err();
        assert!(matches!(err, LineFollowError::SnapshotMissing(_)));
    }

    #[tokio::test]
    async fn connect_refused_is_fatal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let dir = tempfile::tempdir().unwrap();
        let config = test_config(port, dir.path().join("q.json"));
        let mut trainer = Trainer::new(config, RunMode::Train).await.unwrap();
        assert!(trainer.run(StopToken::new()).await.is_err());
    }

    #[tokio::test]
    async fn control_loop_learns_and_shuts_down_cleanly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("q_table.json");

        let stop = StopToken::new();
        let server_stop = stop.clone();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            for _ in 0..5 {
                write_half.write_all(CENTERED_FRAME).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            server_stop.cancel();
            let mut lines = BufReader::new(read_half).lines();
            let mut received = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                received.push(line);
            }
            received
        });

        let config = test_config(port, snapshot_path.clone());
        let mut trainer = Trainer::new(config, RunMode::Train).await.unwrap();
        trainer.run(stop).await.unwrap();
        assert_eq!(trainer.phase(), Phase::ShuttingDown);
        assert!(trainer.ticks() >= 5);

        let received = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received[0], r#"{"command":"start_simulation"}"#);
        let speed_lines: Vec<&String> = received
            .iter()
            .filter(|line| line.contains(r#""command":"set_speed""#))
            .collect();
        assert!(speed_lines.len() >= 5);
        // Centered state, greedy Forward: full speed ahead on every tick.
        assert!(speed_lines[..speed_lines.len() - 1]
            .iter()
            .all(|line| line.contains(r#""L":2.0,"R":2.0,"State":4"#)));
        // Shutdown halts the robot and stops the simulation, in order.
        let halt = speed_lines.last().unwrap();
        assert!(halt.contains(r#""L":0.0,"R":0.0"#));
        assert_eq!(
            received.last().unwrap(),
            r#"{"command":"stop_simulation"}"#
        );

        // The final snapshot reflects the learning that happened.
        let snapshot = Snapshot::load(&snapshot_path).await.unwrap().unwrap();
        let (table, epsilon) = snapshot.into_table().unwrap();
        assert_eq!(epsilon, 0.0);
        assert!(table.value(State(4), Action::Forward).unwrap() > 0.0);
    }

    #[tokio::test]
    async fn evaluate_mode_replays_without_learning() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let dir = tempfile::tempdir().unwrap();
        let snapshot_path = dir.path().join("q_table.json");

        // Seed a policy that prefers SharpRight in the centered state.
        let mut table = QTable::new();
        table
            .update(State(4), Action::SharpRight, Reward(20.0), State(4), 0.5, 0.9)
            .unwrap();
        Snapshot::capture(&table, 0.2)
            .save(&snapshot_path)
            .await
            .unwrap();

        let stop = StopToken::new();
        let server_stop = stop.clone();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = socket.into_split();
            for _ in 0..3 {
                write_half.write_all(CENTERED_FRAME).await.unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
            server_stop.cancel();
            let mut lines = BufReader::new(read_half).lines();
            let mut received = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                received.push(line);
            }
            received
        });

        let config = test_config(port, snapshot_path.clone());
        let mut trainer = Trainer::new(config, RunMode::Evaluate).await.unwrap();
        trainer.run(stop).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        // Despite the saved epsilon of 0.2, evaluation is pure replay of
        // the stored preference.
        let speed_lines: Vec<&String> = received
            .iter()
            .filter(|line| line.contains(r#""command":"set_speed""#))
            .collect();
        assert!(speed_lines[..speed_lines.len() - 1]
            .iter()
            .all(|line| line.contains(r#""Action":4"#)));

        // No learning: the stored table is byte-for-byte what we seeded.
        let snapshot = Snapshot::load(&snapshot_path).await.unwrap().unwrap();
        let (reloaded, epsilon) = snapshot.into_table().unwrap();
        assert_eq!(reloaded, table);
        assert_eq!(epsilon, 0.2);
    }
}
