//! Simulator transport and control loop for the line-follower
//!
//! Talks to the simulator over a persistent TCP socket speaking
//! newline-delimited JSON, and runs the tick cycle that couples the
//! transport to the Q-learning agent:
//! receive -> encode -> update -> select -> send.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod trainer;
pub mod transport;

pub use trainer::{Phase, RunMode, StopToken, Trainer, TrainerConfig};
pub use transport::{Command, FrameBuffer, SimClient};
