pub mod audit;
pub mod clock;
pub mod config;
pub mod daemon;
pub mod daemon_lock;
pub mod kickoff;
pub mod monitor;
pub mod paths;
pub mod quiet_hours;
pub mod runner;
pub mod schedule;
pub mod sleep;
pub mod util;
pub mod wake_check;
pub mod wake_lock;
pub mod warn;
