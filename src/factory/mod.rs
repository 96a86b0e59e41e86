// Layered Assembly Pipeline
//
// Two sources feed two bounded channels; a rate scheduler turns ticks into
// assembly jobs; a bounded worker pool runs the jobs, each consuming one
// recipe and emitting one product after a fixed assembly delay.
//
// Architecture:
// Stage 1: Atom Sources → [put, blocking when full] → Channels A / B
// Stage 2: Molecule Assembler → [take A, A, B + assembly delay] → Product Sink
// Stage 3: Worker Pool → [at most W assemblies in flight]
// Stage 4: Rate Scheduler → [one job per tick, T = 1/R] → Worker Pool queue

pub mod assembler;
pub mod atom_source;
pub mod channel;
pub mod error;
pub mod lifecycle;
pub mod pacer;
pub mod scheduler;
pub mod worker_pool;

pub use assembler::{AssemblerStats, LogSink, MoleculeAssembler, ProductSink};
pub use atom_source::{AtomSource, SourceStats};
pub use channel::{BoundedChannel, ChannelStats, TryPutError};
pub use error::{FactoryError, Result};
pub use lifecycle::{FactoryState, FactoryStats, MoleculeFactory, ShutdownSummary};
pub use pacer::Pacer;
pub use scheduler::{JobQueue, RateScheduler, SchedulerStats};
pub use worker_pool::{AssemblyJob, BoundedWorkerPool, PoolShutdownReport, PoolStats};
