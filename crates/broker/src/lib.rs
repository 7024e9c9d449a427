//! Conversion of office documents to PDF through a scarce external engine.
//!
//! The engine (LibreOffice) is single-instance per profile, stateful and
//! prone to crashing or hanging. [`ConversionBroker`] owns a fixed pool of
//! engine slots, serves callers first-available, bounds every attempt with a
//! timeout, retries with exponential backoff and restarts engines that
//! crashed or stopped answering.

mod broker;
pub mod engine;
pub mod error;
mod slot;
pub mod soffice;
mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use broker::{BrokerConfig, BrokerStats, ConversionBroker, ConvertedPdf, RetryPolicy};
pub use engine::{ConversionEngine, EngineFactory, SlotId};
pub use error::{ConversionError, EngineFailure};
pub use slot::{SlotState, TaskId};
pub use soffice::{SofficeEngine, SofficeFactory};
pub use task::{Assignment, ConversionTask, TargetFormat};
