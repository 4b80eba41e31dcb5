//! Cooperative dispatch of kernel events and AI response turns.

mod event;
mod generator;
mod runner;

pub use event::{Event, Turn, TurnEvent};
pub use generator::{
    CollectingContentGenerator, ContentGenerator, GeneratorInput, NoOpContentGenerator,
};
pub use runner::{EventHandler, EventLoop, EventLoopStats};
